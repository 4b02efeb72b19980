use std::time::Duration;

use bioingest::core::client::parse_retry_after;
use bioingest::{ApiError, Backoff, ErrorKind, RetryConfig};
use chrono::{TimeZone, Utc};

fn server(status: u16) -> ApiError {
    ApiError::Server {
        endpoint: "p".into(),
        status,
        url: "http://p/x".into(),
        body: String::new(),
    }
}

fn client(status: u16) -> ApiError {
    ApiError::Client {
        endpoint: "p".into(),
        status,
        url: "http://p/x".into(),
        body: String::new(),
    }
}

fn limited(retry_after: Option<Duration>) -> ApiError {
    ApiError::RateLimited {
        endpoint: "p".into(),
        status: 429,
        url: "http://p/x".into(),
        retry_after,
        body: String::new(),
    }
}

#[test]
fn server_and_rate_limit_errors_retry_until_the_budget() {
    let policy = RetryConfig::default();
    assert_eq!(policy.max_attempts, 5);
    for attempt in 1..5 {
        assert!(!policy.should_give_up(&server(503), attempt));
        assert!(!policy.should_give_up(&limited(None), attempt));
    }
    assert!(policy.should_give_up(&server(503), 5));
    assert!(policy.should_give_up(&limited(None), 5));
}

#[test]
fn client_errors_give_up_on_the_first_attempt() {
    let policy = RetryConfig::default();
    assert!(policy.should_give_up(&client(404), 1));
    assert!(policy.should_give_up(&client(400), 1));
    assert!(!policy.is_retryable(&client(422)));
}

#[test]
fn non_transport_errors_are_not_retried() {
    let policy = RetryConfig::default();
    let breaker = ApiError::BreakerOpen {
        endpoint: "p".into(),
    };
    assert!(policy.should_give_up(&breaker, 1));
    assert!(policy.should_give_up(&ApiError::Data("bad".into()), 1));
}

#[test]
fn giveup_kinds_override_retryability() {
    let mut policy = RetryConfig::default();
    policy.giveup_kinds = vec![ErrorKind::RateLimited];
    assert!(policy.should_give_up(&limited(None), 1));
    assert!(!policy.should_give_up(&server(500), 1));
}

#[test]
fn exponential_backoff_grows_and_caps() {
    let backoff = Backoff::Exponential {
        base: Duration::from_secs(1),
        factor: 2.0,
        max: Duration::from_secs(60),
        jitter: false,
    };
    assert_eq!(backoff.delay(1), Duration::from_secs(2));
    assert_eq!(backoff.delay(2), Duration::from_secs(4));
    assert_eq!(backoff.delay(3), Duration::from_secs(8));
    assert_eq!(backoff.delay(10), Duration::from_secs(60));
    assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(60));
}

#[test]
fn jittered_backoff_stays_within_half_either_side() {
    let backoff = Backoff::Exponential {
        base: Duration::from_secs(1),
        factor: 2.0,
        max: Duration::from_secs(60),
        jitter: true,
    };
    for _ in 0..100 {
        let d = backoff.delay(2);
        assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(6), "{d:?}");
    }
}

#[test]
fn jitter_never_pushes_a_capped_delay_past_max() {
    let backoff = Backoff::Exponential {
        base: Duration::from_secs(1),
        factor: 2.0,
        max: Duration::from_secs(2),
        jitter: true,
    };
    for _ in 0..2000 {
        let d = backoff.delay(5);
        assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(2), "{d:?}");
    }
}

#[test]
fn wait_time_prefers_the_server_hint_clamped() {
    let policy = RetryConfig::fixed(Duration::from_millis(250), 3);
    assert_eq!(policy.wait_time(1, None), Duration::from_millis(250));
    assert_eq!(
        policy.wait_time(1, Some(Duration::from_secs(7))),
        Duration::from_secs(7)
    );
    assert_eq!(
        policy.wait_time(1, Some(Duration::from_secs(3600))),
        Duration::from_secs(300)
    );
}

#[test]
fn retry_after_delta_seconds() {
    let now = Utc::now();
    assert_eq!(parse_retry_after("120", now), Some(Duration::from_secs(120)));
    assert_eq!(parse_retry_after(" 0 ", now), Some(Duration::ZERO));
    assert_eq!(parse_retry_after("-5", now), None);
}

#[test]
fn retry_after_http_date() {
    let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 0).unwrap();
    let wait = parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now).unwrap();
    let expected = Duration::from_secs(60);
    assert!(wait.abs_diff(expected) <= Duration::from_secs(1), "{wait:?}");

    let past = parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now);
    assert_eq!(past, Some(Duration::ZERO));
}

#[test]
fn retry_after_garbage_is_ignored() {
    let now = Utc::now();
    assert_eq!(parse_retry_after("soon", now), None);
    assert_eq!(parse_retry_after("", now), None);
}

#[test]
fn error_accessors_expose_structured_context() {
    let err = limited(Some(Duration::from_secs(3)));
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.status(), Some(429));
    assert_eq!(err.endpoint(), Some("p"));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    assert_eq!(err.attempts(), None);
}
