use std::sync::Arc;
use std::time::Duration;

use bioingest::{RateLimitConfig, RateLimiter};
use tokio::time::Instant;

fn limiter(max_calls: u32, period: Duration) -> RateLimiter {
    RateLimiter::new(
        "limited",
        RateLimitConfig {
            max_calls,
            period,
            ..RateLimitConfig::default()
        },
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn burst_within_budget_does_not_wait() {
    let rl = limiter(5, Duration::from_secs(1));
    let started = Instant::now();
    for _ in 0..5 {
        assert_eq!(rl.acquire().await, Duration::ZERO);
    }
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(rl.available(), 0);
}

#[tokio::test(start_paused = true)]
async fn n_periods_of_calls_take_at_least_n_minus_one_periods() {
    let rl = limiter(3, Duration::from_secs(1));
    let started = Instant::now();
    // 9 calls = 3 full buckets, so two refills
    for _ in 0..9 {
        rl.acquire().await;
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn bucket_refills_after_the_period() {
    let rl = limiter(2, Duration::from_millis(500));
    rl.acquire().await;
    rl.acquire().await;
    tokio::time::advance(Duration::from_millis(600)).await;
    assert_eq!(rl.acquire().await, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn shared_limiter_caps_concurrent_callers() {
    let rl = Arc::new(limiter(2, Duration::from_secs(1)));
    let started = Instant::now();
    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let rl = Arc::clone(&rl);
            tokio::spawn(async move { rl.acquire().await })
        })
        .collect();
    for t in tasks {
        t.await.unwrap();
    }
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn jitter_adds_at_most_a_tenth_of_the_period() {
    let rl = RateLimiter::new(
        "jittered",
        RateLimitConfig {
            max_calls: 10,
            period: Duration::from_secs(1),
            jitter: true,
            ..RateLimitConfig::default()
        },
    )
    .unwrap();
    let started = Instant::now();
    rl.acquire().await;
    assert!(started.elapsed() <= Duration::from_millis(101));
}

#[test]
fn zero_budget_fails_fast() {
    let zero_calls = RateLimiter::new(
        "bad",
        RateLimitConfig {
            max_calls: 0,
            ..RateLimitConfig::default()
        },
    );
    assert!(matches!(zero_calls, Err(bioingest::ApiError::InvalidConfig(_))));

    let zero_period = RateLimiter::new(
        "bad",
        RateLimitConfig {
            period: Duration::ZERO,
            ..RateLimitConfig::default()
        },
    );
    assert!(zero_period.is_err());
}
