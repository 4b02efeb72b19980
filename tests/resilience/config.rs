use std::time::Duration;

use bioingest::{
    ApiError, Backoff, CircuitState, EndpointConfig, EndpointRegistry, ErrorKind, RetryConfig,
};

#[test]
fn defaults_are_applied() {
    let cfg = EndpointConfig::builder("chembl", "https://www.ebi.ac.uk/chembl/api/data/")
        .build()
        .unwrap();
    assert_eq!(cfg.rate_limit.max_calls, 10);
    assert_eq!(cfg.rate_limit.period, Duration::from_secs(1));
    assert_eq!(cfg.retry.max_attempts, 5);
    assert_eq!(cfg.retry.retry_on_status, vec![429]);
    assert_eq!(cfg.timeouts.connect, Duration::from_secs(10));
    assert_eq!(cfg.timeouts.read, Duration::from_secs(30));
    assert_eq!(cfg.circuit.failure_threshold, 5);
    assert_eq!(cfg.circuit.timeout, Duration::from_secs(60));
    assert!(!cfg.cache.enabled);
    assert_eq!(cfg.pagination.meta_key, "page_meta");
    assert_eq!(cfg.pagination.max_page_size, 1000);
}

#[test]
fn invalid_settings_fail_fast() {
    let bad_rate = EndpointConfig::builder("x", "https://example.org/")
        .rate_limit(0, Duration::from_secs(1))
        .build();
    assert!(matches!(bad_rate, Err(ApiError::InvalidConfig(_))));

    let bad_period = EndpointConfig::builder("x", "https://example.org/")
        .rate_limit(3, Duration::ZERO)
        .build();
    assert!(bad_period.is_err());

    let bad_retry = EndpointConfig::builder("x", "https://example.org/")
        .retry_config(RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        })
        .build();
    assert!(bad_retry.is_err());

    let bad_circuit = EndpointConfig::builder("x", "https://example.org/")
        .circuit(0, Duration::from_secs(1))
        .build();
    assert!(bad_circuit.is_err());

    let bad_header = EndpointConfig::builder("x", "https://example.org/")
        .header("bad header", "v")
        .build();
    assert!(bad_header.is_err());

    let bad_url = EndpointConfig::builder("x", "not a url").build();
    assert!(matches!(bad_url, Err(ApiError::Url(_))));

    let cannot_be_base = EndpointConfig::builder("x", "mailto:ops@example.org").build();
    assert!(cannot_be_base.is_err());

    let zero_capacity = EndpointConfig::builder("x", "https://example.org/")
        .cache_ttl(Duration::from_secs(1))
        .cache_capacity(0)
        .build();
    assert!(zero_capacity.is_err());
}

#[test]
fn config_deserializes_from_seconds() {
    let cfg: EndpointConfig = serde_json::from_value(serde_json::json!({
        "name": "pubchem",
        "base_url": "https://pubchem.ncbi.nlm.nih.gov/rest/pug/",
        "headers": { "accept": "application/json" },
        "rate_limit": { "max_calls": 5, "period": 1.0 },
        "retry": {
            "max_attempts": 3,
            "backoff": { "kind": "fixed", "delay": 0.25 },
            "giveup_kinds": ["client", "breaker_open"],
            "max_retry_after": 30
        },
        "timeouts": { "connect": 2.5, "read": 15 },
        "cache": { "enabled": true, "ttl": 60 },
        "pagination": { "meta_key": "meta", "status_path": "status" }
    }))
    .unwrap();
    cfg.validate().unwrap();

    assert_eq!(cfg.rate_limit.max_calls, 5);
    assert_eq!(
        cfg.retry.backoff,
        Backoff::Fixed {
            delay: Duration::from_millis(250)
        }
    );
    assert_eq!(cfg.retry.giveup_kinds, vec![ErrorKind::Client, ErrorKind::BreakerOpen]);
    assert_eq!(cfg.retry.max_retry_after, Duration::from_secs(30));
    assert_eq!(cfg.timeouts.connect, Duration::from_millis(2500));
    assert!(cfg.cache.enabled);
    assert_eq!(cfg.cache.capacity, 1024);
    assert_eq!(cfg.pagination.meta_key, "meta");
    assert_eq!(cfg.pagination.next_key, "next");
    assert_eq!(cfg.pagination.status_path.as_deref(), Some("status"));
}

#[test]
fn registry_holds_one_client_per_name() {
    let mut registry = EndpointRegistry::new();
    assert!(registry.is_empty());

    let chembl = EndpointConfig::builder("chembl", "https://www.ebi.ac.uk/chembl/api/data/")
        .build()
        .unwrap();
    let client = registry.register(chembl.clone()).unwrap();
    assert_eq!(client.name(), "chembl");

    let dup = registry.register(chembl);
    assert!(matches!(dup, Err(ApiError::InvalidConfig(_))));

    registry
        .register(
            EndpointConfig::builder("uniprot", "https://rest.uniprot.org/")
                .build()
                .unwrap(),
        )
        .unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["chembl", "uniprot"]);

    // clones share the same breaker
    client.circuit_breaker().record_failure();
    assert_eq!(
        registry.get("chembl").unwrap().circuit_breaker().consecutive_failures(),
        1
    );

    assert_eq!(registry.circuit_state("chembl"), Some(CircuitState::Closed));
    assert!(registry.reset_circuit("chembl"));
    assert_eq!(client.circuit_breaker().consecutive_failures(), 0);
    assert!(!registry.reset_circuit("pubmed"));
    assert_eq!(registry.circuit_state("pubmed"), None);
}
