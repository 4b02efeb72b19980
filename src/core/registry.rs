use std::collections::BTreeMap;

use crate::core::circuit::CircuitState;
use crate::core::config::EndpointConfig;
use crate::core::{ApiClient, ApiError};

/// Process-wide set of endpoint clients, keyed by endpoint name.
///
/// Build it once at startup and pass it by reference to every consumer; each
/// name maps to exactly one client and therefore one breaker, one limiter and
/// one cache for the lifetime of the registry.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    clients: BTreeMap<String, ApiClient>,
}

impl EndpointRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register a client for `config`.
    ///
    /// # Errors
    ///
    /// Rejects a name that is already registered, or an invalid configuration.
    pub fn register(&mut self, config: EndpointConfig) -> Result<ApiClient, ApiError> {
        if self.clients.contains_key(&config.name) {
            return Err(ApiError::InvalidConfig(format!(
                "endpoint {} is already registered",
                config.name
            )));
        }
        let client = ApiClient::new(config)?;
        self.clients
            .insert(client.name().to_string(), client.clone());
        Ok(client)
    }

    /// Register an already built client (e.g. one with a custom `reqwest::Client`).
    ///
    /// # Errors
    ///
    /// Rejects a name that is already registered.
    pub fn insert(&mut self, client: ApiClient) -> Result<(), ApiError> {
        if self.clients.contains_key(client.name()) {
            return Err(ApiError::InvalidConfig(format!(
                "endpoint {} is already registered",
                client.name()
            )));
        }
        self.clients.insert(client.name().to_string(), client);
        Ok(())
    }

    /// The client registered under `name`.
    pub fn get(&self, name: &str) -> Option<&ApiClient> {
        self.clients.get(name)
    }

    /// Registered endpoint names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Number of registered endpoints.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no endpoint is registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Breaker state of one endpoint, for health reporting.
    pub fn circuit_state(&self, name: &str) -> Option<CircuitState> {
        self.clients.get(name).map(ApiClient::circuit_state)
    }

    /// Operator action. Returns `false` if no such endpoint is registered.
    pub fn reset_circuit(&self, name: &str) -> bool {
        match self.clients.get(name) {
            Some(c) => {
                c.reset_circuit();
                true
            }
            None => false,
        }
    }
}
