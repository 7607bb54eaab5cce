//! Delegation to out-of-process extension servers
//!
//! A transition naming an extension hands the session, the user text and a
//! snapshot of the domain to a server, which returns the updated session and
//! the answers to send.

mod error;
mod rest;
#[cfg(test)]
pub mod testing;

pub use error::{ExtensionError, ExtensionErrorKind};
pub use rest::RestDispatcher;

use crate::domain::{Answer, DomainSnapshot};
use crate::state_machine::Session;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything an extension needs to act on a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionRequest {
    /// Session after the transition was applied
    pub session: Session,
    pub extension: String,
    pub command: String,
    pub text: String,
    #[serde(default)]
    pub channel: String,
    pub domain: DomainSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionResponse {
    /// Session to store; slots are merged into the stored ones
    pub session: Session,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

/// A server hosting one or more extensions
#[async_trait]
pub trait ExtensionDispatcher: Send + Sync {
    /// Names of the extensions this server handles
    async fn commands(&self) -> Result<Vec<String>, ExtensionError>;

    async fn dispatch(&self, request: &ExtensionRequest) -> Result<ExtensionResponse, ExtensionError>;
}

#[async_trait]
impl<T: ExtensionDispatcher + ?Sized> ExtensionDispatcher for Arc<T> {
    async fn commands(&self) -> Result<Vec<String>, ExtensionError> {
        (**self).commands().await
    }

    async fn dispatch(&self, request: &ExtensionRequest) -> Result<ExtensionResponse, ExtensionError> {
        (**self).dispatch(request).await
    }
}

/// Routes extension names to the server that handles them
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    routes: HashMap<String, Arc<dyn ExtensionDispatcher>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every server for its extensions and route each name to it.
    ///
    /// Fails if a server cannot be reached or two servers claim a name.
    pub async fn discover(
        servers: impl IntoIterator<Item = (String, Arc<dyn ExtensionDispatcher>)>,
    ) -> Result<Self, ExtensionError> {
        let mut registry = Self::new();
        for (server, dispatcher) in servers {
            let names = dispatcher.commands().await.map_err(|e| {
                ExtensionError::new(e.kind, format!("Listing extensions of '{server}': {e}"))
            })?;
            tracing::info!(server = %server, extensions = ?names, "Extension server registered");
            for name in names {
                registry.register(name, dispatcher.clone())?;
            }
        }
        Ok(registry)
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        dispatcher: Arc<dyn ExtensionDispatcher>,
    ) -> Result<(), ExtensionError> {
        let name = name.into();
        if self.routes.contains_key(&name) {
            return Err(ExtensionError::duplicate(&name));
        }
        self.routes.insert(name, dispatcher);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub async fn dispatch(&self, request: &ExtensionRequest) -> Result<ExtensionResponse, ExtensionError> {
        let dispatcher = self
            .routes
            .get(&request.extension)
            .ok_or_else(|| ExtensionError::unknown_extension(&request.extension))?;
        dispatcher.dispatch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{sample_request, MockDispatcher};
    use super::*;

    #[tokio::test]
    async fn test_discover_routes_names() {
        let weather: Arc<dyn ExtensionDispatcher> =
            Arc::new(MockDispatcher::new(&["get_weather", "get_forecast"]));
        let crm: Arc<dyn ExtensionDispatcher> = Arc::new(MockDispatcher::new(&["save_lead"]));

        let registry =
            ExtensionRegistry::discover(vec![("weather".to_string(), weather), ("crm".to_string(), crm)])
                .await
                .unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["get_forecast", "get_weather", "save_lead"]);
        assert!(registry.contains("save_lead"));
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let a: Arc<dyn ExtensionDispatcher> = Arc::new(MockDispatcher::new(&["lookup"]));
        let b: Arc<dyn ExtensionDispatcher> = Arc::new(MockDispatcher::new(&["lookup"]));
        let err = ExtensionRegistry::discover(vec![("a".to_string(), a), ("b".to_string(), b)])
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ExtensionErrorKind::Duplicate);
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_discovery() {
        let mock = MockDispatcher::new(&[]);
        mock.fail_commands(ExtensionError::transport("connection refused"));
        let server: Arc<dyn ExtensionDispatcher> = Arc::new(mock);
        let err = ExtensionRegistry::discover(vec![("down".to_string(), server)])
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind, ExtensionErrorKind::Transport);
        assert!(err.message.contains("down"));
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_owner() {
        let owner = Arc::new(MockDispatcher::new(&["get_weather"]));
        owner.queue_response(ExtensionResponse {
            session: Session::with_state(2),
            answers: vec![Answer::text("Sunny")],
        });
        let mut registry = ExtensionRegistry::new();
        registry.register("get_weather", owner.clone()).unwrap();

        let response = registry.dispatch(&sample_request("get_weather")).await.unwrap();
        assert_eq!(response.answers, vec![Answer::text("Sunny")]);
        assert_eq!(owner.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_extension() {
        let registry = ExtensionRegistry::new();
        let err = registry.dispatch(&sample_request("nope")).await.unwrap_err();
        assert_eq!(err.kind, ExtensionErrorKind::UnknownExtension);
    }

    #[test]
    fn test_response_answers_default_to_empty() {
        let response: ExtensionResponse =
            serde_json::from_str(r#"{"session": {"state": 1, "slots": {}}}"#).unwrap();
        assert!(response.answers.is_empty());
        assert_eq!(response.session.state, 1);
    }
}
