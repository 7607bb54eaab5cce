//! Mock dispatcher for tests

use super::{ExtensionDispatcher, ExtensionError, ExtensionRequest, ExtensionResponse};
use crate::domain::{Defaults, Domain, TransitionDecl};
use crate::state_machine::Session;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Dispatcher that returns queued responses and records requests
pub struct MockDispatcher {
    commands: Vec<String>,
    commands_error: Mutex<Option<ExtensionError>>,
    responses: Mutex<VecDeque<Result<ExtensionResponse, ExtensionError>>>,
    requests: Mutex<Vec<ExtensionRequest>>,
}

impl MockDispatcher {
    pub fn new(commands: &[&str]) -> Self {
        Self {
            commands: commands.iter().map(|c| (*c).to_string()).collect(),
            commands_error: Mutex::new(None),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `commands` call fail
    pub fn fail_commands(&self, error: ExtensionError) {
        *self.commands_error.lock().unwrap() = Some(error);
    }

    pub fn queue_response(&self, response: ExtensionResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: ExtensionError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<ExtensionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtensionDispatcher for MockDispatcher {
    async fn commands(&self) -> Result<Vec<String>, ExtensionError> {
        match self.commands_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(self.commands.clone()),
        }
    }

    async fn dispatch(&self, request: &ExtensionRequest) -> Result<ExtensionResponse, ExtensionError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ExtensionError::transport("no queued response")))
    }
}

/// A request for `extension` against a one-rule domain
pub fn sample_request(extension: &str) -> ExtensionRequest {
    let decls = vec![TransitionDecl::new(&["initial"], "asked", "weather").extension(extension)];
    let domain = Domain::new(&decls, Defaults::default()).unwrap();
    ExtensionRequest {
        session: Session::with_state(1),
        extension: extension.to_string(),
        command: "weather".to_string(),
        text: "weather in Oslo".to_string(),
        channel: "test".to_string(),
        domain: domain.snapshot(),
    }
}
