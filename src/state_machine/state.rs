//! Per-conversation session state

use crate::domain::{StateId, INITIAL_STATE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current state and collected slots of one conversation.
///
/// Slot values are plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Session {
    pub state: StateId,
    #[serde(default)]
    pub slots: HashMap<String, String>,
}

impl Session {
    /// Fresh session in the initial state with no slots
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: StateId) -> Self {
        Self {
            state,
            slots: HashMap::new(),
        }
    }

    pub fn with_slot(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.slots.insert(name.into(), value.into());
        self
    }

    pub fn is_initial(&self) -> bool {
        self.state == INITIAL_STATE
    }

    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str)
    }

    /// Overwrite the state and merge `other`'s slots into this session
    pub fn merge_from(&mut self, other: &Session) {
        self.state = other.state;
        for (name, value) in &other.slots {
            self.slots.insert(name.clone(), value.clone());
        }
    }
}
