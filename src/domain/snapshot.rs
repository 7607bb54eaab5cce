//! Serializable view of a compiled domain

use super::{Answer, Defaults, SlotMode, StateId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub name: String,
    pub mode: SlotMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

/// One compiled `(command, state)` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEntry {
    pub command: String,
    pub state: StateId,
    pub into: StateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    pub answers: Vec<Answer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<SlotEntry>,
}

/// The domain as sent to extensions: tables only, no compiled patterns.
///
/// Transitions are sorted by command, then origin state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSnapshot {
    pub state_table: BTreeMap<String, StateId>,
    pub commands: Vec<String>,
    pub transitions: Vec<TransitionEntry>,
    pub defaults: Defaults,
}
