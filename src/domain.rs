//! Compiled dialogue domain
//!
//! Built once from an ordered list of [`TransitionDecl`]s and never mutated
//! afterwards, so it can be shared across requests behind an `Arc`.

mod declaration;
mod snapshot;

pub use declaration::{Answer, Defaults, SlotDecl, SlotMode, TransitionDecl};
pub use snapshot::{DomainSnapshot, SlotEntry, TransitionEntry};

use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

/// Integer id of a state
pub type StateId = i32;

pub const INITIAL: &str = "initial";
pub const INITIAL_STATE: StateId = 0;
/// Wildcard: a state name matching every state, and a command matching every command
pub const ANY: &str = "any";
pub const ANY_STATE: StateId = -1;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Transition #{index} has an empty command")]
    EmptyCommand { index: usize },
    #[error("Transition '{command}' has no origin state")]
    NoOrigin { command: String },
    #[error("Transition '{command}' cannot lead into the wildcard state")]
    WildcardTarget { command: String },
    #[error("Duplicate transition for command '{command}' from state '{state}'")]
    DuplicateTransition { command: String, state: String },
    #[error("Slot '{slot}' uses regex mode but has no pattern")]
    MissingSlotPattern { slot: String },
    #[error("Slot '{slot}' has an invalid pattern: {source}")]
    InvalidSlotPattern {
        slot: String,
        #[source]
        source: regex::Error,
    },
}

/// Bijection between state names and ids.
///
/// `initial` is always 0 and `any` always -1; other states are numbered from
/// 1 in the order they first appear.
#[derive(Debug, Clone)]
pub struct StateTable {
    names: Vec<String>,
    ids: HashMap<String, StateId>,
}

impl StateTable {
    fn new() -> Self {
        let mut ids = HashMap::new();
        ids.insert(INITIAL.to_string(), INITIAL_STATE);
        ids.insert(ANY.to_string(), ANY_STATE);
        Self {
            names: vec![INITIAL.to_string()],
            ids,
        }
    }

    fn intern(&mut self, name: &str) -> StateId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let id = self.names.len() as StateId;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn id(&self, name: &str) -> Option<StateId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: StateId) -> Option<&str> {
        if id == ANY_STATE {
            return Some(ANY);
        }
        usize::try_from(id)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// Concrete states in id order, without the wildcard
    pub fn iter(&self) -> impl Iterator<Item = (StateId, &str)> {
        self.names.iter().enumerate().map(|(i, name)| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let id = i as StateId;
            (id, name.as_str())
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Outcome of a matched transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub into: StateId,
    pub extension: Option<String>,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone)]
pub enum SlotExtractor {
    WholeText,
    Regex(Regex),
}

#[derive(Debug, Clone)]
pub struct SlotSpec {
    pub name: String,
    pub extractor: SlotExtractor,
}

impl SlotSpec {
    /// Value to store for `text`, or `None` when a pattern finds nothing
    pub fn extract<'t>(&self, text: &'t str) -> Option<&'t str> {
        match &self.extractor {
            SlotExtractor::WholeText => Some(text),
            SlotExtractor::Regex(re) => re.find(text).map(|m| m.as_str()),
        }
    }

    fn compile(decl: &SlotDecl) -> Result<Self, DomainError> {
        let extractor = match decl.mode {
            SlotMode::WholeText => SlotExtractor::WholeText,
            SlotMode::Regex => {
                let pattern = decl
                    .regex
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| DomainError::MissingSlotPattern {
                        slot: decl.name.clone(),
                    })?;
                let re = Regex::new(pattern).map_err(|source| DomainError::InvalidSlotPattern {
                    slot: decl.name.clone(),
                    source,
                })?;
                SlotExtractor::Regex(re)
            }
        };
        Ok(Self {
            name: decl.name.clone(),
            extractor,
        })
    }

    fn mode(&self) -> SlotMode {
        match self.extractor {
            SlotExtractor::WholeText => SlotMode::WholeText,
            SlotExtractor::Regex(_) => SlotMode::Regex,
        }
    }

    fn pattern(&self) -> Option<&str> {
        match &self.extractor {
            SlotExtractor::WholeText => None,
            SlotExtractor::Regex(re) => Some(re.as_str()),
        }
    }
}

/// Compiled state, transition and slot tables plus default messages.
///
/// Tables are keyed by command first, then origin state, so lookups take a
/// borrowed command without allocating.
#[derive(Debug, Clone)]
pub struct Domain {
    states: StateTable,
    commands: Vec<String>,
    transitions: HashMap<String, HashMap<StateId, Transition>>,
    slots: HashMap<String, HashMap<StateId, SlotSpec>>,
    defaults: Defaults,
}

impl Domain {
    /// Compile the declarations. A rule with several `from` states produces
    /// one table entry per origin state.
    pub fn new(declarations: &[TransitionDecl], defaults: Defaults) -> Result<Self, DomainError> {
        let mut states = StateTable::new();
        let mut commands: Vec<String> = Vec::new();
        let mut transitions: HashMap<String, HashMap<StateId, Transition>> = HashMap::new();
        let mut slots: HashMap<String, HashMap<StateId, SlotSpec>> = HashMap::new();

        for (index, decl) in declarations.iter().enumerate() {
            if decl.command.is_empty() {
                return Err(DomainError::EmptyCommand { index });
            }
            if decl.from.is_empty() {
                return Err(DomainError::NoOrigin {
                    command: decl.command.clone(),
                });
            }
            if decl.into == ANY {
                return Err(DomainError::WildcardTarget {
                    command: decl.command.clone(),
                });
            }

            let origins: Vec<StateId> = decl.from.iter().map(|s| states.intern(s)).collect();
            let into = states.intern(&decl.into);
            let slot = decl.slot.as_ref().map(SlotSpec::compile).transpose()?;

            if !commands.contains(&decl.command) {
                commands.push(decl.command.clone());
            }

            let by_state = transitions.entry(decl.command.clone()).or_default();
            for origin in origins {
                if by_state.contains_key(&origin) {
                    return Err(DomainError::DuplicateTransition {
                        command: decl.command.clone(),
                        state: states.name(origin).unwrap_or_default().to_string(),
                    });
                }
                by_state.insert(
                    origin,
                    Transition {
                        into,
                        extension: decl.extension.clone().filter(|e| !e.is_empty()),
                        answers: decl.answers.clone(),
                    },
                );
                if let Some(slot) = &slot {
                    slots
                        .entry(decl.command.clone())
                        .or_default()
                        .insert(origin, slot.clone());
                }
            }
        }

        Ok(Self {
            states,
            commands,
            transitions,
            slots,
            defaults,
        })
    }

    pub fn transition(&self, command: &str, state: StateId) -> Option<&Transition> {
        self.transitions.get(command)?.get(&state)
    }

    pub fn slot(&self, command: &str, state: StateId) -> Option<&SlotSpec> {
        self.slots.get(command)?.get(&state)
    }

    pub fn states(&self) -> &StateTable {
        &self.states
    }

    /// Declared commands in first-seen order
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Serializable view handed to extensions
    pub fn snapshot(&self) -> DomainSnapshot {
        let mut transitions: Vec<TransitionEntry> = self
            .transitions
            .iter()
            .flat_map(|(command, by_state)| {
                by_state.iter().map(move |(&state, t)| TransitionEntry {
                    command: command.clone(),
                    state,
                    into: t.into,
                    extension: t.extension.clone(),
                    answers: t.answers.clone(),
                    slot: self.slot(command, state).map(|s| SlotEntry {
                        name: s.name.clone(),
                        mode: s.mode(),
                        regex: s.pattern().map(String::from),
                    }),
                })
            })
            .collect();
        transitions.sort_by(|a, b| (&a.command, a.state).cmp(&(&b.command, b.state)));

        let mut state_table: std::collections::BTreeMap<String, StateId> =
            self.states.iter().map(|(id, name)| (name.to_string(), id)).collect();
        state_table.insert(ANY.to_string(), ANY_STATE);

        DomainSnapshot {
            state_table,
            commands: self.commands.clone(),
            transitions,
            defaults: self.defaults.clone(),
        }
    }
}
