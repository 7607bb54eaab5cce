//! Results of executing a command

use crate::domain::Answer;

/// What one `execute` call produced.
///
/// Unsure and unknown commands are ordinary outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No confident classification; session untouched
    Unsure { answers: Vec<Answer> },
    /// No transition from the current state; session untouched
    Unknown { answers: Vec<Answer> },
    /// Transition applied, reply with its answers
    Matched { answers: Vec<Answer> },
    /// Transition applied, the caller must run this extension
    Delegate { extension: String },
}

impl Outcome {
    pub fn unsure(message: &str) -> Self {
        Outcome::Unsure {
            answers: default_answers(message),
        }
    }

    pub fn unknown(message: &str) -> Self {
        Outcome::Unknown {
            answers: default_answers(message),
        }
    }

    /// Answers carried by the outcome; empty for delegation
    pub fn answers(&self) -> &[Answer] {
        match self {
            Outcome::Unsure { answers }
            | Outcome::Unknown { answers }
            | Outcome::Matched { answers } => answers,
            Outcome::Delegate { .. } => &[],
        }
    }

    /// Whether the session was transitioned
    pub fn is_match(&self) -> bool {
        matches!(self, Outcome::Matched { .. } | Outcome::Delegate { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Unsure { .. } => "unsure",
            Outcome::Unknown { .. } => "unknown",
            Outcome::Matched { .. } => "matched",
            Outcome::Delegate { .. } => "delegate",
        }
    }
}

/// A configured default message as answers; empty means say nothing
pub fn default_answers(message: &str) -> Vec<Answer> {
    if message.is_empty() {
        vec![]
    } else {
        vec![Answer::text(message)]
    }
}
