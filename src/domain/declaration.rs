//! Declarative transition rules, as read from a bot definition

use serde::{Deserialize, Deserializer, Serialize};

/// One response item
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Answer {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// Messages used when no transition produces an answer.
///
/// An empty string means "say nothing".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_unknown")]
    pub unknown: String,
    #[serde(default = "default_unsure")]
    pub unsure: String,
    #[serde(default = "default_error")]
    pub error: String,
}

fn default_unknown() -> String {
    "Unknown command, try something different.".to_string()
}

fn default_unsure() -> String {
    "Not sure I understood, try something different.".to_string()
}

fn default_error() -> String {
    "There was an error, try again later.".to_string()
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            unknown: default_unknown(),
            unsure: default_unsure(),
            error: default_error(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotMode {
    /// Store the raw text verbatim
    #[serde(alias = "whole-text")]
    WholeText,
    /// Store the first match of the slot's pattern
    Regex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDecl {
    pub name: String,
    pub mode: SlotMode,
    #[serde(default, alias = "pattern", skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

/// A transition rule. Several origin states share the rest of the rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDecl {
    #[serde(deserialize_with = "one_or_many")]
    pub from: Vec<String>,
    pub into: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<SlotDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, alias = "message")]
    pub answers: Vec<Answer>,
}

impl TransitionDecl {
    pub fn new(from: &[&str], into: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            from: from.iter().map(|s| (*s).to_string()).collect(),
            into: into.into(),
            command: command.into(),
            slot: None,
            extension: None,
            answers: vec![],
        }
    }

    pub fn answer(mut self, text: impl Into<String>) -> Self {
        self.answers.push(Answer::text(text));
        self
    }

    pub fn slot(mut self, name: impl Into<String>, mode: SlotMode, regex: Option<&str>) -> Self {
        self.slot = Some(SlotDecl {
            name: name.into(),
            mode,
            regex: regex.map(String::from),
        });
        self
    }

    pub fn extension(mut self, name: impl Into<String>) -> Self {
        self.extension = Some(name.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}
