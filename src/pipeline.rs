//! Text normalization shared by classifier training and prediction

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Default minimum confidence for accepting a prediction
pub const DEFAULT_THRESHOLD: f64 = 0.1;

/// Pipeline options, stored alongside the trained model so prediction
/// normalizes exactly like training did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_true")]
    pub remove_symbols: bool,
    #[serde(default = "default_true")]
    pub lower: bool,
    /// Minimum confidence in `[0, 1]`; equal values are accepted
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            remove_symbols: true,
            lower: true,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

fn symbol_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\W+").expect("static pattern"))
}

/// Normalize `text` into tokens.
///
/// Order is fixed: strip symbols, lowercase, split on whitespace.
pub fn normalize(text: &str, config: &PipelineConfig) -> Vec<String> {
    let mut text = if config.remove_symbols {
        remove_symbols(text)
    } else {
        text.to_string()
    };
    if config.lower {
        text = text.to_lowercase();
    }
    tokenize(&text)
}

/// Replace every run of non-word characters with a single space
pub fn remove_symbols(text: &str) -> String {
    symbol_re().replace_all(text, " ").into_owned()
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(String::from).collect()
}
