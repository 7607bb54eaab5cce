//! Parley - a dialogue-management runtime
//!
//! Classifies user text into commands, drives a per-conversation state
//! machine over them, and persists sessions in a pluggable store.

#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

pub mod bot;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod extension;
pub mod pipeline;
pub mod signals;
pub mod state_machine;
pub mod store;

pub use bot::{Bot, BotError, Brain, Message, Reply, ReplyKind};
pub use config::{BotDefinition, Config};
