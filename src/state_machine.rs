//! Dialog engine
//!
//! Pure state transitions over a compiled [`Domain`](crate::domain::Domain).
//! Persistence and extension calls happen in the caller.

mod outcome;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use outcome::{default_answers, Outcome};
pub use state::Session;
pub use transition::{execute, resolve, MatchKind, Resolution};
