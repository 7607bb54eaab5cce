//! Transition resolution
//!
//! Given a classified command, the raw text and a session, find the
//! applicable transition, apply it to the session and report the outcome.
//! Resolution is a handful of hash lookups and never blocks.

use super::{Outcome, Session};
use crate::domain::{Domain, StateId, Transition, ANY, ANY_STATE};

/// Which lookup produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// `(command, any)`: the command works from every state
    AnyState,
    /// `(any, state)`: the state accepts every command
    AnyCommand,
    /// `(command, state)`
    Exact,
}

/// A matched table entry and the key it was found under
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'d> {
    pub kind: MatchKind,
    pub command: &'d str,
    pub state: StateId,
    pub transition: &'d Transition,
}

/// Look up the transition for `command` in `state`.
///
/// Precedence: wildcard state, then wildcard command, then exact match.
pub fn resolve<'d>(domain: &'d Domain, command: &'d str, state: StateId) -> Option<Resolution<'d>> {
    let candidates = [
        (MatchKind::AnyState, command, ANY_STATE),
        (MatchKind::AnyCommand, ANY, state),
        (MatchKind::Exact, command, state),
    ];
    candidates.into_iter().find_map(|(kind, command, state)| {
        domain.transition(command, state).map(|transition| Resolution {
            kind,
            command,
            state,
            transition,
        })
    })
}

/// Execute a classified `command` against `session`.
///
/// An empty command means the classifier was unsure. On a match the slot
/// registered for the matched key is filled from `text` first, then the
/// session moves to the target state.
pub fn execute(domain: &Domain, session: &mut Session, command: &str, text: &str) -> Outcome {
    if command.is_empty() {
        return Outcome::unsure(&domain.defaults().unsure);
    }

    let Some(resolution) = resolve(domain, command, session.state) else {
        tracing::debug!(command = %command, state = session.state, "No transition");
        return Outcome::unknown(&domain.defaults().unknown);
    };

    if let Some(slot) = domain.slot(resolution.command, resolution.state) {
        if let Some(value) = slot.extract(text) {
            session.slots.insert(slot.name.clone(), value.to_string());
        }
    }

    let previous = session.state;
    session.state = resolution.transition.into;

    tracing::debug!(
        command = %command,
        from = previous,
        into = session.state,
        kind = ?resolution.kind,
        "State transitioned"
    );

    match &resolution.transition.extension {
        Some(extension) => Outcome::Delegate {
            extension: extension.clone(),
        },
        None => Outcome::Matched {
            answers: resolution.transition.answers.clone(),
        },
    }
}
