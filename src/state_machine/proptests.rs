//! Property-based tests for the dialog engine
//!
//! Random domains over a small alphabet of states and commands, checked
//! against invariants that must hold for every input.

use super::*;
use crate::domain::{Defaults, Domain, SlotMode, TransitionDecl, ANY, ANY_STATE};
use proptest::prelude::*;
use std::collections::HashSet;

const STATE_NAMES: &[&str] = &["initial", "a", "b", "c"];
const COMMANDS: &[&str] = &["x", "y", "z"];

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_state_name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(STATE_NAMES)
}

fn arb_command() -> impl Strategy<Value = &'static str> {
    prop::sample::select(COMMANDS)
}

fn arb_rule() -> impl Strategy<Value = (Vec<&'static str>, &'static str, &'static str)> {
    (
        prop::sample::subsequence(STATE_NAMES, 1..=STATE_NAMES.len()),
        arb_state_name(),
        arb_command(),
    )
}

/// Rules with colliding `(command, origin)` keys are dropped so the domain
/// always compiles.
fn arb_decls() -> impl Strategy<Value = Vec<TransitionDecl>> {
    proptest::collection::vec(arb_rule(), 1..12).prop_map(|rules| {
        let mut seen = HashSet::new();
        let mut decls = Vec::new();
        for (i, (from, into, command)) in rules.into_iter().enumerate() {
            let from: Vec<&str> = from
                .into_iter()
                .filter(|origin| !seen.contains(&(command, *origin)))
                .collect();
            if from.is_empty() {
                continue;
            }
            for origin in &from {
                seen.insert((command, *origin));
            }
            decls.push(TransitionDecl::new(&from, into, command).answer(format!("rule {i}")));
        }
        decls
    })
}

fn arb_domain() -> impl Strategy<Value = Domain> {
    arb_decls().prop_map(|decls| {
        Domain::new(&decls, Defaults::default()).expect("generated domain compiles")
    })
}

fn arb_session(domain: &Domain) -> impl Strategy<Value = Session> {
    let ids: Vec<_> = domain.states().iter().map(|(id, _)| id).collect();
    (prop::sample::select(ids), "[a-z]{0,5}")
        .prop_map(|(state, value)| Session::with_state(state).with_slot("kept", value))
}

fn arb_domain_and_session() -> impl Strategy<Value = (Domain, Session)> {
    arb_domain().prop_flat_map(|domain| {
        let session = arb_session(&domain);
        (Just(domain), session)
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Unsure input never touches the session
    #[test]
    fn prop_unsure_is_noop((domain, session) in arb_domain_and_session(), text in ".{0,20}") {
        let mut after = session.clone();
        let outcome = execute(&domain, &mut after, "", &text);
        prop_assert!(
            matches!(outcome, Outcome::Unsure { .. }),
            "expected unsure, got {:?}",
            outcome
        );
        prop_assert_eq!(after, session);
    }

    // Unknown outcomes leave the session unchanged; matches land on a concrete state
    #[test]
    fn prop_outcome_consistent_with_session(
        (domain, session) in arb_domain_and_session(),
        command in prop_oneof![arb_command(), Just("undeclared")],
    ) {
        let mut after = session.clone();
        let outcome = execute(&domain, &mut after, command, "text");
        match outcome {
            Outcome::Unknown { .. } => {
                prop_assert!(resolve(&domain, command, session.state).is_none());
                prop_assert_eq!(after, session);
            }
            Outcome::Matched { .. } | Outcome::Delegate { .. } => {
                prop_assert_ne!(after.state, ANY_STATE);
                prop_assert!(domain.states().name(after.state).is_some());
                prop_assert_eq!(after.slots, session.slots);
            }
            Outcome::Unsure { .. } => prop_assert!(false, "non-empty command reported unsure"),
        }
    }

    // Every origin of a multi-origin rule behaves like a separate rule
    #[test]
    fn prop_multi_origin_expands(
        from in prop::sample::subsequence(STATE_NAMES, 1..=STATE_NAMES.len()),
        into in arb_state_name(),
    ) {
        let decls = vec![TransitionDecl::new(&from, into, "go").answer("went")];
        let domain = Domain::new(&decls, Defaults::default()).unwrap();
        let target = domain.states().id(into).unwrap();

        for (id, name) in domain.states().iter() {
            let mut session = Session::with_state(id);
            let outcome = execute(&domain, &mut session, "go", "");
            if from.contains(&name) {
                prop_assert!(outcome.is_match());
                prop_assert_eq!(session.state, target);
            } else {
                prop_assert!(
                    matches!(outcome, Outcome::Unknown { .. }),
                    "expected unknown, got {:?}",
                    outcome
                );
                prop_assert_eq!(session.state, id);
            }
        }
    }

    // A rule from the wildcard state wins over every other rule for its command
    #[test]
    fn prop_any_state_wins(
        decls in arb_decls(),
        command in arb_command(),
        into in arb_state_name(),
    ) {
        let mut decls: Vec<_> = decls.into_iter().filter(|d| d.command != command).collect();
        decls.push(TransitionDecl::new(&[ANY], into, command).answer("wildcard"));
        // Per-state rules for the same command are shadowed
        decls.push(TransitionDecl::new(&["a"], "b", command).answer("shadowed"));
        let domain = Domain::new(&decls, Defaults::default()).unwrap();
        let target = domain.states().id(into).unwrap();

        for (id, _) in domain.states().iter() {
            let mut session = Session::with_state(id);
            let outcome = execute(&domain, &mut session, command, "");
            prop_assert_eq!(outcome.answers()[0].text.as_str(), "wildcard");
            prop_assert_eq!(session.state, target);
        }
    }

    // A wildcard-command rule accepts any classified command from its state
    #[test]
    fn prop_any_command_accepts_everything(command in "[a-z_]{1,12}", text in "[a-zA-Z ]{1,20}") {
        let decls = vec![
            TransitionDecl::new(&["initial"], "waiting", "start"),
            TransitionDecl::new(&["waiting"], "initial", ANY)
                .slot("reply", SlotMode::WholeText, None)
                .answer("got it"),
        ];
        let domain = Domain::new(&decls, Defaults::default()).unwrap();
        let waiting = domain.states().id("waiting").unwrap();

        let mut session = Session::with_state(waiting);
        let outcome = execute(&domain, &mut session, &command, &text);
        prop_assert!(
            matches!(outcome, Outcome::Matched { .. }),
            "expected a match, got {:?}",
            outcome
        );
        prop_assert!(session.is_initial());
        prop_assert_eq!(session.slot("reply"), Some(text.as_str()));
    }
}
