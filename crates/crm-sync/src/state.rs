//! Per-attempt mutation lifecycle
//!
//! `Idle -> Applied -> {Confirmed | RevertedRecoverable | AppliedTerminalFailure}`;
//! `Confirmed` and `RevertedRecoverable` return to `Idle`,
//! `AppliedTerminalFailure` is absorbing.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one mutation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationState {
    /// Nothing applied yet
    Idle,
    /// Written locally and shown, request outstanding
    Applied,
    /// Remote accepted the change
    Confirmed,
    /// Remote rejected the change and local state was restored
    RevertedRecoverable,
    /// Session unusable; optimistic change left in place
    AppliedTerminalFailure,
}

impl MutationState {
    /// No transition leaves this state
    #[inline]
    #[must_use]
    pub fn is_absorbing(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

/// Illegal lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal mutation transition: {from:?} -> {to:?}")]
pub struct TransitionError {
    /// State the attempt was in
    pub from: MutationState,
    /// State that was requested
    pub to: MutationState,
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: MutationState) -> &'static [MutationState] {
    use MutationState::*;
    match from {
        Idle => &[Applied],
        Applied => &[Confirmed, RevertedRecoverable, AppliedTerminalFailure],
        Confirmed | RevertedRecoverable => &[Idle],
        AppliedTerminalFailure => &[],
    }
}

/// Validates a state transition.
///
/// # Errors
/// [`TransitionError`] when `to` is not reachable from `from`
pub fn validate_transition(from: MutationState, to: MutationState) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::MutationState::*;
    use super::*;

    #[test]
    fn happy_path_returns_to_idle() {
        assert!(validate_transition(Idle, Applied).is_ok());
        assert!(validate_transition(Applied, Confirmed).is_ok());
        assert!(validate_transition(Confirmed, Idle).is_ok());
    }

    #[test]
    fn recoverable_path_returns_to_idle() {
        assert!(validate_transition(Applied, RevertedRecoverable).is_ok());
        assert!(validate_transition(RevertedRecoverable, Idle).is_ok());
    }

    #[test]
    fn terminal_failure_is_absorbing() {
        assert!(validate_transition(Applied, AppliedTerminalFailure).is_ok());
        assert!(AppliedTerminalFailure.is_absorbing());
        for to in [Idle, Applied, Confirmed, RevertedRecoverable] {
            assert_eq!(
                validate_transition(AppliedTerminalFailure, to),
                Err(TransitionError { from: AppliedTerminalFailure, to })
            );
        }
    }

    #[test]
    fn cannot_settle_without_applying() {
        assert!(validate_transition(Idle, Confirmed).is_err());
        assert!(validate_transition(Idle, AppliedTerminalFailure).is_err());
        assert!(!Idle.is_absorbing());
    }
}
