//! Lifecycle transitions for config entries
//!
//! ```text
//! NotLoaded -> SetupInProgress -> Loaded
//!                              -> SetupError -> SetupInProgress
//!                              -> SetupRetry -> SetupInProgress
//!                              -> MigrationError (terminal)
//!
//! Loaded | SetupError | SetupRetry -> UnloadInProgress -> NotLoaded
//!                                                      -> FailedUnload (terminal)
//! ```

use crate::entry::ConfigEntryState;
use std::time::Duration;
use thiserror::Error;

/// Rejected lifecycle transition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid state transition from {from:?} to {to:?}: {reason}")]
pub struct InvalidTransition {
    pub from: ConfigEntryState,
    pub to: ConfigEntryState,
    pub reason: &'static str,
}

impl ConfigEntryState {
    /// Validate a move to `to`, returning the new state
    pub fn try_transition(
        self,
        to: ConfigEntryState,
    ) -> Result<ConfigEntryState, InvalidTransition> {
        use ConfigEntryState::*;

        let valid = matches!(
            (self, to),
            (NotLoaded, SetupInProgress)
                | (SetupInProgress, Loaded | SetupError | SetupRetry | MigrationError)
                | (SetupError | SetupRetry, SetupInProgress | UnloadInProgress)
                | (Loaded, UnloadInProgress)
                | (UnloadInProgress, NotLoaded | FailedUnload)
        );

        if valid {
            Ok(to)
        } else {
            Err(InvalidTransition {
                from: self,
                to,
                reason: rejection_reason(self, to),
            })
        }
    }

    pub fn can_transition_to(self, to: ConfigEntryState) -> bool {
        self.try_transition(to).is_ok()
    }
}

fn rejection_reason(from: ConfigEntryState, to: ConfigEntryState) -> &'static str {
    use ConfigEntryState::*;

    match (from, to) {
        (MigrationError, _) => "MigrationError is terminal",
        (FailedUnload, _) => "FailedUnload is terminal",
        (SetupInProgress, _) => "setup in progress must finish first",
        (UnloadInProgress, _) => "unload in progress must finish first",
        (NotLoaded, _) => "must go through SetupInProgress",
        (Loaded, SetupInProgress) => "already loaded, unload first",
        (Loaded, _) => "must go through UnloadInProgress",
        _ => "invalid state transition",
    }
}

/// Backoff before the next setup attempt of a not-ready entry.
///
/// `5 * 2^min(tries, 4)` seconds plus up to 100ms of jitter, so the
/// sequence is 5, 10, 20, 40, 80, 80, ... seconds.
pub fn calculate_retry_delay(tries: u32) -> Duration {
    let base = 2_u64.pow(tries.min(4)) * 5;
    let jitter = rand::random::<f64>() * 0.1;
    Duration::from_secs_f64(base as f64 + jitter)
}
