//! Lifecycle state machine for a single connector invocation.

use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Validating,
    Validated,
    Initializing,
    Running,
    Closing,
    Closed,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Closed | LifecycleState::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// `Failed` can be entered from any non-closed state. It is left only
    /// for `Closing`, since cleanup still runs after a failure.
    pub fn can_transition(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Created, Validating)
            | (Validating, Validated)
            | (Validated, Initializing)
            | (Initializing, Running)
            | (Running, Closing)
            | (Closing, Closed)
            | (Failed, Closing) => true,
            (Closed, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "CREATED",
            LifecycleState::Validating => "VALIDATING",
            LifecycleState::Validated => "VALIDATED",
            LifecycleState::Initializing => "INITIALIZING",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Closing => "CLOSING",
            LifecycleState::Closed => "CLOSED",
            LifecycleState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Tracks the current state and every state visited.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    execution_id: String,
    state: LifecycleState,
    history: Vec<LifecycleState>,
    failed: bool,
}

impl Lifecycle {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            state: LifecycleState::Created,
            history: vec![LifecycleState::Created],
            failed: false,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    /// True once any step has failed, even if cleanup has run since.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Move to `next`. Illegal transitions are logged and ignored.
    pub fn advance(&mut self, next: LifecycleState) -> bool {
        if !self.state.can_transition(next) {
            warn!(
                execution_id = %self.execution_id,
                from = %self.state,
                to = %next,
                "Ignoring illegal lifecycle transition"
            );
            return false;
        }
        debug!(execution_id = %self.execution_id, from = %self.state, to = %next, "Lifecycle transition");
        if next == LifecycleState::Failed {
            self.failed = true;
        }
        self.state = next;
        self.history.push(next);
        true
    }

    pub fn fail(&mut self) -> bool {
        self.advance(LifecycleState::Failed)
    }

    /// Finish after `close()`: `Closed` on a clean run, `Failed` otherwise.
    pub fn finish(&mut self, close_ok: bool) {
        if close_ok && !self.failed {
            self.advance(LifecycleState::Closed);
        } else {
            self.fail();
        }
    }
}
