//! Request lifecycle tracking

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lifecycle state of a compression request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RequestState {
    /// Payload received
    Received,
    /// Request invariants hold
    Validated,
    /// Size and tier gates passed
    PolicyChecked,
    /// Engine running
    Compressing,
    /// Engine produced an artifact
    Compressed,
    /// Usage record written
    Recorded,
    /// Usage record could not be written
    RecordFailed,
    /// Result returned to the caller
    Responded,
    /// Refused by validation or policy
    Rejected,
    /// Failed after passing policy
    Failed,
}

impl RequestState {
    /// Check if the state is terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Responded | Self::Rejected | Self::Failed)
    }

    /// Check whether moving to `next` is a legal transition
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Received, Validated)
                | (Received, Rejected)
                | (Validated, PolicyChecked)
                | (Validated, Rejected)
                | (PolicyChecked, Compressing)
                | (PolicyChecked, Rejected)
                | (PolicyChecked, Failed)
                | (Compressing, Compressed)
                | (Compressing, Failed)
                | (Compressed, Recorded)
                | (Compressed, RecordFailed)
                | (Compressed, Responded)
                | (Recorded, Responded)
                | (RecordFailed, Responded)
        )
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::PolicyChecked => "policy_checked",
            Self::Compressing => "compressing",
            Self::Compressed => "compressed",
            Self::Recorded => "recorded",
            Self::RecordFailed => "record_failed",
            Self::Responded => "responded",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Ordered history of the states a request went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTrail {
    states: Vec<RequestState>,
}

impl StateTrail {
    /// Start a trail in `Received`
    pub fn new() -> Self {
        Self {
            states: vec![RequestState::Received],
        }
    }

    /// Current state
    pub fn current(&self) -> RequestState {
        self.states
            .last()
            .copied()
            .unwrap_or(RequestState::Received)
    }

    /// Move to `next`. Illegal transitions are ignored and reported as `false`.
    pub fn advance(&mut self, next: RequestState) -> bool {
        if self.current().can_transition_to(next) {
            self.states.push(next);
            true
        } else {
            false
        }
    }

    /// All visited states, oldest first
    pub fn states(&self) -> &[RequestState] {
        &self.states
    }
}

impl Default for StateTrail {
    fn default() -> Self {
        Self::new()
    }
}
