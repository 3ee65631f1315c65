//! Generation state machine (spec SS3, SS4.D): forward-only, a row never
//! re-enters `Pending`. Grounded on `domains/jobs/src/domain/state.rs`'s
//! `JobState`/`JobEvent`/`JobStateMachine` shape, states renamed per
//! SPEC_FULL SS3 (the teacher's `Queued` becomes our `Pending`).

pub use studio_common::StateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl GenerationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn valid_transitions(&self) -> &'static [GenerationState] {
        match self {
            Self::Pending => &[Self::Processing, Self::Cancelled],
            Self::Processing => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed => &[],
            Self::Failed => &[],
            Self::Cancelled => &[],
        }
    }
}

impl std::fmt::Display for GenerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Events that trigger generation state transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// A worker dequeues the job and begins processing (spec SS4.F step 1).
    Dequeue,
    /// Outputs attached, generation succeeded (spec SS4.F step 7).
    Success,
    /// Worker gave up: insufficient tokens, provider failure, or the queue
    /// exhausted its retry budget (spec SS4.F step 9, SS5).
    Failure,
    /// User- or system-initiated cancellation.
    Cancel,
}

impl std::fmt::Display for GenerationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dequeue => write!(f, "dequeue"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

pub struct GenerationStateMachine;

impl GenerationStateMachine {
    /// Attempt a state transition. Only forward transitions are allowed;
    /// a terminal state never transitions again (spec SS4.D).
    pub fn transition(
        current: GenerationState,
        event: GenerationEvent,
    ) -> Result<GenerationState, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        let next = match (&current, &event) {
            (GenerationState::Pending, GenerationEvent::Dequeue) => GenerationState::Processing,
            (GenerationState::Pending, GenerationEvent::Cancel) => GenerationState::Cancelled,

            (GenerationState::Processing, GenerationEvent::Success) => GenerationState::Completed,
            (GenerationState::Processing, GenerationEvent::Failure) => GenerationState::Failed,
            (GenerationState::Processing, GenerationEvent::Cancel) => GenerationState::Cancelled,

            _ => {
                return Err(StateError::InvalidTransition {
                    from: current.to_string(),
                    to: "unknown".to_string(),
                    event: event.to_string(),
                });
            }
        };

        Ok(next)
    }

    pub fn can_transition(current: GenerationState, event: &GenerationEvent) -> bool {
        Self::transition(current, event.clone()).is_ok()
    }
}
