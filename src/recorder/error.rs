use super::state::SessionState;
use std::time::Duration;
use thiserror::Error;

/// Errors from session and batch control
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Camera or encoder is not usable; the session stays idle
    #[error("Cannot start recording: {0}")]
    Precondition(String),

    /// Gating timed out; the session stays idle and may be started again
    #[error("No consumer attached to marker stream '{stream}' within {waited:?}")]
    NoConsumers { stream: String, waited: Duration },

    #[error("Cannot {action} while the session is {state:?}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    #[error("Session already stopped; create a new one to record again")]
    AlreadyStopped,

    #[error("A batch is still active; stop it before creating another")]
    BatchActive,
}

pub type SessionResult<T> = Result<T, SessionError>;
