use thiserror::Error;

/// Unrecoverable setup failure. The listener that produced it cannot be used
/// any further and has to be rebuilt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{step} failed: {message}")]
pub struct ListenerError {
    pub step: String,
    pub message: String,
}

impl ListenerError {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
        }
    }
}

/// Raised when reading the value of an `Outcome` that does not carry one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeError {
    #[error("outcome carries no value")]
    NoValue,
}
