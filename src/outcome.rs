use crate::error::{ListenerError, OutcomeError};

const NO_ERROR_MESSAGE: &str = "(no error message)";

/// Outcome of a capture facility call whose failure is expected and
/// recoverable. A failed outcome may still carry a best-effort value.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    value: Option<T>,
    success: bool,
    error_message: Option<String>,
}

impl<T> Outcome<T> {
    pub fn success(value: T) -> Self {
        Self {
            value: Some(value),
            success: true,
            error_message: None,
        }
    }

    /// Failure that still hands back the (partial) value.
    pub fn fail_with(value: T, message: impl Into<String>) -> Self {
        Self {
            value: Some(value),
            success: false,
            error_message: Some(message.into()),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            value: None,
            success: false,
            error_message: Some(message.into()),
        }
    }

    pub fn success_on_predicate<P>(value: T, message: &str, predicate: P) -> Self
    where
        P: FnOnce(&T) -> bool,
    {
        if predicate(&value) {
            Self::success(value)
        } else {
            Self::fail_with(value, message)
        }
    }

    /// Like `success_on_predicate`, but the message is only built on failure.
    pub fn success_on_predicate_lazy<P, M>(value: T, message: M, predicate: P) -> Self
    where
        P: FnOnce(&T) -> bool,
        M: FnOnce(&T) -> String,
    {
        if predicate(&value) {
            Self::success(value)
        } else {
            let message = message(&value);
            Self::fail_with(value, message)
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Result<&T, OutcomeError> {
        self.value.as_ref().ok_or(OutcomeError::NoValue)
    }

    pub fn into_value(self) -> Result<T, OutcomeError> {
        self.value.ok_or(OutcomeError::NoValue)
    }

    pub fn error_message(&self) -> &str {
        self.error_message.as_deref().unwrap_or(NO_ERROR_MESSAGE)
    }

    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        Outcome {
            value: self.value.map(f),
            success: self.success,
            error_message: self.error_message,
        }
    }

    /// Turns a failure into a setup error attributed to `step`.
    pub fn into_result(self, step: &str) -> Result<T, ListenerError> {
        if !self.success {
            return Err(ListenerError::new(step, self.error_message()));
        }
        self.value
            .ok_or_else(|| ListenerError::new(step, OutcomeError::NoValue.to_string()))
    }
}

impl<T> Outcome<T>
where
    T: PartialEq + From<u8>,
{
    /// Success iff `value == 0`, for "zero means OK" style return codes.
    pub fn success_on_zero(value: T, message: &str) -> Self {
        Self::success_on_predicate(value, message, |v| *v == T::from(0))
    }

    pub fn success_on_zero_lazy<M>(value: T, message: M) -> Self
    where
        M: FnOnce(&T) -> String,
    {
        Self::success_on_predicate_lazy(value, message, |v| *v == T::from(0))
    }
}
