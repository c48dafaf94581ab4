use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// Unified error type for task and group failures.
///
/// The error is `Clone` because a single failure fans out to two places: the
/// group's fire-and-forget error handler and the retained "first error" that
/// becomes the group outcome. Wrapped sources are held behind `Arc` to keep
/// that cheap.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// A task reported a plain failure.
    #[error("{0}")]
    Message(String),

    /// A panic intercepted by a panic handler and downgraded to an error.
    #[error("task panicked: {0}")]
    Panic(String),

    /// A bag value failed to serialize.
    #[error("serialization failed: {0}")]
    Serialization(Arc<serde_json::Error>),

    /// Any other error, typically surfaced by `?` inside a task body.
    #[error("{0}")]
    Other(Arc<anyhow::Error>),
}

impl TaskError {
    /// Convenience constructor for a plain failure message.
    pub fn msg<S: Into<String>>(message: S) -> Self {
        Self::Message(message.into())
    }

    /// Renders a panic payload into an error. `panic!` produces `&str` or
    /// `String` payloads; anything else becomes an opaque description.
    pub fn panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panic(message)
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(Arc::new(err))
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(err))
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = TaskError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_displays_verbatim() {
        let err = TaskError::msg("fail");
        assert_eq!(err.to_string(), "fail");
    }

    #[test]
    fn panic_payload_rendering() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        let err = TaskError::panic(payload.as_ref());
        assert_eq!(err.to_string(), "task panicked: boom");

        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        let err = TaskError::panic(payload.as_ref());
        assert!(matches!(err, TaskError::Panic(_)));
    }

    #[test]
    fn anyhow_interop() {
        fn fails() -> Result<()> {
            Err(anyhow::anyhow!("downstream").into())
        }
        assert_eq!(fails().unwrap_err().to_string(), "downstream");
    }
}
