//! Error types for the scheduler and GPU backends.

use std::fmt;

/// Errors that can occur during scheduling, recording and submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Backend initialization failed
    InitializationFailed(String),
    /// Operation performed in the wrong scheduler or batch state
    InvalidState(String),
    /// A parameter was outside its allowed range
    InvalidParameter(String),
    /// The previous occupant of the target frame slot has not completed on the GPU
    FrameNotReady,
    /// The batch pool has no free slots
    OutOfBatches,
    /// All command pools for this frame slot and queue are exhausted
    OutOfCommandBuffers,
    /// A batch dependency list is full
    TooManyDependencies,
    /// The driver rejected a queue submission
    SubmissionFailed(String),
    /// A wait did not finish in time
    Timeout,
    /// The device was lost
    DeviceLost,
    /// The backend does not support a requested feature
    FeatureNotSupported(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::InitializationFailed(msg) => {
                write!(f, "Initialization failed: {}", msg)
            }
            GraphicsError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            GraphicsError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            GraphicsError::FrameNotReady => write!(f, "Frame slot is still in flight"),
            GraphicsError::OutOfBatches => write!(f, "Command batch pool exhausted"),
            GraphicsError::OutOfCommandBuffers => write!(f, "Command pools exhausted"),
            GraphicsError::TooManyDependencies => write!(f, "Batch dependency list is full"),
            GraphicsError::SubmissionFailed(msg) => write!(f, "Submission failed: {}", msg),
            GraphicsError::Timeout => write!(f, "Wait timed out"),
            GraphicsError::DeviceLost => write!(f, "Device lost"),
            GraphicsError::FeatureNotSupported(msg) => {
                write!(f, "Feature not supported: {}", msg)
            }
        }
    }
}

impl std::error::Error for GraphicsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::InitializationFailed("no device".to_string());
        assert_eq!(err.to_string(), "Initialization failed: no device");

        let err = GraphicsError::FrameNotReady;
        assert_eq!(err.to_string(), "Frame slot is still in flight");
    }

    #[test]
    fn test_error_is_std_error() {
        fn assert_error<E: std::error::Error>(_: &E) {}
        assert_error(&GraphicsError::Timeout);
    }
}
