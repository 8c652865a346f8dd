//! Errors of the control core: model, planner and controller

/// Local, synchronous errors raised by the control core. None of them is retried by the core
/// itself; the loop driver decides what to command when a tick is aborted.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    /// Joint-space input does not have one value per joint of the chain.
    DimensionMismatch { expected: usize, found: usize },
    /// Trajectory timing or shape parameters are not valid, fatal at construction.
    InvalidProfile(String),
    /// State dependent query before the first joint state update.
    ModelNotReady,
    /// Measured joint positions or velocities contain NaN or infinity.
    NonFiniteState,
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            ControlError::DimensionMismatch { expected, found } =>
                write!(f, "Dimension mismatch: expected {}, found {}", expected, found),
            ControlError::InvalidProfile(ref msg) =>
                write!(f, "Invalid trajectory profile: {}", msg),
            ControlError::ModelNotReady =>
                write!(f, "Model not ready: joint state has not been received yet"),
            ControlError::NonFiniteState =>
                write!(f, "Non-finite joint state rejected"),
        }
    }
}

impl std::error::Error for ControlError {}

/// Checks that a joint-space vector has `expected` entries.
pub(crate) fn check_len(expected: usize, found: usize) -> Result<(), ControlError> {
    if expected != found {
        return Err(ControlError::DimensionMismatch { expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ControlError::DimensionMismatch { expected: 7, found: 6 };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 7, found 6");
        assert!(ControlError::ModelNotReady.to_string().contains("not ready"));
        assert!(ControlError::NonFiniteState.to_string().contains("Non-finite"));
    }

    #[test]
    fn test_check_len() {
        assert!(check_len(3, 3).is_ok());
        assert_eq!(check_len(3, 2), Err(ControlError::DimensionMismatch { expected: 3, found: 2 }));
    }
}
