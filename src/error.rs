// Error types for the swerve stack

use crate::motor::feetech::FeetechError;

/// Errors raised while building or commanding the swerve drive
#[derive(Debug, thiserror::Error)]
pub enum SwerveError {
    #[error("Invalid module geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid constant `{name}`: {value}")]
    InvalidConstant { name: &'static str, value: f64 },

    #[error("Servo ID {0} assigned more than once")]
    DuplicateServoId(u8),

    #[error("Motor bus error: {0}")]
    Bus(#[from] FeetechError),

    #[error("Motor bus lock poisoned")]
    BusPoisoned,
}

pub type Result<T> = std::result::Result<T, SwerveError>;

/// Reject zero, negative and non-finite physical constants
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SwerveError::InvalidConstant { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_positive() {
        assert_eq!(ensure_positive("ratio", 6.75).unwrap(), 6.75);
        assert!(ensure_positive("ratio", 0.0).is_err());
        assert!(ensure_positive("ratio", -1.0).is_err());
        assert!(ensure_positive("ratio", f64::NAN).is_err());
        assert!(ensure_positive("ratio", f64::INFINITY).is_err());
    }

    #[test]
    fn test_error_message_names_constant() {
        let err = ensure_positive("wheel_diameter", 0.0).unwrap_err();
        assert_eq!(err.to_string(), "Invalid constant `wheel_diameter`: 0");
    }
}
