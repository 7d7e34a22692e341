use thiserror::Error;

/// Errors raised while constructing or validating domain values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Invalid argument '{field}': {message}")]
    InvalidArgument { field: String, message: String },

    #[error("Value {value} for '{field}' is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

impl ModelError {
    pub fn invalid_argument(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Check that `value` lies in the closed interval `[min, max]`.
    pub(crate) fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), Self> {
        if value.is_nan() || value < min || value > max {
            return Err(Self::OutOfRange {
                field: field.to_string(),
                value,
                min,
                max,
            });
        }
        Ok(())
    }
}
