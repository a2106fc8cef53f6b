use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("dimension mismatch in {op}: {lhs} vs {rhs}")]
    DimensionMismatch {
        op: &'static str,
        lhs: String,
        rhs: String,
    },

    #[error("invalid argument to {op}: {reason}")]
    InvalidArgument { op: &'static str, reason: String },

    #[error("operation not implemented: {op}")]
    Unsupported { op: &'static str },

    #[error("device failure in {op}: {reason}")]
    DeviceFailure { op: &'static str, reason: String },
}

impl DeviceError {
    pub fn shape_mismatch(op: &'static str, lhs: (usize, usize), rhs: (usize, usize)) -> Self {
        Self::DimensionMismatch {
            op,
            lhs: format!("{}x{}", lhs.0, lhs.1),
            rhs: format!("{}x{}", rhs.0, rhs.1),
        }
    }

    pub fn len_mismatch(op: &'static str, lhs: usize, rhs: usize) -> Self {
        Self::DimensionMismatch {
            op,
            lhs: format!("len {lhs}"),
            rhs: format!("len {rhs}"),
        }
    }

    pub fn invalid(op: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            op,
            reason: reason.into(),
        }
    }
}
