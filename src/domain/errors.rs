use serde::Serialize;
use thiserror::Error;

/// Gateway-level error taxonomy. Every variant maps to a stable HTTP status
/// for the (external, unimplemented here) router layer to consult via
/// `http_status`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream error: status={status} body={body}")]
    Upstream { status: u16, body: String },

    #[error("upstream request timed out after {0}ms")]
    Timeout(u64),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("insufficient history: requested {requested} bars, got {available} after as-of clipping")]
    InsufficientHistory { requested: usize, available: usize },

    #[error("invalid OHLC bar at timestamp {timestamp}: {reason}")]
    InvalidOhlc { timestamp: i64, reason: String },

    #[error("cache store unavailable: {0}")]
    CacheUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::InvalidInput(_) => 400,
            GatewayError::Upstream { .. } => 502,
            GatewayError::Timeout(_) => 504,
            GatewayError::InsufficientData(_) => 422,
            GatewayError::InsufficientHistory { .. } => 422,
            GatewayError::InvalidOhlc { .. } => 502,
            GatewayError::CacheUnavailable(_) => 503,
            GatewayError::Internal(_) => 500,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            GatewayError::InvalidInput(_) => "invalid_input",
            GatewayError::Upstream { .. } => "upstream_error",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::InsufficientData(_) => "insufficient_data",
            GatewayError::InsufficientHistory { .. } => "insufficient_history",
            GatewayError::InvalidOhlc { .. } => "invalid_ohlc",
            GatewayError::CacheUnavailable(_) => "cache_unavailable",
            GatewayError::Internal(_) => "internal",
        }
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            success: false,
            error: ErrorBody {
                r#type: self.error_type(),
                message: self.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub r#type: &'static str,
    pub message: String,
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_maps_to_400() {
        let err = GatewayError::InvalidInput("bad symbol".into());
        assert_eq!(err.http_status(), 400);
        assert!(err.to_string().contains("bad symbol"));
    }

    #[test]
    fn upstream_error_maps_to_502() {
        let err = GatewayError::Upstream { status: 503, body: "maintenance".into() };
        assert_eq!(err.http_status(), 502);
    }

    #[test]
    fn insufficient_history_message_includes_counts() {
        let err = GatewayError::InsufficientHistory { requested: 200, available: 50 };
        assert_eq!(err.http_status(), 422);
        assert!(err.to_string().contains("200"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn envelope_shape() {
        let err = GatewayError::Internal("boom".into());
        let envelope = err.to_envelope();
        assert!(!envelope.success);
        assert_eq!(envelope.error.r#type, "internal");
    }
}
