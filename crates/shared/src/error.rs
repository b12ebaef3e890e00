use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    RateLimited,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Failure reported by the remote roster service.
///
/// `Network` and `Timeout` mean the request never produced an answer; `Rejected`
/// carries the server's structured verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("remote call timed out after {0} ms")]
    Timeout(u64),
    #[error("{code:?}: {message}")]
    Rejected { code: ErrorCode, message: String },
}

impl RemoteError {
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            Self::Network(_) | Self::Timeout(_) => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.code() == Some(ErrorCode::Conflict)
    }
}

impl From<ApiError> for RemoteError {
    fn from(value: ApiError) -> Self {
        Self::Rejected {
            code: value.code,
            message: value.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_converts_into_structured_rejection() {
        let err = RemoteError::from(ApiError::new(ErrorCode::Conflict, "email taken"));
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "Conflict: email taken");
    }

    #[test]
    fn transport_failures_carry_no_code() {
        assert_eq!(RemoteError::Network("reset".into()).code(), None);
        assert_eq!(RemoteError::Timeout(5).code(), None);
        assert!(!RemoteError::rejected(ErrorCode::Validation, "bad").is_conflict());
    }

    #[test]
    fn error_code_uses_snake_case_on_the_wire() {
        let decoded: ApiError =
            serde_json::from_str(r#"{"code":"rate_limited","message":"slow down"}"#)
                .expect("decode");
        assert_eq!(decoded.code, ErrorCode::RateLimited);
    }
}
