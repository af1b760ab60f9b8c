//! Errors from EAP state storage

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    /// No state for the token, or it expired
    #[error("EAP state not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Backend error: {0}")]
    BackendError(String),
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::SerializationError(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_token() {
        let err = StateError::NotFound("abc".to_string());
        assert_eq!(err.to_string(), "EAP state not found: abc");
    }

    #[test]
    fn test_json_error_converts_to_serialization_error() {
        let json = serde_json::from_str::<u32>("not json").unwrap_err();
        let err = StateError::from(json);
        assert!(matches!(err, StateError::SerializationError(_)));
        assert!(err.to_string().starts_with("Serialization error: JSON error:"));
    }
}
