//! Error types for the parsekit engine.

use thiserror::Error;

/// Numeric error codes shared with the backend.
///
/// Local errors reuse the same numbering so that every failure surfaced to
/// callers carries a code, whether it was raised here or by the server.
pub mod codes {
    pub const OTHER_CAUSE: i32 = -1;
    pub const INTERNAL_SERVER_ERROR: i32 = 1;
    pub const CONNECTION_FAILED: i32 = 100;
    pub const OBJECT_NOT_FOUND: i32 = 101;
    pub const INVALID_QUERY: i32 = 102;
    pub const MISSING_OBJECT_ID: i32 = 104;
    pub const INVALID_KEY_NAME: i32 = 105;
    pub const INVALID_JSON: i32 = 107;
    pub const NOT_INITIALIZED: i32 = 109;
    pub const INCORRECT_TYPE: i32 = 111;
    pub const INVALID_FILE_NAME: i32 = 122;
    pub const TIMEOUT: i32 = 124;
}

/// All possible errors from the engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Validation errors
    #[error("'{0}' is a reserved field and cannot be set directly")]
    ReservedKey(String),

    #[error("invalid field name: {0}")]
    InvalidKey(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid geo point: latitude {latitude}, longitude {longitude}")]
    InvalidGeoPoint { latitude: f64, longitude: f64 },

    // Precondition errors
    #[error("object has no objectId")]
    MissingObjectId,

    // Codec errors
    #[error("circular reference while encoding {0}")]
    CircularReference(String),

    #[error("invalid json: {0}")]
    InvalidJson(String),
}

impl Error {
    /// Numeric code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::ReservedKey(_) | Error::InvalidKey(_) => codes::INVALID_KEY_NAME,
            Error::TypeMismatch { .. } | Error::InvalidGeoPoint { .. } => codes::INCORRECT_TYPE,
            Error::InvalidOperation(_) => codes::INCORRECT_TYPE,
            Error::MissingObjectId => codes::MISSING_OBJECT_ID,
            Error::CircularReference(_) => codes::OTHER_CAUSE,
            Error::InvalidJson(_) => codes::INVALID_JSON,
        }
    }

    pub(crate) fn mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Error::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::ReservedKey("createdAt".into());
        assert_eq!(
            err.to_string(),
            "'createdAt' is a reserved field and cannot be set directly"
        );

        let err = Error::TypeMismatch {
            field: "score".into(),
            expected: "Number".into(),
            got: "String".into(),
        };
        assert_eq!(
            err.to_string(),
            "type mismatch for field 'score': expected Number, got String"
        );
    }

    #[test]
    fn error_codes() {
        assert_eq!(Error::ReservedKey("ACL".into()).code(), codes::INVALID_KEY_NAME);
        assert_eq!(Error::MissingObjectId.code(), codes::MISSING_OBJECT_ID);
        assert_eq!(Error::InvalidJson("x".into()).code(), codes::INVALID_JSON);
        assert_eq!(
            Error::mismatch("a", "Number", "Bool").code(),
            codes::INCORRECT_TYPE
        );
    }
}
