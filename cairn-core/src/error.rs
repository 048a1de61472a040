//! Error types for Cairn core primitives.
//!
//! Provides structured errors with:
//! - Unique error codes
//! - Source error chaining
//! - Client vs server error categorization

use thiserror::Error;

/// Result type for Cairn core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes.
///
/// Codes are structured as:
/// - 1xxx: Validation errors (client)
/// - 2xxx: Not found errors (client)
/// - 6xxx: Internal errors (server)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Validation errors (1xxx)
    InvalidHash = 1001,
    InvalidProof = 1006,
    InvalidFormat = 1008,
    EmptyTree = 1009,

    // Not found errors (2xxx)
    LeafNotFound = 2005,

    // Internal errors (6xxx)
    Serialization = 6001,
}

impl ErrorCode {
    /// Get the numeric code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Check if this is a client error.
    pub fn is_client_error(self) -> bool {
        (1000..5000).contains(&self.code())
    }

    /// Check if this is a server error.
    pub fn is_server_error(self) -> bool {
        self.code() >= 5000
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// Errors raised by hashing, tree and proof code.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid hash format or value.
    #[error("[{code}] invalid hash: {message}")]
    InvalidHash {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Proof construction or verification failed.
    #[error("[{code}] invalid proof: {message}")]
    InvalidProof { code: ErrorCode, message: String },

    /// Malformed input that is not a hash.
    #[error("[{code}] invalid format: {message}")]
    InvalidFormat { code: ErrorCode, message: String },

    /// Item not found.
    #[error("[{code}] not found: {message}")]
    NotFound { code: ErrorCode, message: String },

    /// Serialization/deserialization failed.
    #[error("[{code}] serialization error: {message}")]
    Serialization {
        code: ErrorCode,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidHash { code, .. } => *code,
            Error::InvalidProof { code, .. } => *code,
            Error::InvalidFormat { code, .. } => *code,
            Error::NotFound { code, .. } => *code,
            Error::Serialization { code, .. } => *code,
        }
    }

    /// Check if this is a client error.
    pub fn is_client_error(&self) -> bool {
        self.code().is_client_error()
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        self.code().is_server_error()
    }
}

impl Error {
    /// Create an InvalidHash error.
    pub fn invalid_hash(message: impl Into<String>) -> Self {
        Error::InvalidHash {
            code: ErrorCode::InvalidHash,
            message: message.into(),
            source: None,
        }
    }

    /// Create an InvalidProof error.
    pub fn invalid_proof(message: impl Into<String>) -> Self {
        Error::InvalidProof {
            code: ErrorCode::InvalidProof,
            message: message.into(),
        }
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Error::InvalidFormat {
            code: ErrorCode::InvalidFormat,
            message: message.into(),
        }
    }

    /// Create an InvalidFormat error for an empty Merkle tree.
    pub fn empty_tree() -> Self {
        Error::InvalidFormat {
            code: ErrorCode::EmptyTree,
            message: "merkle tree has no leaves".into(),
        }
    }

    /// Create a NotFound error for a missing tree leaf.
    pub fn leaf_not_found(message: impl Into<String>) -> Self {
        Error::NotFound {
            code: ErrorCode::LeafNotFound,
            message: message.into(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization {
            code: ErrorCode::Serialization,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization {
            code: ErrorCode::Serialization,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::InvalidHash {
            code: ErrorCode::InvalidHash,
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<uuid::Error> for Error {
    fn from(e: uuid::Error) -> Self {
        Error::InvalidFormat {
            code: ErrorCode::InvalidFormat,
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::InvalidHash.code(), 1001);
        assert_eq!(ErrorCode::LeafNotFound.code(), 2005);
        assert_eq!(ErrorCode::Serialization.code(), 6001);
    }

    #[test]
    fn test_error_categorization() {
        assert!(ErrorCode::InvalidProof.is_client_error());
        assert!(!ErrorCode::InvalidProof.is_server_error());

        assert!(ErrorCode::Serialization.is_server_error());
        assert!(!ErrorCode::Serialization.is_client_error());
    }

    #[test]
    fn test_error_display() {
        let e = Error::invalid_hash("bad hex");
        assert!(e.to_string().contains("E1001"));
        assert!(e.to_string().contains("bad hex"));
        assert_eq!(Error::empty_tree().code(), ErrorCode::EmptyTree);
    }

    #[test]
    fn test_from_bincode() {
        let bad_data = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        let bincode_err: bincode::Error = bincode::deserialize::<String>(&bad_data).unwrap_err();
        let err: Error = bincode_err.into();
        assert_eq!(err.code(), ErrorCode::Serialization);
        assert!(err.is_server_error());
    }

    #[test]
    fn test_from_hex() {
        let err: Error = hex::decode("zz").unwrap_err().into();
        assert_eq!(err.code(), ErrorCode::InvalidHash);
    }
}
