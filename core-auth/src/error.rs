use bridge_traits::BridgeError;
use thiserror::Error;

/// Library-level failures.
///
/// Flow outcomes (cancellation, provider errors, failed exchanges) are not
/// errors at this level; engines report them as [`AuthResult`](crate::AuthResult).
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("PKCE verifier entropy must be between 32 and 96 bytes, got {0}")]
    InvalidPkceLength(usize),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Invalid user configuration: {0}")]
    UserConfig(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Session context has been shut down")]
    NotInitialized,
}

impl From<BridgeError> for AuthError {
    fn from(error: BridgeError) -> Self {
        AuthError::SecureStorageUnavailable(error.to_string())
    }
}

/// Failures of a token endpoint round trip.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] BridgeError),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response body: {0}")]
    InvalidBody(String),

    #[error("Failed to encode request: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
