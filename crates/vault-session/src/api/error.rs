use thiserror::Error;

/// Every failure the session, executor, and node client can report.
///
/// Clone is required: a single login outcome is handed to every caller
/// waiting on the same in-flight login.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Challenge audience {audience:?} does not match DID subject {subject}")]
    ChallengeMismatch {
        audience: Option<String>,
        subject: String,
    },

    #[error("Challenge expired at {0}")]
    ChallengeExpired(String),

    #[error("Identity signer failed: {0}")]
    Assertion(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session expired - token rejected by node")]
    SessionExpired,

    #[error("Login abandoned: session was signed out")]
    SignedOut,

    #[error("Credential store error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for VaultError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VaultError::Network(format!("request timed out: {}", err))
        } else {
            VaultError::Network(err.to_string())
        }
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl VaultError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Classify a failed domain call by its HTTP status (or the `_error.code`
    /// a node embeds in a 2xx body).
    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            401 => VaultError::SessionExpired,
            403 => VaultError::AccessDenied(truncated),
            404 => VaultError::NotFound(truncated),
            429 => VaultError::RateLimited,
            500..=599 => VaultError::Server(truncated),
            _ => VaultError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Failure of the sign-in or auth endpoint. These never mean "session
    /// expired": the login itself is what failed.
    pub fn from_auth_status(endpoint: &str, status: u16, body: &str) -> Self {
        VaultError::Network(format!(
            "{} returned status {}: {}",
            endpoint,
            status,
            Self::truncate_body(body)
        ))
    }

    /// The only condition that triggers a relogin and retry.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, VaultError::SessionExpired)
    }
}
