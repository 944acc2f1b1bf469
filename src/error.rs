use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while resolving, mutating or persisting a session.
///
/// [`Error::Format`] and [`Error::AuthenticationFailed`] never reach the client as a failed
/// request: outside of strict mode the [`SessionManager`](crate::SessionManager) answers both
/// with a fresh session.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Structurally malformed data: an undecodable session id, payload envelope or store record.
    #[error("malformed session data: {0}")]
    Format(String),

    /// The cookie token did not decrypt or did not authenticate under the configured key.
    #[error("session token failed authentication")]
    AuthenticationFailed,

    /// The cookie named a session that the store does not know about.
    ///
    /// Only surfaced in strict mode.
    #[error("no session exists with the presented id")]
    NotFound,

    /// The backing store could not serve the call.
    #[error("session store is unavailable: {0}")]
    StoreUnavailable(String),

    /// A store call exceeded its deadline.
    #[error("session store call timed out after {0:?}")]
    Timeout(Duration),

    /// Programmer error in the session or cookie configuration.
    #[error("invalid session configuration: {0}")]
    ConfigInvalid(&'static str),

    /// The session was destroyed earlier in this request.
    #[error("session has been destroyed")]
    Destroyed,

    #[error("session cookie exceeds max_cookie_bytes ({size} > {max})")]
    CookieTooLarge { size: usize, max: usize },

    /// Every freshly drawn id collided with an existing record.
    #[error("no unused session id found after {0} attempts")]
    IdSpaceExhausted(usize),

    #[error("failed to (de)serialize a session value")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether a store call that failed with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Timeout(_))
    }

    /// Whether this error stems from an untrusted cookie rather than from the server.
    pub(crate) fn is_client_fault(&self) -> bool {
        matches!(self, Self::Format(_) | Self::AuthenticationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_outages_are_retryable() {
        assert!(Error::StoreUnavailable("down".into()).is_retryable());
        assert!(Error::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!Error::AuthenticationFailed.is_retryable());
        assert!(!Error::NotFound.is_retryable());
        assert!(!Error::ConfigInvalid("name").is_retryable());
    }

    #[test]
    fn client_faults_are_format_and_auth() {
        assert!(Error::Format("bad".into()).is_client_fault());
        assert!(Error::AuthenticationFailed.is_client_fault());
        assert!(!Error::StoreUnavailable("down".into()).is_client_fault());
    }
}
