//! Error types for venue connectivity.

use thiserror::Error;

/// Broad classification attached to emitted error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueErrorKind {
    /// Stream unreachable or closed.
    Connection,
    /// Credentials rejected or handshake timed out.
    Auth,
    /// Malformed message from the venue.
    Protocol,
    /// Reconnect budget exhausted.
    MaxRetries,
}

/// Errors that can occur on a venue stream.
#[derive(Debug, Error)]
pub enum VenueError {
    /// Could not reach or keep the stream.
    #[error("connection error: {0}")]
    Connection(String),

    /// Authentication handshake failed or timed out.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The venue sent a frame we could not decode.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Reconnection attempts were exhausted.
    #[error("max reconnection attempts exhausted after {attempts} tries")]
    MaxRetries {
        /// Consecutive failed attempts.
        attempts: u32,
    },
}

impl VenueError {
    /// Returns the event classification for this error.
    #[must_use]
    pub fn kind(&self) -> VenueErrorKind {
        match self {
            Self::Connection(_) => VenueErrorKind::Connection,
            Self::Auth(_) => VenueErrorKind::Auth,
            Self::Protocol(_) => VenueErrorKind::Protocol,
            Self::MaxRetries { .. } => VenueErrorKind::MaxRetries,
        }
    }

    /// Returns true when the reconnection policy should handle it.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MaxRetries { .. })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VenueError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for VenueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            VenueError::Connection("refused".into()).kind(),
            VenueErrorKind::Connection
        );
        assert_eq!(
            VenueError::Auth("bad key".into()).kind(),
            VenueErrorKind::Auth
        );
        assert_eq!(
            VenueError::Protocol("bad json".into()).kind(),
            VenueErrorKind::Protocol
        );
        assert_eq!(
            VenueError::MaxRetries { attempts: 10 }.kind(),
            VenueErrorKind::MaxRetries
        );
    }

    #[test]
    fn test_max_retries_is_not_recoverable() {
        assert!(VenueError::Connection("closed".into()).is_recoverable());
        assert!(!VenueError::MaxRetries { attempts: 10 }.is_recoverable());
    }

    #[test]
    fn test_display_contains_attempts() {
        let err = VenueError::MaxRetries { attempts: 10 };
        assert!(err.to_string().contains("10"));
    }
}
