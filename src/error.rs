//! Error handling for Proctor-0

use serde::{Deserialize, Serialize};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Camera permission denied or hardware missing
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Network/transport failure talking to the detection service
    #[error("Service unreachable: {0}")]
    ServiceUnreachable(String),

    /// Explicit `status: "error"` answer from the detection service
    #[error("Service rejected request: {0}")]
    ServiceRejected(String),

    /// Payload that does not match the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Controller task has stopped
    #[error("Session closed")]
    SessionClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse failure classes the session reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Fatal to the current attempt, needs the user to re-trigger
    DeviceUnavailable,
    /// Recovered locally, retried by the next tick or action
    ServiceUnreachable,
    /// Surfaced as a message, retryable
    ServiceRejected,
}

impl Error {
    /// The bare reason without the variant's prefix
    pub fn reason(&self) -> String {
        match self {
            Error::DeviceUnavailable(s)
            | Error::ServiceUnreachable(s)
            | Error::ServiceRejected(s)
            | Error::Protocol(s)
            | Error::Config(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            Error::ServiceRejected(_) => ErrorKind::ServiceRejected,
            Error::ServiceUnreachable(_)
            | Error::Protocol(_)
            | Error::Config(_)
            | Error::SessionClosed
            | Error::Io(_) => ErrorKind::ServiceUnreachable,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Protocol(e.to_string())
        } else {
            Error::ServiceUnreachable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::DeviceUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            Error::DeviceUnavailable("denied".into()).kind(),
            ErrorKind::DeviceUnavailable
        );
        assert_eq!(
            Error::ServiceRejected("no face".into()).kind(),
            ErrorKind::ServiceRejected
        );
        assert_eq!(
            Error::Protocol("bad json".into()).kind(),
            ErrorKind::ServiceUnreachable
        );
    }

    #[test]
    fn test_display_carries_message() {
        let e = Error::ServiceRejected("No face detected in calibration image".into());
        assert!(e.to_string().contains("No face detected"));
        assert_eq!(e.reason(), "No face detected in calibration image");
        assert_eq!(Error::SessionClosed.reason(), "Session closed");
    }
}
