use thiserror::Error;

/// Errors surfaced by the driver, pair server and multi server.
///
/// Parse errors encountered while walking an `info` line are intentionally
/// not represented here: those are non-fatal and are only ever logged.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("engine path '{0}' does not point to a file")]
    NotFound(String),

    #[error("failed to connect to engine: {0}")]
    ConnectionError(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid time control token: {0}")]
    InvalidTime(String),

    #[error("engine disconnected while waiting for {0}")]
    DisconnectedWhileWaiting(String),
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::ConnectionError(e.to_string())
    }
}

/// Crate-wide fallible return type, closed over `DriverError` so callers can
/// match on a variant instead of downcasting.
pub type Res<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_becomes_connection_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let e: DriverError = io_err.into();
        assert!(matches!(e, DriverError::ConnectionError(_)));
    }

    #[test]
    fn messages_are_human_readable() {
        let e = DriverError::InvalidTime("time abc".to_string());
        assert_eq!(e.to_string(), "invalid time control token: time abc");
    }
}
