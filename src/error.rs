//! Error types for bus-socket

use thiserror::Error;

use crate::socket::TransportError;

#[derive(Error, Debug)]
pub enum SocketError {
    /// The transport closed before the connection ever opened.
    ///
    /// Carries the close code and the last transport error observed during
    /// the attempt, if any.
    #[error("could not connect (closed with code {code}) due to {}", .detail.as_deref().unwrap_or("an unknown transport failure"))]
    Connection { code: u16, detail: Option<String> },

    /// A send was attempted while no transport handle exists.
    #[error("socket is disconnected")]
    Disconnected,

    /// A send, including its one recovery resend, ultimately failed.
    #[error("send failed: {0}")]
    Send(TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_includes_code_and_detail() {
        let err = SocketError::Connection {
            code: 1006,
            detail: Some("connection reset by peer".into()),
        };
        let message = err.to_string();
        assert!(message.contains("1006"));
        assert!(message.contains("connection reset by peer"));
    }

    #[test]
    fn test_connection_error_without_detail() {
        let err = SocketError::Connection {
            code: 4401,
            detail: None,
        };
        assert_eq!(
            err.to_string(),
            "could not connect (closed with code 4401) due to an unknown transport failure"
        );
    }
}
