//! Error types for the Groonga client

use thiserror::Error;

use crate::transport::TransportError;

/// Error type for Groonga client operations
#[derive(Debug, Error)]
pub enum Error {
    /// The transport could not be established or was lost
    #[error("Connection error: {context}: {source}")]
    Connection {
        /// What the connection was doing when the transport failed
        context: String,
        /// The transport's own failure
        #[source]
        source: TransportError,
    },

    /// The reply body does not have the shape the command requires
    #[error("Failed to parse response of `{command}`: {message}")]
    ResponseParse {
        /// Verb of the command whose reply failed to decode
        command: String,
        /// Description of the mismatch
        message: String,
    },

    /// The command declares an output encoding this client does not know
    #[error("Unsupported output type: {0}")]
    ProtocolEncoding(String),

    /// The server answered with a non-zero status code
    #[error("Server error in `{command}` (status {status}): {message}")]
    Server {
        /// Verb of the failed command
        command: String,
        /// Groonga return code, negative on failure. A GQTP reply status is
        /// read as signed 16-bit so both paths report the same code.
        status: i64,
        /// Message the server attached, if any
        message: String,
    },

    /// The connection was never opened or has been closed
    #[error("Not connected")]
    NotConnected,

    /// Invalid argument provided
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a response parse error for `command`
    pub fn response_parse<C, S>(command: C, message: S) -> Self
    where
        C: Into<String>,
        S: Into<String>,
    {
        Error::ResponseParse {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Wrap a transport failure, keeping it as the error source.
    ///
    /// Returned as a closure so call sites read `.map_err(Error::transport("..."))`.
    pub fn transport<S: Into<String>>(context: S) -> impl FnOnce(TransportError) -> Self {
        let context = context.into();
        move |source| Error::Connection { context, source }
    }

    /// Returns the command verb this error is about, when known
    pub fn command(&self) -> Option<&str> {
        match self {
            Error::ResponseParse { command, .. } | Error::Server { command, .. } => Some(command),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_transport_error_is_kept_as_source() {
        let io_error = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = Error::transport("connect to localhost:10043")(TransportError::Io(io_error));

        assert!(matches!(error, Error::Connection { .. }));
        let source = error.source().expect("source");
        assert!(source.to_string().contains("refused"));
    }

    #[test]
    fn test_command_context() {
        let error = Error::response_parse("select", "missing column definitions");
        assert_eq!(error.command(), Some("select"));
        assert!(error.to_string().contains("missing column definitions"));

        assert_eq!(Error::NotConnected.command(), None);
    }
}
