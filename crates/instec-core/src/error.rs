//! Error types for the Instec driver.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Connection failures, incomplete replies,
//! client-side validation failures, and reply decode failures each have their
//! own variant so callers can tell them apart without string matching.

/// The error type for all controller operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The controller could not be reached (TCP connect failure, address
    /// resolution failure, no controller with the requested serial number).
    #[error("connection error: {0}")]
    Connection(String),

    /// The operating system refused to open the serial port.
    #[error("serial port unavailable: {0}")]
    PortUnavailable(String),

    /// A reply was never completed: the transport failed or timed out before
    /// the `\r\n` terminator arrived.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// A temperature, rate, power, or range parameter is outside the limits
    /// of the controller. Raised client-side before transmission, or after
    /// the controller itself reported a parameter-out-of-range error.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// A profile item carries parameters that violate its instruction rule.
    #[error("invalid profile item: {0}")]
    InvalidItem(String),

    /// A profile slot, item index, PID table index, or slave number is out
    /// of bounds.
    #[error("invalid index: {0}")]
    InvalidIndex(String),

    /// Any other argument the controller cannot accept (e.g. an over-long
    /// profile name).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A reply did not have the expected shape, or carried an unknown
    /// enumeration code.
    #[error("decode error: {0}")]
    Decode(String),

    /// Timed out establishing a connection.
    #[error("timeout waiting for controller")]
    Timeout,

    /// The transport has not been opened, or has been closed.
    #[error("not connected")]
    NotConnected,

    /// The peer closed or reset the connection.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error reports an argument that was refused, either by
    /// local validation or by the controller's range check. The connection
    /// stays usable and the call can be retried with corrected input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::OutOfRange(_)
                | Error::InvalidItem(_)
                | Error::InvalidIndex(_)
                | Error::InvalidParameter(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_connection() {
        let e = Error::Connection("connection refused: 10.0.0.5:50292".into());
        assert_eq!(
            e.to_string(),
            "connection error: connection refused: 10.0.0.5:50292"
        );
    }

    #[test]
    fn error_display_port_unavailable() {
        let e = Error::PortUnavailable("COM3".into());
        assert_eq!(e.to_string(), "serial port unavailable: COM3");
    }

    #[test]
    fn error_display_receive_failed() {
        let e = Error::ReceiveFailed("timeout".into());
        assert_eq!(e.to_string(), "receive failed: timeout");
    }

    #[test]
    fn error_display_out_of_range() {
        let e = Error::OutOfRange("TSP 500 outside [-40, 200]".into());
        assert_eq!(e.to_string(), "out of range: TSP 500 outside [-40, 200]");
    }

    #[test]
    fn error_display_invalid_item() {
        let e = Error::InvalidItem("WAIT minutes must be >= 0".into());
        assert_eq!(
            e.to_string(),
            "invalid profile item: WAIT minutes must be >= 0"
        );
    }

    #[test]
    fn error_display_invalid_index() {
        let e = Error::InvalidIndex("profile 5".into());
        assert_eq!(e.to_string(), "invalid index: profile 5");
    }

    #[test]
    fn error_display_decode() {
        let e = Error::Decode("unknown system status code 9".into());
        assert_eq!(e.to_string(), "decode error: unknown system status code 9");
    }

    #[test]
    fn error_display_simple_variants() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for controller");
        assert_eq!(Error::NotConnected.to_string(), "not connected");
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn validation_errors_are_flagged() {
        assert!(Error::OutOfRange(String::new()).is_validation());
        assert!(Error::InvalidItem(String::new()).is_validation());
        assert!(Error::InvalidIndex(String::new()).is_validation());
        assert!(Error::InvalidParameter(String::new()).is_validation());
        assert!(!Error::ReceiveFailed(String::new()).is_validation());
        assert!(!Error::Decode(String::new()).is_validation());
        assert!(!Error::NotConnected.is_validation());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
