//! Transport failure classification
//!
//! Maps read failures to the symbolic close reason used for logging and for
//! the close observer. OS-level aborts and resets are recognised through one
//! table of raw error codes for the current platform.

use std::fmt;
use std::io;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Why a session's read side terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Peer went away, sent a close frame, or dropped the websocket abruptly
    ExpectedClose,
    /// Connection aborted or reset at the OS level
    UnexpectedTransportClose,
    /// Anything else, including liveness deadline expiry
    Unknown,
}

impl CloseReason {
    /// Whether the reason is logged at reduced severity
    pub fn is_expected(self) -> bool {
        !matches!(self, CloseReason::Unknown)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloseReason::ExpectedClose => "expected close",
            CloseReason::UnexpectedTransportClose => "transport close",
            CloseReason::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Raw OS codes meaning "connection aborted" or "connection reset"
#[cfg(target_os = "linux")]
pub const TRANSPORT_CLOSE_CODES: &[(i32, &str)] = &[(103, "ECONNABORTED"), (104, "ECONNRESET")];

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd"
))]
pub const TRANSPORT_CLOSE_CODES: &[(i32, &str)] = &[(53, "ECONNABORTED"), (54, "ECONNRESET")];

#[cfg(windows)]
pub const TRANSPORT_CLOSE_CODES: &[(i32, &str)] =
    &[(10053, "WSAECONNABORTED"), (10054, "WSAECONNRESET")];

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    windows
)))]
pub const TRANSPORT_CLOSE_CODES: &[(i32, &str)] = &[];

/// Look up a raw OS error code in the platform table
pub fn os_code_name(code: i32) -> Option<&'static str> {
    TRANSPORT_CLOSE_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| *name)
}

/// Classify a websocket read failure
pub fn classify(error: &WsError) -> CloseReason {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => CloseReason::ExpectedClose,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            CloseReason::ExpectedClose
        }
        WsError::Io(io_error) => classify_io(io_error),
        _ => CloseReason::Unknown,
    }
}

/// Classify a low-level I/O failure
pub fn classify_io(error: &io::Error) -> CloseReason {
    if let Some(code) = error.raw_os_error() {
        if os_code_name(code).is_some() {
            return CloseReason::UnexpectedTransportClose;
        }
    }
    match error.kind() {
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset => {
            CloseReason::UnexpectedTransportClose
        }
        _ => CloseReason::Unknown,
    }
}
