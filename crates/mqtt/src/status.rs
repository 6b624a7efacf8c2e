//! Numeric status codes for broker operations.
//!
//! A one-shot publisher has exactly one place where a status becomes
//! externally visible: the process exit status, which carries the disconnect
//! result verbatim. The codes therefore form a small, stable table:
//!
//! | code | meaning |
//! |------|---------|
//! | 0  | success |
//! | 1  | out of memory |
//! | 2  | protocol error |
//! | 3  | invalid argument |
//! | 4  | not connected |
//! | 5  | connection refused |
//! | 6  | not found |
//! | 7  | connection lost |
//! | 8  | TLS error |
//! | 9  | payload too large |
//! | 10 | not supported |
//! | 11 | authorisation failed |
//! | 12 | access denied by ACL |
//! | 13 | unknown error |
//! | 14 | operating system error |
//! | 15 | request queue full |
//!
//! Codes 1, 6 and 9 to 12 are never produced by this transport. They stay
//! reserved so the numbering does not shift.
//!
//! Connect refusals are different: they carry the CONNACK return code sent by
//! the broker (1 to 5) together with the broker's reason.

use std::fmt;

use rumqttc::{ClientError, ConnectReturnCode, ConnectionError, StateError};

/// Transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MqttStatus {
    Success = 0,
    NoMemory = 1,
    Protocol = 2,
    InvalidArgument = 3,
    NotConnected = 4,
    Refused = 5,
    NotFound = 6,
    ConnectionLost = 7,
    Tls = 8,
    PayloadSize = 9,
    NotSupported = 10,
    Auth = 11,
    AclDenied = 12,
    Unknown = 13,
    Errno = 14,
    QueueFull = 15,
}

impl MqttStatus {
    const ALL: [MqttStatus; 16] = [
        MqttStatus::Success,
        MqttStatus::NoMemory,
        MqttStatus::Protocol,
        MqttStatus::InvalidArgument,
        MqttStatus::NotConnected,
        MqttStatus::Refused,
        MqttStatus::NotFound,
        MqttStatus::ConnectionLost,
        MqttStatus::Tls,
        MqttStatus::PayloadSize,
        MqttStatus::NotSupported,
        MqttStatus::Auth,
        MqttStatus::AclDenied,
        MqttStatus::Unknown,
        MqttStatus::Errno,
        MqttStatus::QueueFull,
    ];

    /// Numeric value of the status.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Looks a status up by its numeric value.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }

    pub fn is_success(self) -> bool {
        self == MqttStatus::Success
    }

    /// Human-readable description of the status.
    pub fn message(self) -> &'static str {
        match self {
            MqttStatus::Success => "No error",
            MqttStatus::NoMemory => "Out of memory",
            MqttStatus::Protocol => "Protocol error while talking to the broker",
            MqttStatus::InvalidArgument => "Invalid argument",
            MqttStatus::NotConnected => "Client is not connected",
            MqttStatus::Refused => "Connection refused",
            MqttStatus::NotFound => "Message not found",
            MqttStatus::ConnectionLost => "Connection lost",
            MqttStatus::Tls => "TLS error",
            MqttStatus::PayloadSize => "Payload too large",
            MqttStatus::NotSupported => "Feature not supported",
            MqttStatus::Auth => "Authorisation failed",
            MqttStatus::AclDenied => "Access denied by ACL",
            MqttStatus::Unknown => "Unknown error",
            MqttStatus::Errno => "Operating system error",
            MqttStatus::QueueFull => "Request queue full",
        }
    }
}

impl fmt::Display for MqttStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of a single broker operation: a numeric code plus a message.
///
/// `code == 0` is success. For connect refusals the code is the CONNACK
/// return code; everywhere else it is an [`MqttStatus`] value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerStatus {
    pub code: i32,
    pub message: String,
}

impl BrokerStatus {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn success() -> Self {
        MqttStatus::Success.into()
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Builds a status from an [`MqttStatus`] with a more specific message.
    pub fn with_detail(status: MqttStatus, detail: impl fmt::Display) -> Self {
        Self::new(status.code(), format!("{}: {}", status.message(), detail))
    }

    /// Maps a CONNACK return code to the broker's refusal reason.
    pub fn from_connect_code(code: ConnectReturnCode) -> Self {
        match code {
            ConnectReturnCode::Success => Self::new(0, "Connection accepted"),
            ConnectReturnCode::RefusedProtocolVersion => {
                Self::new(1, "Connection refused - incorrect protocol version")
            }
            ConnectReturnCode::BadClientId => {
                Self::new(2, "Connection refused - invalid client identifier")
            }
            ConnectReturnCode::ServiceUnavailable => {
                Self::new(3, "Connection refused - broker unavailable")
            }
            ConnectReturnCode::BadUserNamePassword => {
                Self::new(4, "Connection refused - bad username or password")
            }
            ConnectReturnCode::NotAuthorized => {
                Self::new(5, "Connection refused - not authorised")
            }
        }
    }

    /// Maps an event loop error to a status.
    pub fn from_connection_error(err: &ConnectionError) -> Self {
        match err {
            ConnectionError::ConnectionRefused(code) => Self::from_connect_code(*code),
            ConnectionError::Io(e) => Self::with_detail(MqttStatus::Errno, e),
            ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => {
                Self::with_detail(MqttStatus::NotConnected, err)
            }
            ConnectionError::MqttState(StateError::Io(e)) => {
                Self::with_detail(MqttStatus::ConnectionLost, e)
            }
            ConnectionError::MqttState(e) => Self::with_detail(MqttStatus::Protocol, e),
            ConnectionError::NotConnAck(packet) => Self::with_detail(
                MqttStatus::Protocol,
                format!("expected CONNACK, received {:?}", packet),
            ),
            ConnectionError::RequestsDone => Self::with_detail(MqttStatus::NotConnected, err),
            ConnectionError::Tls(e) => Self::with_detail(MqttStatus::Tls, e),
            other => Self::with_detail(MqttStatus::Unknown, other),
        }
    }

    /// Maps a client request error. The request channel only fails once the
    /// event loop is gone, so this always means "not connected".
    pub fn from_client_error(err: &ClientError) -> Self {
        Self::with_detail(MqttStatus::NotConnected, err)
    }
}

impl From<MqttStatus> for BrokerStatus {
    fn from(status: MqttStatus) -> Self {
        Self::new(status.code(), status.message())
    }
}

impl fmt::Display for BrokerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.code, self.message)
    }
}
