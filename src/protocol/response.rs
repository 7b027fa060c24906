use std::fmt;

/// Status byte leading every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Success,
    InvalidOperation,
    HostNotFound,
    ConnectionRefused,
    SendError,
    ReceiveError,
    RecordExists,
    /// Reserved for "no record / end of data".
    NoRecord,
    Unknown(u8),
}

impl From<u8> for ResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ResponseCode::Success,
            1 => ResponseCode::InvalidOperation,
            2 => ResponseCode::HostNotFound,
            3 => ResponseCode::ConnectionRefused,
            4 => ResponseCode::SendError,
            5 => ResponseCode::ReceiveError,
            6 => ResponseCode::RecordExists,
            7 => ResponseCode::NoRecord,
            other => ResponseCode::Unknown(other),
        }
    }
}

impl From<ResponseCode> for u8 {
    fn from(value: ResponseCode) -> Self {
        match value {
            ResponseCode::Success => 0,
            ResponseCode::InvalidOperation => 1,
            ResponseCode::HostNotFound => 2,
            ResponseCode::ConnectionRefused => 3,
            ResponseCode::SendError => 4,
            ResponseCode::ReceiveError => 5,
            ResponseCode::RecordExists => 6,
            ResponseCode::NoRecord => 7,
            ResponseCode::Unknown(code) => code,
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = u8::from(*self);
        match self {
            ResponseCode::Success => write!(f, "success ({code})"),
            ResponseCode::InvalidOperation => write!(f, "invalid operation ({code})"),
            ResponseCode::HostNotFound => write!(f, "host not found ({code})"),
            ResponseCode::ConnectionRefused => write!(f, "connection refused ({code})"),
            ResponseCode::SendError => write!(f, "send error ({code})"),
            ResponseCode::ReceiveError => write!(f, "receive error ({code})"),
            ResponseCode::RecordExists => write!(f, "record already exists ({code})"),
            ResponseCode::NoRecord => write!(f, "no record found ({code})"),
            ResponseCode::Unknown(_) => write!(f, "unknown error ({code})"),
        }
    }
}
