use thiserror::Error;

pub type Result<T, E = DecodeError> = core::result::Result<T, E>;

/// Why a line or sub-message produced no record.
///
/// None of these reach the caller of [`crate::decode`]; they are logged at debug level and
/// the offending sub-message is skipped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,
    #[error("invalid or unsupported protocol")]
    UnsupportedProtocol,
    #[error("not a CSV message: {0}")]
    NotCsv(String),
    #[error("invalid number of fields in CSV: {0}")]
    FieldCount(usize),
    #[error("missing packet type tag in {0:?}")]
    MissingPacketTag(String),
    #[error("missing field {index} ({name})")]
    MissingField { index: usize, name: &'static str },
    #[error("invalid float for {name}: {value:?}")]
    InvalidFloat { name: &'static str, value: String },
    #[error("invalid bool for {name}: {value:?}")]
    InvalidBool { name: &'static str, value: String },
    #[error("invalid integer for {name}: {value:?}")]
    InvalidInt { name: &'static str, value: String },
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
}
