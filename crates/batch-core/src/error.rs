use thiserror::Error;

/// Destination-string grammar violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("name exceeds maximum length of {max} characters")]
    NameTooLong { max: usize },

    #[error("no server name after '@'")]
    EmptyServerName,

    #[error("unexpected character at offset {position}")]
    TrailingGarbage { position: usize },

    #[error("invalid port number: {0}")]
    BadPort(String),
}

/// A value did not fit its bounded field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("value of {actual} bytes exceeds capacity of {max}")]
pub struct CapacityError {
    pub max: usize,
    pub actual: usize,
}
