mod client;

pub use client::BatchClient;

use batch_protocol::{ReplyChoice, WireError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(#[from] WireError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Request rejected with code {code}: {}", .message.as_deref().unwrap_or("no message"))]
    Rejected { code: i32, message: Option<String> },

    #[error("Unexpected reply {0:?}")]
    UnexpectedReply(ReplyChoice),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ClientError {
    /// Reply code of a rejected request
    pub fn reply_code(&self) -> Option<batch_core::ReplyCode> {
        match self {
            ClientError::Rejected { code, .. } => batch_core::ReplyCode::from_code(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
