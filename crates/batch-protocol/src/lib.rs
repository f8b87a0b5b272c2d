mod attribute;
mod codec;
mod dis;
mod dispatch;
mod header;
mod registry;
mod reply;
mod request;

pub use attribute::{read_attributes, write_attributes, AttrOp, Attribute};
pub use codec::{ClientCodec, ServerCodec};
pub use dis::{encode_integer, read_bounded, DisRead, DisWrite};
pub use dispatch::{dispatch, BatchHandler, Dispatched, Inbound};
pub use header::{RequestHeader, PROTOCOL_TYPE, PROTOCOL_VERSION};
pub use registry::{DecodeFn, EncodeFn, RegisteredKind, Registry};
pub use reply::{BatchReply, ReplyBody, ReplyChoice, StatusEntry};
pub use request::{
    BatchRequest, DestinationText, JobRequest, Manage, ManagerCommand, MoveJob, ObjectName,
    ObjectType, RequestBody, RequestType, SignalJob, SignalName, StatusQueue, TrackJob,
};

use thiserror::Error;

/// Violations of the DIS encoding itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("stream ended in the middle of a field")]
    Truncated,

    #[error("malformed encoding: {0}")]
    Malformed(&'static str),

    #[error("declared length {declared} exceeds field capacity {max}")]
    Overflow { declared: u64, max: usize },
}

#[derive(Error, Debug)]
pub enum WireError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("unsupported request type: {0}")]
    UnsupportedRequest(u32),

    #[error("unexpected protocol type {protocol_type} version {version}")]
    BadProtocol { protocol_type: u64, version: u64 },

    #[error("request body does not match kind {0:?}")]
    BodyMismatch(RequestType),

    #[error("message too large: {0} bytes buffered")]
    MessageTooLarge(usize),
}

impl WireError {
    /// The stream ended before the message was complete
    pub fn is_truncated(&self) -> bool {
        matches!(self, WireError::Protocol(ProtocolError::Truncated))
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            WireError::Transport(_) => "transport",
            WireError::Protocol(ProtocolError::Truncated) => "truncated",
            WireError::Protocol(ProtocolError::Malformed(_)) => "malformed",
            WireError::Protocol(ProtocolError::Overflow { .. }) => "overflow",
            WireError::UnsupportedRequest(_) => "unsupported",
            WireError::BadProtocol { .. } => "bad_protocol",
            WireError::BodyMismatch(_) => "body_mismatch",
            WireError::MessageTooLarge(_) => "too_large",
        }
    }
}

pub type Result<T> = std::result::Result<T, WireError>;

/// Largest counted string the encoder will emit
pub const MAX_WIRE_STRING: usize = 16 * 1024 * 1024;

/// Bytes a single inbound message may occupy before it is rejected
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Request extension trailer
pub const MAX_EXTEND: usize = 1024;

/// Entries in one attribute list
pub const MAX_ATTRIBUTES: usize = 1024;

pub const MAX_ATTR_NAME: usize = 256;

pub const MAX_ATTR_VALUE: usize = 64 * 1024;

/// Free text carried by a reply
pub const MAX_REPLY_TEXT: usize = 64 * 1024;

/// Objects in one status reply
pub const MAX_STATUS_ENTRIES: usize = 4096;
