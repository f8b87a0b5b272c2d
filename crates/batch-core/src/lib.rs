mod bounded;
mod destination;
mod error;
mod job;

pub use bounded::{BoundedString, JobId, QueueName, ServerName, UserName};
pub use destination::{parse_destination, Destination};
pub use error::{CapacityError, ParseError};
pub use job::{JobState, ReplyCode};

/// Longest queue name accepted anywhere in the system
pub const MAX_QUEUE_NAME: usize = 15;

/// Longest host name a server may carry
pub const MAX_HOST_NAME: usize = 255;

/// Digits in a port number
pub const MAX_PORT_NUM: usize = 5;

/// Server name, including an optional `:port` suffix; one spare octet
/// beyond `host:port` is accepted
pub const MAX_SERVER_NAME: usize = MAX_HOST_NAME + MAX_PORT_NUM + 2;

/// Digits in a job sequence number
pub const MAX_SEQ_NUM: usize = 12;

/// Array index suffix such as `[1234]`
pub const MAX_JOB_ARRAY_LEN: usize = 7;

/// Fully qualified job id: `seq[array].server:port`
pub const MAX_SVR_JOB_ID: usize = MAX_SEQ_NUM + MAX_JOB_ARRAY_LEN + 1 + MAX_SERVER_NAME;

/// Destination text: `queue@server:port`
pub const MAX_DEST: usize = MAX_QUEUE_NAME + 1 + MAX_SERVER_NAME;

/// Requesting user identity
pub const MAX_USER: usize = 256;

/// Signal name carried by a signal request
pub const MAX_SIGNAL_NAME: usize = 32;
