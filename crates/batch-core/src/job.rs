use serde::{Deserialize, Serialize};

/// Single-character job status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Being moved between servers
    Transit,
    Queued,
    Held,
    /// Waiting for its execution time
    Waiting,
    Running,
    Exiting,
    /// Finished and retained for history
    Expired,
    /// Array job with at least one running subjob
    Begun,
    Suspended,
    UserSuspended,
    Moved,
    Finished,
    /// A status octet outside the known set, carried through unchanged
    Other(u8),
}

impl JobState {
    pub fn as_char(&self) -> u8 {
        match self {
            JobState::Transit => b'T',
            JobState::Queued => b'Q',
            JobState::Held => b'H',
            JobState::Waiting => b'W',
            JobState::Running => b'R',
            JobState::Exiting => b'E',
            JobState::Expired => b'X',
            JobState::Begun => b'B',
            JobState::Suspended => b'S',
            JobState::UserSuspended => b'U',
            JobState::Moved => b'M',
            JobState::Finished => b'F',
            JobState::Other(c) => *c,
        }
    }

    pub fn from_char(c: u8) -> Self {
        match c {
            b'T' => JobState::Transit,
            b'Q' => JobState::Queued,
            b'H' => JobState::Held,
            b'W' => JobState::Waiting,
            b'R' => JobState::Running,
            b'E' => JobState::Exiting,
            b'X' => JobState::Expired,
            b'B' => JobState::Begun,
            b'S' => JobState::Suspended,
            b'U' => JobState::UserSuspended,
            b'M' => JobState::Moved,
            b'F' => JobState::Finished,
            other => JobState::Other(other),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, JobState::Other(_))
    }
}

/// Status codes carried in the reply header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ReplyCode {
    Ok = 0,
    UnknownJob = 15001,
    UnknownAttribute = 15002,
    Internal = 15011,
    UnknownQueue = 15018,
    UnknownRequest = 15021,
    BadDestination = 15023,
    QueueExists = 15035,
    /// A server-side table or resource is full
    ResourceUnavailable = 15044,
    UnsupportedOperation = 15045,
}

impl ReplyCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ReplyCode::Ok),
            15001 => Some(ReplyCode::UnknownJob),
            15002 => Some(ReplyCode::UnknownAttribute),
            15011 => Some(ReplyCode::Internal),
            15018 => Some(ReplyCode::UnknownQueue),
            15021 => Some(ReplyCode::UnknownRequest),
            15023 => Some(ReplyCode::BadDestination),
            15035 => Some(ReplyCode::QueueExists),
            15044 => Some(ReplyCode::ResourceUnavailable),
            15045 => Some(ReplyCode::UnsupportedOperation),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ReplyCode::Ok)
    }
}
