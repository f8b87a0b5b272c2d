use crate::{CapacityError, MAX_QUEUE_NAME, MAX_SERVER_NAME, MAX_SVR_JOB_ID, MAX_USER};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Owned string whose length in bytes never exceeds `MAX`.
///
/// The capacity is checked once, at construction; every later read can rely
/// on it without re-checking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BoundedString<const MAX: usize>(String);

/// Job identifier as carried on the wire
pub type JobId = BoundedString<MAX_SVR_JOB_ID>;

/// Queue name
pub type QueueName = BoundedString<MAX_QUEUE_NAME>;

/// Server name (may include `:port`)
pub type ServerName = BoundedString<MAX_SERVER_NAME>;

/// Requesting user identity
pub type UserName = BoundedString<MAX_USER>;

impl<const MAX: usize> BoundedString<MAX> {
    /// Maximum length in bytes
    pub const CAPACITY: usize = MAX;

    /// Create a bounded string, rejecting values longer than `MAX`
    pub fn new(value: impl Into<String>) -> Result<Self, CapacityError> {
        let value = value.into();
        if value.len() > MAX {
            return Err(CapacityError {
                max: MAX,
                actual: value.len(),
            });
        }
        Ok(BoundedString(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<const MAX: usize> Deref for BoundedString<MAX> {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl<const MAX: usize> AsRef<str> for BoundedString<MAX> {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<const MAX: usize> fmt::Display for BoundedString<MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<const MAX: usize> TryFrom<String> for BoundedString<MAX> {
    type Error = CapacityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BoundedString::new(value)
    }
}

impl<const MAX: usize> TryFrom<&str> for BoundedString<MAX> {
    type Error = CapacityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        BoundedString::new(value)
    }
}

impl<const MAX: usize> From<BoundedString<MAX>> for String {
    fn from(value: BoundedString<MAX>) -> Self {
        value.0
    }
}
