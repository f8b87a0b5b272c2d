use batch_core::{QueueName, ServerName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a queue disposes of its jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueType {
    /// Jobs run from this queue
    Execution,
    /// Jobs are forwarded to other destinations
    Route,
}

impl QueueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueType::Execution => "execution",
            QueueType::Route => "route",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "execution" | "e" => Some(QueueType::Execution),
            "route" | "r" => Some(QueueType::Route),
            _ => None,
        }
    }
}

/// A stored attribute, optionally scoped to a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueAttribute {
    pub name: String,
    pub resource: Option<String>,
    pub value: String,
    pub flags: u32,
}

impl QueueAttribute {
    pub fn new(name: impl Into<String>, resource: Option<String>, value: impl Into<String>) -> Self {
        QueueAttribute {
            name: name.into(),
            resource,
            value: value.into(),
            flags: 0,
        }
    }

    fn same_key(&self, name: &str, resource: Option<&str>) -> bool {
        self.name == name && self.resource.as_deref() == resource
    }
}

/// Persisted queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub name: QueueName,
    /// Server that owns the queue
    pub server_name: ServerName,
    pub queue_type: QueueType,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub attributes: Vec<QueueAttribute>,
}

impl QueueRecord {
    pub fn new(name: QueueName, server_name: ServerName, queue_type: QueueType) -> Self {
        let now = Utc::now();
        QueueRecord {
            name,
            server_name,
            queue_type,
            created_at: now,
            modified_at: now,
            attributes: Vec::new(),
        }
    }

    pub fn attribute(&self, name: &str, resource: Option<&str>) -> Option<&QueueAttribute> {
        self.attributes.iter().find(|a| a.same_key(name, resource))
    }

    /// Insert or replace the attribute with the same name and resource
    pub fn upsert_attribute(&mut self, attribute: QueueAttribute) {
        let resource = attribute.resource.clone();
        match self
            .attributes
            .iter_mut()
            .find(|a| a.same_key(&attribute.name, resource.as_deref()))
        {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    /// Returns whether an attribute was removed
    pub fn remove_attribute(&mut self, name: &str, resource: Option<&str>) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|a| !a.same_key(name, resource));
        self.attributes.len() != before
    }

    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
