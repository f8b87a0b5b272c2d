use crate::header::{read_protocol, write_protocol};
use crate::request::{DestinationText, ObjectName, ObjectType};
use crate::{
    read_attributes, read_bounded, write_attributes, Attribute, DisRead, DisWrite, ProtocolError,
    Result, MAX_REPLY_TEXT, MAX_STATUS_ENTRIES,
};
use batch_core::{JobId, ReplyCode};

/// Discriminator of the reply body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ReplyChoice {
    Null = 1,
    Queue = 2,
    Status = 6,
    Text = 7,
    Locate = 8,
}

impl ReplyChoice {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(ReplyChoice::Null),
            2 => Some(ReplyChoice::Queue),
            6 => Some(ReplyChoice::Status),
            7 => Some(ReplyChoice::Text),
            8 => Some(ReplyChoice::Locate),
            _ => None,
        }
    }
}

/// Status of one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub object_type: ObjectType,
    pub name: ObjectName,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    Null,
    /// Id of a job the request created or addressed
    Queue(JobId),
    Status(Vec<StatusEntry>),
    Text(String),
    /// Where a job currently lives
    Locate(DestinationText),
}

impl ReplyBody {
    pub fn choice(&self) -> ReplyChoice {
        match self {
            ReplyBody::Null => ReplyChoice::Null,
            ReplyBody::Queue(_) => ReplyChoice::Queue,
            ReplyBody::Status(_) => ReplyChoice::Status,
            ReplyBody::Text(_) => ReplyChoice::Text,
            ReplyBody::Locate(_) => ReplyChoice::Locate,
        }
    }
}

/// Reply to a batch request.
///
/// Wire layout: protocol type, version, code, aux code, choice, body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReply {
    pub code: i32,
    pub aux_code: i32,
    pub body: ReplyBody,
}

impl BatchReply {
    pub fn ok(body: ReplyBody) -> Self {
        BatchReply {
            code: ReplyCode::Ok.code(),
            aux_code: 0,
            body,
        }
    }

    pub fn null() -> Self {
        BatchReply::ok(ReplyBody::Null)
    }

    pub fn error(code: ReplyCode) -> Self {
        BatchReply {
            code: code.code(),
            aux_code: 0,
            body: ReplyBody::Null,
        }
    }

    /// Error reply carrying a human-readable explanation
    pub fn error_text(code: ReplyCode, text: impl Into<String>) -> Self {
        let mut text = text.into();
        if text.len() > MAX_REPLY_TEXT {
            let mut end = MAX_REPLY_TEXT;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        BatchReply {
            code: code.code(),
            aux_code: 0,
            body: ReplyBody::Text(text),
        }
    }

    pub fn reply_code(&self) -> Option<ReplyCode> {
        ReplyCode::from_code(self.code)
    }

    pub fn is_ok(&self) -> bool {
        self.code == ReplyCode::Ok.code()
    }

    pub fn decode(r: &mut dyn DisRead) -> Result<Self> {
        read_protocol(r)?;
        let code = r.read_i32()?;
        let aux_code = r.read_i32()?;
        let choice = ReplyChoice::from_code(r.read_unsigned_int()?)
            .ok_or(ProtocolError::Malformed("unknown reply choice"))?;

        let body = match choice {
            ReplyChoice::Null => ReplyBody::Null,
            ReplyChoice::Queue => ReplyBody::Queue(read_bounded(r)?),
            ReplyChoice::Text => ReplyBody::Text(r.read_counted_string(MAX_REPLY_TEXT)?),
            ReplyChoice::Locate => ReplyBody::Locate(read_bounded(r)?),
            ReplyChoice::Status => ReplyBody::Status(read_status(r)?),
        };

        Ok(BatchReply {
            code,
            aux_code,
            body,
        })
    }

    pub fn encode(&self, w: &mut dyn DisWrite) -> Result<()> {
        write_protocol(w)?;
        w.write_signed_int(i64::from(self.code))?;
        w.write_signed_int(i64::from(self.aux_code))?;
        w.write_unsigned_int(self.body.choice() as u64)?;

        match &self.body {
            ReplyBody::Null => Ok(()),
            ReplyBody::Queue(job_id) => w.write_counted_string(job_id),
            ReplyBody::Text(text) => w.write_counted_string(text),
            ReplyBody::Locate(location) => w.write_counted_string(location),
            ReplyBody::Status(entries) => write_status(w, entries),
        }
    }
}

fn read_status(r: &mut dyn DisRead) -> Result<Vec<StatusEntry>> {
    let count = r.read_unsigned_int()?;
    if count > MAX_STATUS_ENTRIES as u64 {
        return Err(ProtocolError::Overflow {
            declared: count,
            max: MAX_STATUS_ENTRIES,
        }
        .into());
    }

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let object_type = ObjectType::read(r)?;
        let name = read_bounded(r)?;
        let attributes = read_attributes(r)?;
        entries.push(StatusEntry {
            object_type,
            name,
            attributes,
        });
    }
    Ok(entries)
}

fn write_status(w: &mut dyn DisWrite, entries: &[StatusEntry]) -> Result<()> {
    w.write_unsigned_int(entries.len() as u64)?;
    for entry in entries {
        w.write_unsigned_int(entry.object_type as u64)?;
        w.write_counted_string(&entry.name)?;
        write_attributes(w, &entry.attributes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WireError;
    use std::io::Cursor;

    #[test]
    fn test_error_reply_layout() {
        let reply = BatchReply::error(ReplyCode::UnknownJob);
        let mut buf: Vec<u8> = Vec::new();
        reply.encode(&mut buf).unwrap();
        assert_eq!(buf, b"+2+15+15001+0+1".to_vec());
        assert_eq!(BatchReply::decode(&mut Cursor::new(&buf)).unwrap(), reply);
    }

    #[test]
    fn test_status_reply() {
        let reply = BatchReply::ok(ReplyBody::Status(vec![StatusEntry {
            object_type: ObjectType::Queue,
            name: ObjectName::new("workq").unwrap(),
            attributes: vec![Attribute::set("queue_type", "execution")],
        }]));
        let mut buf: Vec<u8> = Vec::new();
        reply.encode(&mut buf).unwrap();
        assert_eq!(BatchReply::decode(&mut Cursor::new(&buf)).unwrap(), reply);
    }

    #[test]
    fn test_negative_aux_code() {
        let reply = BatchReply {
            code: ReplyCode::Internal.code(),
            aux_code: -5,
            body: ReplyBody::Text("backend down".to_string()),
        };
        let mut buf: Vec<u8> = Vec::new();
        reply.encode(&mut buf).unwrap();
        let decoded = BatchReply::decode(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded.aux_code, -5);
        assert_eq!(decoded.reply_code(), Some(ReplyCode::Internal));
    }

    #[test]
    fn test_unknown_choice() {
        let err = BatchReply::decode(&mut Cursor::new(b"+2+1+0+0+9".as_slice())).unwrap_err();
        assert!(matches!(err, WireError::Protocol(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_error_text_is_capped() {
        let reply = BatchReply::error_text(ReplyCode::Internal, "é".repeat(MAX_REPLY_TEXT));
        match reply.body {
            ReplyBody::Text(text) => assert!(text.len() <= MAX_REPLY_TEXT),
            other => panic!("unexpected body {:?}", other),
        }
    }
}
