use crate::{read_bounded, DisRead, DisWrite, Result, WireError};
use batch_core::UserName;

/// Protocol identifier for batch requests
pub const PROTOCOL_TYPE: u64 = 2;

/// Version of the batch request schema
pub const PROTOCOL_VERSION: u64 = 1;

/// Fields that precede every request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub request_type: u32,
    pub user: UserName,
}

impl RequestHeader {
    pub fn new(request_type: u32, user: UserName) -> Self {
        RequestHeader { request_type, user }
    }

    /// Protocol type, protocol version, request type, user
    pub fn decode(r: &mut dyn DisRead) -> Result<Self> {
        read_protocol(r)?;
        let request_type = r.read_u32()?;
        let user = read_bounded(r)?;
        Ok(RequestHeader { request_type, user })
    }

    pub fn encode(&self, w: &mut dyn DisWrite) -> Result<()> {
        write_protocol(w)?;
        w.write_unsigned_int(u64::from(self.request_type))?;
        w.write_counted_string(&self.user)
    }
}

/// Check the protocol type and version that open every message
pub(crate) fn read_protocol(r: &mut dyn DisRead) -> Result<()> {
    let protocol_type = r.read_unsigned_int()?;
    let version = r.read_unsigned_int()?;
    if protocol_type != PROTOCOL_TYPE || version != PROTOCOL_VERSION {
        return Err(WireError::BadProtocol {
            protocol_type,
            version,
        });
    }
    Ok(())
}

pub(crate) fn write_protocol(w: &mut dyn DisWrite) -> Result<()> {
    w.write_unsigned_int(PROTOCOL_TYPE)?;
    w.write_unsigned_int(PROTOCOL_VERSION)
}
