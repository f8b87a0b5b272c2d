use crate::{
    DisRead, DisWrite, ProtocolError, Result, MAX_ATTRIBUTES, MAX_ATTR_NAME, MAX_ATTR_VALUE,
};

/// Operator attached to an attribute entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttrOp {
    Set = 0,
    Unset = 1,
    Incr = 2,
    Decr = 3,
    Eq = 4,
    Ne = 5,
    Ge = 6,
    Gt = 7,
    Le = 8,
    Lt = 9,
    Default = 10,
}

impl AttrOp {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AttrOp::Set),
            1 => Some(AttrOp::Unset),
            2 => Some(AttrOp::Incr),
            3 => Some(AttrOp::Decr),
            4 => Some(AttrOp::Eq),
            5 => Some(AttrOp::Ne),
            6 => Some(AttrOp::Ge),
            7 => Some(AttrOp::Gt),
            8 => Some(AttrOp::Le),
            9 => Some(AttrOp::Lt),
            10 => Some(AttrOp::Default),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// One `name[.resource] op value` entry of an attribute list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub resource: Option<String>,
    pub value: String,
    pub op: AttrOp,
}

impl Attribute {
    pub fn set(name: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute {
            name: name.into(),
            resource: None,
            value: value.into(),
            op: AttrOp::Set,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_op(mut self, op: AttrOp) -> Self {
        self.op = op;
        self
    }
}

/// Count, then per entry: name, resource flag, resource, value, op
pub fn read_attributes(r: &mut dyn DisRead) -> Result<Vec<Attribute>> {
    let count = r.read_unsigned_int()?;
    if count > MAX_ATTRIBUTES as u64 {
        return Err(ProtocolError::Overflow {
            declared: count,
            max: MAX_ATTRIBUTES,
        }
        .into());
    }

    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = r.read_counted_string(MAX_ATTR_NAME)?;
        let resource = if r.read_flag()? {
            Some(r.read_counted_string(MAX_ATTR_NAME)?)
        } else {
            None
        };
        let value = r.read_counted_string(MAX_ATTR_VALUE)?;
        let op = u8::try_from(r.read_unsigned_int()?)
            .ok()
            .and_then(AttrOp::from_u8)
            .ok_or(ProtocolError::Malformed("unknown attribute operator"))?;
        attributes.push(Attribute {
            name,
            resource,
            value,
            op,
        });
    }
    Ok(attributes)
}

pub fn write_attributes(w: &mut dyn DisWrite, attributes: &[Attribute]) -> Result<()> {
    w.write_unsigned_int(attributes.len() as u64)?;
    for attr in attributes {
        w.write_counted_string(&attr.name)?;
        w.write_flag(attr.resource.is_some())?;
        if let Some(resource) = &attr.resource {
            w.write_counted_string(resource)?;
        }
        w.write_counted_string(&attr.value)?;
        w.write_unsigned_int(u64::from(attr.op.as_u8()))?;
    }
    Ok(())
}
