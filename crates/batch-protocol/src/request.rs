//! Request kinds and their body schemas.
//!
//! Field order is part of the protocol version; each decoder reads exactly
//! the fields its encoder writes, in the same order.

use crate::{
    read_attributes, read_bounded, write_attributes, Attribute, DisRead, DisWrite, ProtocolError,
    RequestHeader, Result, WireError, MAX_EXTEND,
};
use batch_core::{BoundedString, JobId, JobState, MAX_DEST, MAX_SIGNAL_NAME};

/// Destination text, also used for job locations
pub type DestinationText = BoundedString<MAX_DEST>;

/// Name of a managed or queried object
pub type ObjectName = BoundedString<MAX_DEST>;

pub type SignalName = BoundedString<MAX_SIGNAL_NAME>;

/// Numeric request-type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RequestType {
    Connect = 0,
    DeleteJob = 6,
    LocateJob = 8,
    Manager = 9,
    MoveJob = 12,
    SignalJob = 18,
    StatusQueue = 20,
    TrackJob = 22,
    Disconnect = 59,
}

impl RequestType {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(RequestType::Connect),
            6 => Some(RequestType::DeleteJob),
            8 => Some(RequestType::LocateJob),
            9 => Some(RequestType::Manager),
            12 => Some(RequestType::MoveJob),
            18 => Some(RequestType::SignalJob),
            20 => Some(RequestType::StatusQueue),
            22 => Some(RequestType::TrackJob),
            59 => Some(RequestType::Disconnect),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        *self as u32
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Connect => "connect",
            RequestType::DeleteJob => "delete_job",
            RequestType::LocateJob => "locate_job",
            RequestType::Manager => "manager",
            RequestType::MoveJob => "move_job",
            RequestType::SignalJob => "signal_job",
            RequestType::StatusQueue => "status_queue",
            RequestType::TrackJob => "track_job",
            RequestType::Disconnect => "disconnect",
        }
    }
}

/// Body of a request that names a single job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub job_id: JobId,
}

/// Location report for a job that has moved between servers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackJob {
    pub job_id: JobId,
    /// Times the request has been forwarded between servers
    pub hop_count: u32,
    pub location: DestinationText,
    pub state: JobState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveJob {
    pub job_id: JobId,
    pub destination: DestinationText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalJob {
    pub job_id: JobId,
    pub signal: SignalName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ManagerCommand {
    Create = 0,
    Delete = 1,
    Set = 2,
    Unset = 3,
    List = 4,
    Print = 5,
}

impl ManagerCommand {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(ManagerCommand::Create),
            1 => Some(ManagerCommand::Delete),
            2 => Some(ManagerCommand::Set),
            3 => Some(ManagerCommand::Unset),
            4 => Some(ManagerCommand::List),
            5 => Some(ManagerCommand::Print),
            _ => None,
        }
    }
}

/// Kind of object a manager or status request addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectType {
    Server = 0,
    Queue = 1,
    Job = 2,
    Node = 3,
}

impl ObjectType {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(ObjectType::Server),
            1 => Some(ObjectType::Queue),
            2 => Some(ObjectType::Job),
            3 => Some(ObjectType::Node),
            _ => None,
        }
    }

    pub(crate) fn read(r: &mut dyn DisRead) -> Result<Self> {
        ObjectType::from_code(r.read_unsigned_int()?)
            .ok_or_else(|| ProtocolError::Malformed("unknown object type").into())
    }
}

/// Administrative command against a server object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manage {
    pub command: ManagerCommand,
    pub object_type: ObjectType,
    pub object_name: ObjectName,
    pub attributes: Vec<Attribute>,
}

/// Queue status query; an empty id selects every queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusQueue {
    pub id: ObjectName,
    pub attributes: Vec<Attribute>,
}

/// Type-specific part of a batch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Connect,
    DeleteJob(JobRequest),
    LocateJob(JobRequest),
    Manager(Manage),
    MoveJob(MoveJob),
    SignalJob(SignalJob),
    StatusQueue(StatusQueue),
    TrackJob(TrackJob),
    Disconnect,
}

impl RequestBody {
    pub fn request_type(&self) -> RequestType {
        match self {
            RequestBody::Connect => RequestType::Connect,
            RequestBody::DeleteJob(_) => RequestType::DeleteJob,
            RequestBody::LocateJob(_) => RequestType::LocateJob,
            RequestBody::Manager(_) => RequestType::Manager,
            RequestBody::MoveJob(_) => RequestType::MoveJob,
            RequestBody::SignalJob(_) => RequestType::SignalJob,
            RequestBody::StatusQueue(_) => RequestType::StatusQueue,
            RequestBody::TrackJob(_) => RequestType::TrackJob,
            RequestBody::Disconnect => RequestType::Disconnect,
        }
    }
}

/// A complete decoded request: header, body and optional extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub header: RequestHeader,
    pub body: RequestBody,
    pub extension: Option<String>,
}

impl BatchRequest {
    pub fn new(user: batch_core::UserName, body: RequestBody) -> Self {
        BatchRequest {
            header: RequestHeader::new(body.request_type().code(), user),
            body,
            extension: None,
        }
    }

    pub fn request_type(&self) -> RequestType {
        self.body.request_type()
    }
}

pub(crate) fn read_extension(r: &mut dyn DisRead) -> Result<Option<String>> {
    if r.read_flag()? {
        Ok(Some(r.read_counted_string(MAX_EXTEND)?))
    } else {
        Ok(None)
    }
}

pub(crate) fn write_extension(w: &mut dyn DisWrite, extension: Option<&str>) -> Result<()> {
    match extension {
        Some(text) => {
            w.write_flag(true)?;
            w.write_counted_string(text)
        }
        None => w.write_flag(false),
    }
}

fn mismatch(kind: RequestType) -> WireError {
    WireError::BodyMismatch(kind)
}

pub(crate) fn decode_empty_connect(_r: &mut dyn DisRead) -> Result<RequestBody> {
    Ok(RequestBody::Connect)
}

pub(crate) fn decode_empty_disconnect(_r: &mut dyn DisRead) -> Result<RequestBody> {
    Ok(RequestBody::Disconnect)
}

pub(crate) fn encode_empty(body: &RequestBody, _w: &mut dyn DisWrite) -> Result<()> {
    match body {
        RequestBody::Connect | RequestBody::Disconnect => Ok(()),
        other => Err(mismatch(other.request_type())),
    }
}

pub(crate) fn decode_delete_job(r: &mut dyn DisRead) -> Result<RequestBody> {
    let job_id = read_bounded(r)?;
    Ok(RequestBody::DeleteJob(JobRequest { job_id }))
}

pub(crate) fn decode_locate_job(r: &mut dyn DisRead) -> Result<RequestBody> {
    let job_id = read_bounded(r)?;
    Ok(RequestBody::LocateJob(JobRequest { job_id }))
}

pub(crate) fn encode_job_request(body: &RequestBody, w: &mut dyn DisWrite) -> Result<()> {
    match body {
        RequestBody::DeleteJob(req) | RequestBody::LocateJob(req) => {
            w.write_counted_string(&req.job_id)
        }
        other => Err(mismatch(other.request_type())),
    }
}

/// job id, hop count, location, state
pub(crate) fn decode_track_job(r: &mut dyn DisRead) -> Result<RequestBody> {
    let job_id = read_bounded(r)?;
    let hop_count = r.read_u32()?;
    let location = read_bounded(r)?;
    let state = JobState::from_char(r.read_char()?);
    Ok(RequestBody::TrackJob(TrackJob {
        job_id,
        hop_count,
        location,
        state,
    }))
}

pub(crate) fn encode_track_job(body: &RequestBody, w: &mut dyn DisWrite) -> Result<()> {
    let RequestBody::TrackJob(track) = body else {
        return Err(mismatch(RequestType::TrackJob));
    };
    w.write_counted_string(&track.job_id)?;
    w.write_unsigned_int(u64::from(track.hop_count))?;
    w.write_counted_string(&track.location)?;
    w.write_char(track.state.as_char())
}

pub(crate) fn decode_move_job(r: &mut dyn DisRead) -> Result<RequestBody> {
    let job_id = read_bounded(r)?;
    let destination = read_bounded(r)?;
    Ok(RequestBody::MoveJob(MoveJob {
        job_id,
        destination,
    }))
}

pub(crate) fn encode_move_job(body: &RequestBody, w: &mut dyn DisWrite) -> Result<()> {
    let RequestBody::MoveJob(req) = body else {
        return Err(mismatch(RequestType::MoveJob));
    };
    w.write_counted_string(&req.job_id)?;
    w.write_counted_string(&req.destination)
}

pub(crate) fn decode_signal_job(r: &mut dyn DisRead) -> Result<RequestBody> {
    let job_id = read_bounded(r)?;
    let signal = read_bounded(r)?;
    Ok(RequestBody::SignalJob(SignalJob { job_id, signal }))
}

pub(crate) fn encode_signal_job(body: &RequestBody, w: &mut dyn DisWrite) -> Result<()> {
    let RequestBody::SignalJob(req) = body else {
        return Err(mismatch(RequestType::SignalJob));
    };
    w.write_counted_string(&req.job_id)?;
    w.write_counted_string(&req.signal)
}

/// command, object type, object name, attribute list
pub(crate) fn decode_manager(r: &mut dyn DisRead) -> Result<RequestBody> {
    let command = ManagerCommand::from_code(r.read_unsigned_int()?)
        .ok_or(ProtocolError::Malformed("unknown manager command"))?;
    let object_type = ObjectType::read(r)?;
    let object_name = read_bounded(r)?;
    let attributes = read_attributes(r)?;
    Ok(RequestBody::Manager(Manage {
        command,
        object_type,
        object_name,
        attributes,
    }))
}

pub(crate) fn encode_manager(body: &RequestBody, w: &mut dyn DisWrite) -> Result<()> {
    let RequestBody::Manager(manage) = body else {
        return Err(mismatch(RequestType::Manager));
    };
    w.write_unsigned_int(manage.command as u64)?;
    w.write_unsigned_int(manage.object_type as u64)?;
    w.write_counted_string(&manage.object_name)?;
    write_attributes(w, &manage.attributes)
}

pub(crate) fn decode_status_queue(r: &mut dyn DisRead) -> Result<RequestBody> {
    let id = read_bounded(r)?;
    let attributes = read_attributes(r)?;
    Ok(RequestBody::StatusQueue(StatusQueue { id, attributes }))
}

pub(crate) fn encode_status_queue(body: &RequestBody, w: &mut dyn DisWrite) -> Result<()> {
    let RequestBody::StatusQueue(status) = body else {
        return Err(mismatch(RequestType::StatusQueue));
    };
    w.write_counted_string(&status.id)?;
    write_attributes(w, &status.attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_core::MAX_SVR_JOB_ID;
    use std::io::Cursor;

    fn track_body() -> RequestBody {
        RequestBody::TrackJob(TrackJob {
            job_id: JobId::new("123.server").unwrap(),
            hop_count: 2,
            location: DestinationText::new("server2").unwrap(),
            state: JobState::Queued,
        })
    }

    #[test]
    fn test_request_type_codes() {
        assert_eq!(RequestType::from_code(22), Some(RequestType::TrackJob));
        assert_eq!(RequestType::TrackJob.code(), 22);
        assert_eq!(RequestType::from_code(1000), None);
    }

    #[test]
    fn test_track_job_decode_and_reencode() {
        let wire = b"2+10123.server+2+7server2Q";
        let mut cursor = Cursor::new(wire.as_slice());
        let body = decode_track_job(&mut cursor).unwrap();
        assert_eq!(body, track_body());
        assert_eq!(cursor.position() as usize, wire.len());

        let mut out: Vec<u8> = Vec::new();
        encode_track_job(&body, &mut out).unwrap();
        assert_eq!(out, wire.to_vec());
    }

    #[test]
    fn test_track_job_id_overflow_stops_at_marker() {
        let declared = MAX_SVR_JOB_ID as u64 + 1;
        let mut wire: Vec<u8> = Vec::new();
        wire.write_unsigned_int(declared).unwrap();
        let marker_len = wire.len();
        wire.extend(std::iter::repeat(b'9').take(declared as usize));
        wire.extend_from_slice(b"+2+7server2Q");

        let mut cursor = Cursor::new(wire.as_slice());
        let err = decode_track_job(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            WireError::Protocol(ProtocolError::Overflow { max: MAX_SVR_JOB_ID, .. })
        ));
        assert_eq!(cursor.position() as usize, marker_len);
    }

    #[test]
    fn test_track_job_unknown_state_passes_through() {
        let wire = b"+11+2+1sz";
        let body = decode_track_job(&mut Cursor::new(wire.as_slice())).unwrap();
        let RequestBody::TrackJob(track) = &body else {
            panic!("expected track body");
        };
        assert_eq!(track.state, JobState::Other(b'z'));

        let mut out: Vec<u8> = Vec::new();
        encode_track_job(&body, &mut out).unwrap();
        assert_eq!(out, wire.to_vec());
    }

    #[test]
    fn test_track_job_truncated_mid_field() {
        let err = decode_track_job(&mut Cursor::new(b"2+10123.server+2+7serv".as_slice())).unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn test_encoder_rejects_wrong_body() {
        let mut out: Vec<u8> = Vec::new();
        let err = encode_move_job(&track_body(), &mut out).unwrap_err();
        assert!(matches!(err, WireError::BodyMismatch(RequestType::MoveJob)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_manager_body() {
        let body = RequestBody::Manager(Manage {
            command: ManagerCommand::Create,
            object_type: ObjectType::Queue,
            object_name: ObjectName::new("workq").unwrap(),
            attributes: vec![Attribute::set("queue_type", "execution")],
        });
        let mut out: Vec<u8> = Vec::new();
        encode_manager(&body, &mut out).unwrap();
        let decoded = decode_manager(&mut Cursor::new(&out)).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_manager_rejects_unknown_command() {
        let err = decode_manager(&mut Cursor::new(b"+9+1+5workq+0".as_slice())).unwrap_err();
        assert!(matches!(err, WireError::Protocol(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_extension_trailer() {
        let mut out: Vec<u8> = Vec::new();
        write_extension(&mut out, Some("note")).unwrap();
        write_extension(&mut out, None).unwrap();
        assert_eq!(out, b"+1+4note+0".to_vec());

        let mut cursor = Cursor::new(&out);
        assert_eq!(read_extension(&mut cursor).unwrap(), Some("note".to_string()));
        assert_eq!(read_extension(&mut cursor).unwrap(), None);
    }
}
