use crate::dispatch::Inbound;
use crate::request::{self, read_extension, write_extension};
use crate::{BatchRequest, DisRead, DisWrite, RequestBody, RequestHeader, RequestType, Result, WireError};
use std::collections::HashMap;
use tracing::debug;

/// Decodes one body kind from a stream positioned just after the header
pub type DecodeFn = fn(&mut dyn DisRead) -> Result<RequestBody>;

/// Writes one body kind, fields in wire order
pub type EncodeFn = fn(&RequestBody, &mut dyn DisWrite) -> Result<()>;

/// Codec pair registered for a request kind
#[derive(Debug, Clone, Copy)]
pub struct RegisteredKind {
    pub kind: RequestType,
    pub decode: DecodeFn,
    pub encode: EncodeFn,
}

/// Request-type code to body codec table.
///
/// Built once at startup and shared read-only between connections.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    kinds: HashMap<u32, RegisteredKind>,
}

impl Registry {
    /// Empty table; every code is unsupported
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every request kind this crate knows how to carry
    pub fn standard() -> Self {
        let mut registry = Registry::new();
        registry.register(RequestType::Connect, request::decode_empty_connect, request::encode_empty);
        registry.register(RequestType::DeleteJob, request::decode_delete_job, request::encode_job_request);
        registry.register(RequestType::LocateJob, request::decode_locate_job, request::encode_job_request);
        registry.register(RequestType::Manager, request::decode_manager, request::encode_manager);
        registry.register(RequestType::MoveJob, request::decode_move_job, request::encode_move_job);
        registry.register(RequestType::SignalJob, request::decode_signal_job, request::encode_signal_job);
        registry.register(RequestType::StatusQueue, request::decode_status_queue, request::encode_status_queue);
        registry.register(RequestType::TrackJob, request::decode_track_job, request::encode_track_job);
        registry.register(RequestType::Disconnect, request::decode_empty_disconnect, request::encode_empty);
        registry
    }

    /// Add or replace the codec pair for `kind`, returning the previous pair
    pub fn register(
        &mut self,
        kind: RequestType,
        decode: DecodeFn,
        encode: EncodeFn,
    ) -> Option<RegisteredKind> {
        self.kinds.insert(
            kind.code(),
            RegisteredKind {
                kind,
                decode,
                encode,
            },
        )
    }

    pub fn lookup(&self, code: u32) -> Option<&RegisteredKind> {
        self.kinds.get(&code)
    }

    pub fn is_supported(&self, code: u32) -> bool {
        self.kinds.contains_key(&code)
    }

    /// Decode the body for `code`; unknown codes are [`WireError::UnsupportedRequest`]
    pub fn decode_body(&self, code: u32, r: &mut dyn DisRead) -> Result<RequestBody> {
        let entry = self.lookup(code).ok_or(WireError::UnsupportedRequest(code))?;
        (entry.decode)(r)
    }

    pub fn encode_body(&self, body: &RequestBody, w: &mut dyn DisWrite) -> Result<()> {
        let kind = body.request_type();
        let entry = self
            .lookup(kind.code())
            .ok_or(WireError::UnsupportedRequest(kind.code()))?;
        (entry.encode)(body, w)
    }

    /// Decode a whole request. Unknown codes leave the stream just past the header.
    pub fn decode_inbound(&self, r: &mut dyn DisRead) -> Result<Inbound> {
        let header = RequestHeader::decode(r)?;
        let body = match self.decode_body(header.request_type, r) {
            Ok(body) => body,
            Err(WireError::UnsupportedRequest(code)) => {
                debug!("Unsupported request type {} from {}", code, header.user);
                return Ok(Inbound::Unsupported(header));
            }
            Err(e) => return Err(e),
        };
        let extension = read_extension(r)?;
        Ok(Inbound::Request(BatchRequest {
            header,
            body,
            extension,
        }))
    }

    /// Like [`Registry::decode_inbound`] but unknown codes are an error
    pub fn decode_request(&self, r: &mut dyn DisRead) -> Result<BatchRequest> {
        match self.decode_inbound(r)? {
            Inbound::Request(request) => Ok(request),
            Inbound::Unsupported(header) => Err(WireError::UnsupportedRequest(header.request_type)),
        }
    }

    /// Header, body and extension trailer
    pub fn encode_request(&self, request: &BatchRequest, w: &mut dyn DisWrite) -> Result<()> {
        let kind = request.body.request_type();
        if request.header.request_type != kind.code() {
            return Err(WireError::BodyMismatch(kind));
        }
        request.header.encode(w)?;
        self.encode_body(&request.body, w)?;
        write_extension(w, request.extension.as_deref())
    }
}
