use crate::{BatchReply, BatchRequest, Inbound, ProtocolError, Registry, Result, WireError, MAX_MESSAGE_BYTES};
use bytes::{Buf, BytesMut};
use std::io::{self, Read};
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

/// Reader over the buffered bytes that remembers the furthest offset any
/// read asked for.
///
/// When a decode runs out of bytes, that offset is a lower bound on the
/// length of the message being decoded.
struct BufferedBytes<'a> {
    data: &'a [u8],
    pos: usize,
    wanted: usize,
}

impl<'a> BufferedBytes<'a> {
    fn new(data: &'a [u8]) -> Self {
        BufferedBytes {
            data,
            pos: 0,
            wanted: 0,
        }
    }
}

impl Read for BufferedBytes<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.wanted = self.wanted.max(self.pos + buf.len());
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Run a blocking decode over the buffered bytes.
///
/// A message that runs past the end of the buffer is not an error yet; the
/// buffer is left untouched until more bytes arrive. Bytes are consumed only
/// once a whole message decodes. `needed` carries the known minimum message
/// length between calls so that no decode is attempted before the buffer
/// reaches it.
fn decode_buffered<T>(
    src: &mut BytesMut,
    needed: &mut usize,
    decode: impl FnOnce(&mut BufferedBytes<'_>) -> Result<T>,
) -> Result<Option<T>> {
    if src.is_empty() || src.len() < *needed {
        return Ok(None);
    }

    let (result, consumed, wanted) = {
        let mut reader = BufferedBytes::new(&src[..]);
        let result = decode(&mut reader);
        (result, reader.pos, reader.wanted)
    };

    match result {
        Ok(item) => {
            *needed = 0;
            src.advance(consumed);
            Ok(Some(item))
        }
        Err(e) if e.is_truncated() => {
            let hint = wanted.max(src.len() + 1);
            if hint > MAX_MESSAGE_BYTES {
                *needed = 0;
                return Err(WireError::MessageTooLarge(hint));
            }
            *needed = hint;
            src.reserve(hint - src.len());
            Ok(None)
        }
        Err(e) => {
            *needed = 0;
            Err(e)
        }
    }
}

/// Leftover bytes at end of stream are a message cut short
fn at_eof<T>(item: Option<T>, src: &BytesMut) -> Result<Option<T>> {
    match item {
        Some(item) => Ok(Some(item)),
        None if src.is_empty() => Ok(None),
        None => Err(ProtocolError::Truncated.into()),
    }
}

/// Server side of a connection: decodes requests, encodes replies
#[derive(Debug, Clone)]
pub struct ServerCodec {
    registry: Arc<Registry>,
    // Minimum buffered length before the next decode attempt
    needed: usize,
}

impl ServerCodec {
    pub fn new(registry: Arc<Registry>) -> Self {
        ServerCodec {
            registry,
            needed: 0,
        }
    }
}

impl Decoder for ServerCodec {
    type Item = Inbound;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let registry = &self.registry;
        decode_buffered(src, &mut self.needed, |reader| registry.decode_inbound(reader))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let item = self.decode(src)?;
        at_eof(item, src)
    }
}

impl Encoder<BatchReply> for ServerCodec {
    type Error = WireError;

    fn encode(&mut self, item: BatchReply, dst: &mut BytesMut) -> Result<()> {
        let mut buf: Vec<u8> = Vec::new();
        item.encode(&mut buf)?;
        dst.extend_from_slice(&buf);
        Ok(())
    }
}

/// Client side of a connection: encodes requests, decodes replies
#[derive(Debug, Clone)]
pub struct ClientCodec {
    registry: Arc<Registry>,
    needed: usize,
}

impl ClientCodec {
    pub fn new(registry: Arc<Registry>) -> Self {
        ClientCodec {
            registry,
            needed: 0,
        }
    }
}

impl Decoder for ClientCodec {
    type Item = BatchReply;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        decode_buffered(src, &mut self.needed, |reader| BatchReply::decode(reader))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let item = self.decode(src)?;
        at_eof(item, src)
    }
}

impl Encoder<BatchRequest> for ClientCodec {
    type Error = WireError;

    fn encode(&mut self, item: BatchRequest, dst: &mut BytesMut) -> Result<()> {
        let mut buf: Vec<u8> = Vec::new();
        self.registry.encode_request(&item, &mut buf)?;
        dst.extend_from_slice(&buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Attribute, DestinationText, DisRead, DisWrite, Manage, ManagerCommand, ObjectName,
        ObjectType, RequestBody, RequestHeader, RequestType, TrackJob, MAX_ATTRIBUTES,
        MAX_ATTR_VALUE,
    };
    use batch_core::{JobId, JobState, ReplyCode, UserName};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn track_request(job: &str, location: &str, hop_count: u32) -> BatchRequest {
        BatchRequest::new(
            UserName::new("alice").unwrap(),
            RequestBody::TrackJob(TrackJob {
                job_id: JobId::new(job).unwrap(),
                hop_count,
                location: DestinationText::new(location).unwrap(),
                state: JobState::Running,
            }),
        )
    }

    fn encode(request: &BatchRequest) -> BytesMut {
        let mut client = ClientCodec::new(Arc::new(Registry::standard()));
        let mut buf = BytesMut::new();
        client.encode(request.clone(), &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_server_decodes_whole_request() {
        let request = track_request("1.srv", "srv", 0);
        let mut buf = encode(&request);
        let mut server = ServerCodec::new(Arc::new(Registry::standard()));

        let inbound = server.decode(&mut buf).unwrap();
        assert_eq!(inbound, Some(Inbound::Request(request)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_request_waits_for_more() {
        let request = track_request("1.srv", "srv", 0);
        let full = encode(&request);
        let mut server = ServerCodec::new(Arc::new(Registry::standard()));

        let mut buf = BytesMut::from(&full[..full.len() - 3]);
        assert_eq!(server.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), full.len() - 3);

        buf.extend_from_slice(&full[full.len() - 3..]);
        assert_eq!(server.decode(&mut buf).unwrap(), Some(Inbound::Request(request)));
    }

    #[test]
    fn test_partial_request_at_eof_is_truncated() {
        let full = encode(&track_request("1.srv", "srv", 0));
        let mut server = ServerCodec::new(Arc::new(Registry::standard()));
        let mut buf = BytesMut::from(&full[..full.len() / 2]);
        assert!(server.decode_eof(&mut buf).unwrap_err().is_truncated());

        let mut empty = BytesMut::new();
        assert_eq!(server.decode_eof(&mut empty).unwrap(), None);
    }

    #[test]
    fn test_two_requests_in_one_buffer() {
        let first = track_request("1.srv", "srv", 0);
        let second = track_request("2.srv", "other", 1);
        let mut buf = encode(&first);
        buf.extend_from_slice(&encode(&second));

        let mut server = ServerCodec::new(Arc::new(Registry::standard()));
        assert_eq!(server.decode(&mut buf).unwrap(), Some(Inbound::Request(first)));
        assert_eq!(server.decode(&mut buf).unwrap(), Some(Inbound::Request(second)));
        assert_eq!(server.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_malformed_request_is_fatal() {
        let mut buf = BytesMut::from(&b"+2+1x"[..]);
        let mut server = ServerCodec::new(Arc::new(Registry::standard()));
        assert!(matches!(
            server.decode(&mut buf),
            Err(WireError::Protocol(ProtocolError::Malformed(_)))
        ));
    }

    #[test]
    fn test_oversized_partial_message_rejected() {
        let mut raw: Vec<u8> = Vec::new();
        RequestHeader::new(RequestType::Manager.code(), UserName::new("alice").unwrap())
            .encode(&mut raw)
            .unwrap();
        raw.write_unsigned_int(0).unwrap();
        raw.write_unsigned_int(1).unwrap();
        raw.write_counted_string("workq").unwrap();
        raw.write_unsigned_int(MAX_ATTRIBUTES as u64).unwrap();
        let value = "x".repeat(MAX_ATTR_VALUE);
        while raw.len() <= MAX_MESSAGE_BYTES {
            raw.write_counted_string("a").unwrap();
            raw.write_flag(false).unwrap();
            raw.write_counted_string(&value).unwrap();
            raw.write_unsigned_int(0).unwrap();
        }

        let mut buf = BytesMut::from(&raw[..]);
        let mut server = ServerCodec::new(Arc::new(Registry::standard()));
        assert!(matches!(
            server.decode(&mut buf),
            Err(WireError::MessageTooLarge(_))
        ));
    }

    static MANAGER_DECODES: AtomicUsize = AtomicUsize::new(0);

    fn counting_decode_manager(r: &mut dyn DisRead) -> Result<RequestBody> {
        MANAGER_DECODES.fetch_add(1, Ordering::SeqCst);
        crate::request::decode_manager(r)
    }

    #[test]
    fn test_chunked_large_request_skips_redundant_decodes() {
        const ATTRIBUTES: usize = 8;
        const CHUNK: usize = 4096;

        let value = "v".repeat(MAX_ATTR_VALUE);
        let request = BatchRequest::new(
            UserName::new("alice").unwrap(),
            RequestBody::Manager(Manage {
                command: ManagerCommand::Set,
                object_type: ObjectType::Queue,
                object_name: ObjectName::new("workq").unwrap(),
                attributes: (0..ATTRIBUTES)
                    .map(|i| Attribute::set(format!("attr{}", i), value.clone()))
                    .collect(),
            }),
        );
        let full = encode(&request);

        let mut registry = Registry::standard();
        registry.register(
            RequestType::Manager,
            counting_decode_manager,
            crate::request::encode_manager,
        );
        let mut server = ServerCodec::new(Arc::new(registry));

        let mut buf = BytesMut::new();
        let mut decoded = None;
        for chunk in full.chunks(CHUNK) {
            buf.extend_from_slice(chunk);
            if let Some(inbound) = server.decode(&mut buf).unwrap() {
                decoded = Some(inbound);
            }
        }

        assert_eq!(decoded, Some(Inbound::Request(request)));
        let chunks = full.len().div_ceil(CHUNK);
        let attempts = MANAGER_DECODES.load(Ordering::SeqCst);
        assert!(chunks > 100);
        assert!(
            attempts <= 2 * ATTRIBUTES + 2,
            "{} body decodes for {} chunks",
            attempts,
            chunks
        );
    }

    fn push_attribute(raw: &mut Vec<u8>, value_len: usize) {
        raw.write_counted_string("a").unwrap();
        raw.write_flag(false).unwrap();
        raw.write_counted_bytes(&vec![b'x'; value_len]).unwrap();
        raw.write_unsigned_int(0).unwrap();
    }

    #[test]
    fn test_declared_length_past_limit_rejected_early() {
        let mut raw: Vec<u8> = Vec::new();
        RequestHeader::new(RequestType::Manager.code(), UserName::new("alice").unwrap())
            .encode(&mut raw)
            .unwrap();
        raw.write_unsigned_int(2).unwrap();
        raw.write_unsigned_int(1).unwrap();
        raw.write_counted_string("workq").unwrap();
        raw.write_unsigned_int(MAX_ATTRIBUTES as u64).unwrap();
        while raw.len() + MAX_ATTR_VALUE + 32 <= MAX_MESSAGE_BYTES {
            push_attribute(&mut raw, MAX_ATTR_VALUE);
        }
        while raw.len() + MAX_ATTR_VALUE <= MAX_MESSAGE_BYTES {
            push_attribute(&mut raw, 1000);
        }
        raw.write_counted_string("a").unwrap();
        raw.write_flag(false).unwrap();
        raw.write_unsigned_int(MAX_ATTR_VALUE as u64).unwrap();

        // Under the limit so far, but the declared value cannot fit
        assert!(raw.len() < MAX_MESSAGE_BYTES);
        let mut buf = BytesMut::from(&raw[..]);
        let mut server = ServerCodec::new(Arc::new(Registry::standard()));
        assert!(matches!(
            server.decode(&mut buf),
            Err(WireError::MessageTooLarge(_))
        ));
    }

    #[test]
    fn test_unsupported_request_consumes_header_only() {
        let mut header: Vec<u8> = Vec::new();
        RequestHeader::new(99, UserName::new("alice").unwrap())
            .encode(&mut header)
            .unwrap();
        let mut buf = BytesMut::from(&header[..]);
        let mut server = ServerCodec::new(Arc::new(Registry::standard()));
        match server.decode(&mut buf).unwrap() {
            Some(Inbound::Unsupported(h)) => assert_eq!(h.request_type, 99),
            other => panic!("unexpected {:?}", other),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_reply_round_trip_through_codecs() {
        let mut server = ServerCodec::new(Arc::new(Registry::standard()));
        let mut client = ClientCodec::new(Arc::new(Registry::standard()));
        let reply = BatchReply::error(ReplyCode::UnknownJob);

        let mut buf = BytesMut::new();
        server.encode(reply.clone(), &mut buf).unwrap();
        assert_eq!(client.decode(&mut buf).unwrap(), Some(reply));
    }

    #[test]
    fn test_concurrent_connections_do_not_share_state() {
        const ROUNDS: u32 = 200;
        let registry = Arc::new(Registry::standard());
        let barrier = Arc::new(Barrier::new(2));

        let workers: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|tag| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let mut server = ServerCodec::new(registry);
                    barrier.wait();
                    for round in 0..ROUNDS {
                        let request = track_request(
                            &format!("{}.{}", round, tag),
                            &format!("server-{}", tag),
                            round,
                        );
                        let bytes = encode(&request);
                        // feed one byte at a time to maximise interleaving
                        let mut buf = BytesMut::new();
                        let mut decoded = None;
                        for byte in bytes.iter() {
                            buf.extend_from_slice(&[*byte]);
                            if let Some(inbound) = server.decode(&mut buf).unwrap() {
                                decoded = Some(inbound);
                            }
                            thread::yield_now();
                        }
                        assert_eq!(decoded, Some(Inbound::Request(request)));
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
    }
}
