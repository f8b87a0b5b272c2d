use crate::{BatchReply, BatchRequest, RequestBody, RequestHeader};
use async_trait::async_trait;
use batch_core::ReplyCode;
use tracing::warn;

/// One message read off a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Fully decoded request, ready for a handler
    Request(BatchRequest),
    /// Well-formed header with a request type nobody registered
    Unsupported(RequestHeader),
}

/// What the connection should do after dispatching a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Reply(BatchReply),
    Close,
}

/// Server-side consumer of decoded requests
#[async_trait]
pub trait BatchHandler: Send + Sync {
    /// Handle one request and build its reply
    async fn handle(&self, request: BatchRequest) -> BatchReply;
}

/// Route one inbound message.
///
/// Unsupported request types are rejected here without reaching the handler.
/// A disconnect closes the connection without a reply.
pub async fn dispatch<H: BatchHandler + ?Sized>(handler: &H, inbound: Inbound) -> Dispatched {
    match inbound {
        Inbound::Unsupported(header) => {
            warn!(
                "Rejecting unsupported request type {} from {}",
                header.request_type, header.user
            );
            Dispatched::Reply(BatchReply::error(ReplyCode::UnknownRequest))
        }
        Inbound::Request(request) if matches!(request.body, RequestBody::Disconnect) => {
            Dispatched::Close
        }
        Inbound::Request(request) => Dispatched::Reply(handler.handle(request).await),
    }
}
