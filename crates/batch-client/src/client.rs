use crate::{ClientError, Result};
use batch_core::{BoundedString, JobState, UserName};
use batch_protocol::{
    AttrOp, Attribute, BatchReply, BatchRequest, ClientCodec, DestinationText, JobRequest,
    Manage, ManagerCommand, MoveJob, ObjectName, ObjectType, Registry, ReplyBody, RequestBody,
    SignalJob, StatusEntry, StatusQueue, TrackJob,
};

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Async client holding one connection to a batch server
pub struct BatchClient {
    framed: Framed<TcpStream, ClientCodec>,
    user: UserName,
    timeout: Duration,
}

fn bounded<const MAX: usize>(field: &str, value: &str) -> Result<BoundedString<MAX>> {
    BoundedString::new(value)
        .map_err(|e| ClientError::InvalidArgument(format!("{}: {}", field, e)))
}

fn expect_null(reply: BatchReply) -> Result<()> {
    match reply.body {
        ReplyBody::Null => Ok(()),
        other => Err(ClientError::UnexpectedReply(other.choice())),
    }
}

impl BatchClient {
    /// Connect to a server and announce `user`
    pub async fn connect(server_address: &str, user: &str) -> Result<Self> {
        let user = bounded("user", user)?;

        let stream = TcpStream::connect(server_address)
            .await
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

        let mut client = BatchClient {
            framed: Framed::new(stream, ClientCodec::new(Arc::new(Registry::standard()))),
            user,
            timeout: DEFAULT_TIMEOUT,
        };

        let reply = client.request(RequestBody::Connect).await?;
        expect_null(reply)?;

        debug!("Connected to {}", server_address);
        Ok(client)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one request and wait for its reply.
    ///
    /// Error replies are turned into [`ClientError::Rejected`].
    pub async fn request(&mut self, body: RequestBody) -> Result<BatchReply> {
        let reply = self.round_trip(body).await?;
        if reply.is_ok() {
            return Ok(reply);
        }

        let message = match reply.body {
            ReplyBody::Text(text) => Some(text),
            _ => None,
        };
        Err(ClientError::Rejected {
            code: reply.code,
            message,
        })
    }

    async fn round_trip(&mut self, body: RequestBody) -> Result<BatchReply> {
        let request = BatchRequest::new(self.user.clone(), body);
        debug!("Sending {}", request.request_type().as_str());
        self.framed.send(request).await?;

        match tokio::time::timeout(self.timeout, self.framed.next()).await {
            Ok(Some(Ok(reply))) => Ok(reply),
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) => Err(ClientError::ConnectionClosed),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    /// Report where a job now lives
    pub async fn track_job(
        &mut self,
        job_id: &str,
        hop_count: u32,
        location: &str,
        state: JobState,
    ) -> Result<()> {
        let body = RequestBody::TrackJob(TrackJob {
            job_id: bounded("job id", job_id)?,
            hop_count,
            location: bounded("location", location)?,
            state,
        });
        expect_null(self.request(body).await?)
    }

    /// Where a tracked job currently lives
    pub async fn locate_job(&mut self, job_id: &str) -> Result<String> {
        let body = RequestBody::LocateJob(JobRequest {
            job_id: bounded("job id", job_id)?,
        });
        match self.request(body).await?.body {
            ReplyBody::Locate(location) => Ok(location.into_inner()),
            other => Err(ClientError::UnexpectedReply(other.choice())),
        }
    }

    pub async fn delete_job(&mut self, job_id: &str) -> Result<()> {
        let body = RequestBody::DeleteJob(JobRequest {
            job_id: bounded("job id", job_id)?,
        });
        expect_null(self.request(body).await?)
    }

    pub async fn move_job(&mut self, job_id: &str, destination: &str) -> Result<()> {
        let destination: DestinationText = bounded("destination", destination)?;
        let body = RequestBody::MoveJob(MoveJob {
            job_id: bounded("job id", job_id)?,
            destination,
        });
        expect_null(self.request(body).await?)
    }

    pub async fn signal_job(&mut self, job_id: &str, signal: &str) -> Result<()> {
        let body = RequestBody::SignalJob(SignalJob {
            job_id: bounded("job id", job_id)?,
            signal: bounded("signal", signal)?,
        });
        expect_null(self.request(body).await?)
    }

    async fn manage_queue(
        &mut self,
        command: ManagerCommand,
        name: &str,
        attributes: Vec<Attribute>,
    ) -> Result<()> {
        let object_name: ObjectName = bounded("queue", name)?;
        let body = RequestBody::Manager(Manage {
            command,
            object_type: ObjectType::Queue,
            object_name,
            attributes,
        });
        expect_null(self.request(body).await?)
    }

    pub async fn create_queue(&mut self, name: &str, attributes: Vec<Attribute>) -> Result<()> {
        self.manage_queue(ManagerCommand::Create, name, attributes).await
    }

    pub async fn delete_queue(&mut self, name: &str) -> Result<()> {
        self.manage_queue(ManagerCommand::Delete, name, Vec::new()).await
    }

    pub async fn set_queue_attributes(
        &mut self,
        name: &str,
        attributes: Vec<Attribute>,
    ) -> Result<()> {
        self.manage_queue(ManagerCommand::Set, name, attributes).await
    }

    /// Remove attributes by name and optional resource
    pub async fn unset_queue_attributes(
        &mut self,
        name: &str,
        attributes: &[(&str, Option<&str>)],
    ) -> Result<()> {
        let attributes = attributes
            .iter()
            .map(|(attr, resource)| Attribute {
                name: attr.to_string(),
                resource: resource.map(str::to_string),
                value: String::new(),
                op: AttrOp::Unset,
            })
            .collect();
        self.manage_queue(ManagerCommand::Unset, name, attributes).await
    }

    /// Status of one queue, or of every queue when `id` is empty
    pub async fn status_queue(&mut self, id: &str) -> Result<Vec<StatusEntry>> {
        let body = RequestBody::StatusQueue(StatusQueue {
            id: bounded("queue", id)?,
            attributes: Vec::new(),
        });
        match self.request(body).await?.body {
            ReplyBody::Status(entries) => Ok(entries),
            other => Err(ClientError::UnexpectedReply(other.choice())),
        }
    }

    /// Say goodbye and close the connection
    pub async fn disconnect(mut self) -> Result<()> {
        let request = BatchRequest::new(self.user.clone(), RequestBody::Disconnect);
        self.framed.send(request).await?;
        self.framed.close().await?;
        Ok(())
    }
}
