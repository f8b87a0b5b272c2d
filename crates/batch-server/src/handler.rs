use async_trait::async_trait;
use batch_core::{parse_destination, Destination, JobState, QueueName, ReplyCode, ServerName};
use batch_persistence::{
    DeleteOutcome, PersistenceError, QueueAttribute, QueueFilter, QueueRecord, QueueStore,
    QueueType, UpdateOutcome,
};
use batch_protocol::{
    AttrOp, Attribute, BatchHandler, BatchReply, BatchRequest, DestinationText, JobRequest,
    Manage, ManagerCommand, MoveJob, ObjectName, ObjectType, ReplyBody, RequestBody, SignalJob,
    StatusEntry, StatusQueue, TrackJob, MAX_STATUS_ENTRIES,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Attribute name that carries a queue's type in manager and status requests
pub const QUEUE_TYPE_ATTR: &str = "queue_type";

/// Tracking records kept unless configured otherwise
pub const DEFAULT_MAX_TRACKED_JOBS: usize = 100_000;

type StoreResult<T> = batch_persistence::Result<T>;

/// Last known whereabouts of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedJob {
    pub location: DestinationText,
    pub state: JobState,
    pub hop_count: u32,
}

/// Request handler backing the batch server
pub struct ServerHandler {
    server_name: ServerName,
    store: Arc<dyn QueueStore>,
    tracked: DashMap<String, TrackedJob>,
    max_tracked: usize,
}

impl ServerHandler {
    pub fn new(server_name: ServerName, store: Arc<dyn QueueStore>) -> Self {
        ServerHandler {
            server_name,
            store,
            tracked: DashMap::new(),
            max_tracked: DEFAULT_MAX_TRACKED_JOBS,
        }
    }

    /// Limit the number of jobs tracked at once
    pub fn with_max_tracked(mut self, max_tracked: usize) -> Self {
        self.max_tracked = max_tracked;
        self
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn server_name(&self) -> &str {
        self.server_name.as_str()
    }

    /// Current tracking record for a job
    pub fn tracked(&self, job_id: &str) -> Option<TrackedJob> {
        self.tracked.get(job_id).map(|entry| entry.value().clone())
    }

    fn local_host(&self) -> &str {
        let name = self.server_name.as_str();
        name.rsplit_once(':').map_or(name, |(host, _)| host)
    }

    /// Destinations with no server, or naming this server's host
    fn is_local(&self, destination: &Destination) -> bool {
        destination
            .host()
            .map_or(true, |host| host == self.local_host())
    }

    fn track_job(&self, req: TrackJob) -> BatchReply {
        let record = TrackedJob {
            location: req.location,
            state: req.state,
            hop_count: req.hop_count,
        };

        // len() locks every shard, so it must not run while an entry is held
        if !self.tracked.contains_key(req.job_id.as_str())
            && self.tracked.len() >= self.max_tracked
        {
            warn!(
                "Tracking table full ({} jobs), not tracking {}",
                self.max_tracked, req.job_id
            );
            return BatchReply::error_text(
                ReplyCode::ResourceUnavailable,
                "job tracking table is full",
            );
        }

        match self.tracked.entry(req.job_id.into_inner()) {
            Entry::Occupied(mut entry) => {
                if entry.get().hop_count > record.hop_count {
                    debug!(
                        "Ignoring stale location for {} (hop {} < {})",
                        entry.key(),
                        record.hop_count,
                        entry.get().hop_count
                    );
                } else {
                    debug!("Job {} now at {}", entry.key(), record.location);
                    entry.insert(record);
                }
            }
            Entry::Vacant(entry) => {
                debug!("Tracking job {} at {}", entry.key(), record.location);
                entry.insert(record);
            }
        }

        BatchReply::null()
    }

    fn locate_job(&self, req: JobRequest) -> BatchReply {
        match self.tracked.get(req.job_id.as_str()) {
            Some(entry) => BatchReply::ok(ReplyBody::Locate(entry.location.clone())),
            None => BatchReply::error(ReplyCode::UnknownJob),
        }
    }

    fn delete_job(&self, req: JobRequest) -> BatchReply {
        match self.tracked.remove(req.job_id.as_str()) {
            Some(_) => {
                info!("Stopped tracking job {}", req.job_id);
                BatchReply::null()
            }
            None => BatchReply::error(ReplyCode::UnknownJob),
        }
    }

    fn signal_job(&self, req: SignalJob) -> BatchReply {
        if self.tracked.contains_key(req.job_id.as_str()) {
            debug!("Signal {} for job {}", req.signal, req.job_id);
            BatchReply::null()
        } else {
            BatchReply::error(ReplyCode::UnknownJob)
        }
    }

    fn move_job(&self, req: MoveJob) -> StoreResult<BatchReply> {
        if !self.tracked.contains_key(req.job_id.as_str()) {
            return Ok(BatchReply::error(ReplyCode::UnknownJob));
        }

        let destination = match parse_destination(req.destination.as_str()) {
            Ok(destination) => destination,
            Err(e) => return Ok(BatchReply::error_text(ReplyCode::BadDestination, e.to_string())),
        };
        if destination.queue().is_empty() {
            return Ok(BatchReply::error_text(
                ReplyCode::BadDestination,
                "destination names no queue",
            ));
        }
        if let Err(e) = destination.port() {
            return Ok(BatchReply::error_text(ReplyCode::BadDestination, e.to_string()));
        }

        if self.is_local(&destination) && self.store.load(destination.queue())?.is_none() {
            return Ok(BatchReply::error(ReplyCode::UnknownQueue));
        }

        let location = match destination.server() {
            Some(_) => destination.to_string(),
            None => format!("{}@{}", destination.queue(), self.server_name),
        };
        let Ok(location) = DestinationText::new(location) else {
            return Ok(BatchReply::error(ReplyCode::BadDestination));
        };

        match self.tracked.get_mut(req.job_id.as_str()) {
            Some(mut entry) => {
                info!("Moved job {} to {}", req.job_id, location);
                entry.location = location;
                Ok(BatchReply::null())
            }
            None => Ok(BatchReply::error(ReplyCode::UnknownJob)),
        }
    }

    fn manage(&self, req: Manage) -> StoreResult<BatchReply> {
        if req.object_type != ObjectType::Queue {
            return Ok(BatchReply::error_text(
                ReplyCode::UnsupportedOperation,
                format!("manager requests on {:?} objects are not supported", req.object_type),
            ));
        }

        let name = req.object_name.as_str();
        match req.command {
            ManagerCommand::Create => self.create_queue(name, &req.attributes),
            ManagerCommand::Delete => self.delete_queue(name),
            ManagerCommand::Set => self.set_queue_attributes(name, &req.attributes),
            ManagerCommand::Unset => self.unset_queue_attributes(name, &req.attributes),
            ManagerCommand::List | ManagerCommand::Print => Ok(BatchReply::error_text(
                ReplyCode::UnsupportedOperation,
                format!("manager command {:?} is not supported", req.command),
            )),
        }
    }

    fn create_queue(&self, name: &str, attributes: &[Attribute]) -> StoreResult<BatchReply> {
        let queue_name = match QueueName::new(name) {
            Ok(queue_name) if !queue_name.is_empty() => queue_name,
            Ok(_) => return Ok(BatchReply::error_text(ReplyCode::UnknownQueue, "empty queue name")),
            Err(e) => return Ok(BatchReply::error_text(ReplyCode::UnknownQueue, e.to_string())),
        };

        let mut queue = QueueRecord::new(queue_name, self.server_name.clone(), QueueType::Execution);
        for attribute in attributes {
            if attribute.name == QUEUE_TYPE_ATTR {
                match QueueType::parse(&attribute.value) {
                    Some(queue_type) => queue.queue_type = queue_type,
                    None => return Ok(bad_queue_type(&attribute.value)),
                }
            } else {
                queue.upsert_attribute(stored_attribute(attribute));
            }
        }

        match self.store.insert(&queue) {
            Ok(()) => {
                info!("Created {} queue {}", queue.queue_type.as_str(), name);
                Ok(BatchReply::null())
            }
            Err(PersistenceError::AlreadyExists(_)) => Ok(BatchReply::error(ReplyCode::QueueExists)),
            Err(e) => Err(e),
        }
    }

    fn delete_queue(&self, name: &str) -> StoreResult<BatchReply> {
        match self.store.delete(name)? {
            DeleteOutcome::Deleted => {
                info!("Deleted queue {}", name);
                Ok(BatchReply::null())
            }
            DeleteOutcome::NotFound => Ok(BatchReply::error(ReplyCode::UnknownQueue)),
        }
    }

    fn set_queue_attributes(&self, name: &str, attributes: &[Attribute]) -> StoreResult<BatchReply> {
        let Some(mut queue) = self.store.load(name)? else {
            return Ok(BatchReply::error(ReplyCode::UnknownQueue));
        };

        // Validate before writing anything; the last queue_type given wins
        let mut queue_type = queue.queue_type;
        for attribute in attributes.iter().filter(|a| a.name == QUEUE_TYPE_ATTR) {
            match QueueType::parse(&attribute.value) {
                Some(parsed) => queue_type = parsed,
                None => return Ok(bad_queue_type(&attribute.value)),
            }
        }

        if queue_type != queue.queue_type {
            queue.queue_type = queue_type;
            if self.store.update(&queue)? == UpdateOutcome::NotFound {
                return Ok(BatchReply::error(ReplyCode::UnknownQueue));
            }
        }

        for attribute in attributes.iter().filter(|a| a.name != QUEUE_TYPE_ATTR) {
            if self.store.set_attribute(name, stored_attribute(attribute))? == UpdateOutcome::NotFound
            {
                return Ok(BatchReply::error(ReplyCode::UnknownQueue));
            }
        }

        debug!("Set {} attributes on queue {}", attributes.len(), name);
        Ok(BatchReply::null())
    }

    fn unset_queue_attributes(
        &self,
        name: &str,
        attributes: &[Attribute],
    ) -> StoreResult<BatchReply> {
        if self.store.load(name)?.is_none() {
            return Ok(BatchReply::error(ReplyCode::UnknownQueue));
        }

        for attribute in attributes {
            if attribute.name == QUEUE_TYPE_ATTR {
                return Ok(BatchReply::error_text(
                    ReplyCode::UnknownAttribute,
                    "queue_type cannot be unset",
                ));
            }
            let outcome =
                self.store
                    .delete_attribute(name, &attribute.name, attribute.resource.as_deref())?;
            if outcome == DeleteOutcome::NotFound {
                debug!("Attribute {} was not set on queue {}", attribute.name, name);
            }
        }

        Ok(BatchReply::null())
    }

    fn status_queue(&self, req: StatusQueue) -> StoreResult<BatchReply> {
        let destination = match parse_destination(req.id.as_str()) {
            Ok(destination) => destination,
            Err(e) => return Ok(BatchReply::error_text(ReplyCode::UnknownQueue, e.to_string())),
        };
        if !self.is_local(&destination) {
            return Ok(BatchReply::error_text(
                ReplyCode::UnknownQueue,
                format!("{} is not served here", destination.server.as_str()),
            ));
        }
        let name = destination.queue();

        let queues: Vec<QueueRecord> = if name.is_empty() {
            self.store
                .find(&QueueFilter::all())?
                .take(MAX_STATUS_ENTRIES)
                .collect()
        } else {
            match self.store.load(name)? {
                Some(queue) => vec![queue],
                None => return Ok(BatchReply::error(ReplyCode::UnknownQueue)),
            }
        };

        let entries = queues
            .iter()
            .map(|queue| status_entry(queue, &req.attributes))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(BatchReply::ok(ReplyBody::Status(entries)))
    }
}

fn bad_queue_type(value: &str) -> BatchReply {
    BatchReply::error_text(
        ReplyCode::UnknownAttribute,
        format!("unknown queue type {:?}", value),
    )
}

fn stored_attribute(attribute: &Attribute) -> QueueAttribute {
    QueueAttribute::new(
        attribute.name.clone(),
        attribute.resource.clone(),
        attribute.value.clone(),
    )
}

/// Status of one queue, limited to the requested attribute names when any are given
fn status_entry(queue: &QueueRecord, requested: &[Attribute]) -> StoreResult<StatusEntry> {
    let wanted = |name: &str| requested.is_empty() || requested.iter().any(|a| a.name == name);

    let mut attributes = Vec::new();
    if wanted(QUEUE_TYPE_ATTR) {
        attributes.push(Attribute::set(QUEUE_TYPE_ATTR, queue.queue_type.as_str()));
    }
    for stored in queue.attributes.iter().filter(|a| wanted(&a.name)) {
        attributes.push(Attribute {
            name: stored.name.clone(),
            resource: stored.resource.clone(),
            value: stored.value.clone(),
            op: AttrOp::Set,
        });
    }

    let name = ObjectName::new(queue.name.as_str())
        .map_err(|e| PersistenceError::Other(e.to_string()))?;

    Ok(StatusEntry {
        object_type: ObjectType::Queue,
        name,
        attributes,
    })
}

#[async_trait]
impl BatchHandler for ServerHandler {
    async fn handle(&self, request: BatchRequest) -> BatchReply {
        let request_type = request.request_type();
        debug!("Handling {} from {}", request_type.as_str(), request.header.user);

        let result = match request.body {
            RequestBody::Connect | RequestBody::Disconnect => Ok(BatchReply::null()),
            RequestBody::TrackJob(req) => Ok(self.track_job(req)),
            RequestBody::LocateJob(req) => Ok(self.locate_job(req)),
            RequestBody::DeleteJob(req) => Ok(self.delete_job(req)),
            RequestBody::SignalJob(req) => Ok(self.signal_job(req)),
            RequestBody::MoveJob(req) => self.move_job(req),
            RequestBody::Manager(req) => self.manage(req),
            RequestBody::StatusQueue(req) => self.status_queue(req),
        };

        match result {
            Ok(reply) => {
                if !reply.is_ok() {
                    warn!("{} rejected with code {}", request_type.as_str(), reply.code);
                }
                reply
            }
            Err(e) => {
                error!("Store error handling {}: {}", request_type.as_str(), e);
                BatchReply::error_text(ReplyCode::Internal, e.to_string())
            }
        }
    }
}
