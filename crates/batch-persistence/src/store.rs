use crate::{PersistenceError, QueueAttribute, QueueRecord, QueueType, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of an update that targets an existing row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
}

/// Result of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Selection applied by [`QueueStore::find`]. An empty filter matches every queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueFilter {
    pub server_name: Option<String>,
    pub queue_type: Option<QueueType>,
}

impl QueueFilter {
    pub fn all() -> Self {
        QueueFilter::default()
    }

    pub fn matches(&self, queue: &QueueRecord) -> bool {
        if let Some(server) = &self.server_name {
            if queue.server_name.as_str() != server {
                return false;
            }
        }
        if let Some(queue_type) = self.queue_type {
            if queue.queue_type != queue_type {
                return false;
            }
        }
        true
    }
}

/// Rows produced by a find, in creation order.
///
/// The cursor owns its rows, so it stays valid while the store is modified.
#[derive(Debug)]
pub struct QueueCursor {
    rows: std::vec::IntoIter<QueueRecord>,
}

impl QueueCursor {
    pub fn new(mut rows: Vec<QueueRecord>) -> Self {
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.as_str().cmp(b.name.as_str()))
        });
        QueueCursor {
            rows: rows.into_iter(),
        }
    }

    /// Rows not yet returned
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for QueueCursor {
    type Item = QueueRecord;

    fn next(&mut self) -> Option<QueueRecord> {
        self.rows.next()
    }
}

/// Storage for queue definitions
pub trait QueueStore: Send + Sync {
    /// Store a new queue, failing with `AlreadyExists` if the name is taken
    fn insert(&self, queue: &QueueRecord) -> Result<()>;

    /// Replace an existing queue row; attributes are stored as given
    fn update(&self, queue: &QueueRecord) -> Result<UpdateOutcome>;

    fn load(&self, name: &str) -> Result<Option<QueueRecord>>;

    fn find(&self, filter: &QueueFilter) -> Result<QueueCursor>;

    fn delete(&self, name: &str) -> Result<DeleteOutcome>;

    /// Insert or replace one attribute of a queue
    fn set_attribute(&self, queue: &str, attribute: QueueAttribute) -> Result<UpdateOutcome>;

    fn delete_attribute(
        &self,
        queue: &str,
        name: &str,
        resource: Option<&str>,
    ) -> Result<DeleteOutcome>;
}

/// Configuration for the queue store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: PathBuf::from("./data"),
        }
    }
}

const CF_QUEUES: &str = "queues";

/// Queue store backed by RocksDB, keyed by queue name
pub struct RocksQueueStore {
    db: Arc<DB>,
    // Serializes read-modify-write sequences
    write_lock: Mutex<()>,
}

impl RocksQueueStore {
    pub fn open(config: StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let db_path = config.data_dir.join("queues");

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(CF_QUEUES, Options::default())];

        let db = DB::open_cf_descriptors(&db_opts, db_path, cf_descriptors)?;

        info!("Opened queue store at {:?}", config.data_dir);

        Ok(RocksQueueStore {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn queues_cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_QUEUES)
            .ok_or_else(|| PersistenceError::Other("Queues CF not found".to_string()))
    }

    fn get(&self, name: &str) -> Result<Option<QueueRecord>> {
        let cf = self.queues_cf()?;
        match self.db.get_cf(cf, name.as_bytes())? {
            Some(value) => Ok(Some(QueueRecord::from_bytes(&value)?)),
            None => Ok(None),
        }
    }

    fn put(&self, queue: &QueueRecord) -> Result<()> {
        let cf = self.queues_cf()?;
        self.db
            .put_cf(cf, queue.name.as_str().as_bytes(), queue.to_bytes()?)?;
        Ok(())
    }

    /// Number of stored queues
    pub fn count(&self) -> Result<usize> {
        let cf = self.queues_cf()?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

impl QueueStore for RocksQueueStore {
    fn insert(&self, queue: &QueueRecord) -> Result<()> {
        let _guard = self.write_lock.lock();

        if self.get(queue.name.as_str())?.is_some() {
            return Err(PersistenceError::AlreadyExists(queue.name.to_string()));
        }

        let now = Utc::now();
        let mut row = queue.clone();
        row.created_at = now;
        row.modified_at = now;
        self.put(&row)?;

        debug!("Inserted queue {}", row.name);
        Ok(())
    }

    fn update(&self, queue: &QueueRecord) -> Result<UpdateOutcome> {
        let _guard = self.write_lock.lock();

        let Some(existing) = self.get(queue.name.as_str())? else {
            return Ok(UpdateOutcome::NotFound);
        };

        let mut row = queue.clone();
        row.created_at = existing.created_at;
        row.modified_at = Utc::now();
        self.put(&row)?;

        debug!("Updated queue {}", row.name);
        Ok(UpdateOutcome::Updated)
    }

    fn load(&self, name: &str) -> Result<Option<QueueRecord>> {
        self.get(name)
    }

    fn find(&self, filter: &QueueFilter) -> Result<QueueCursor> {
        let cf = self.queues_cf()?;

        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            let queue = QueueRecord::from_bytes(&value)?;
            if filter.matches(&queue) {
                rows.push(queue);
            }
        }

        debug!("Find matched {} queues", rows.len());
        Ok(QueueCursor::new(rows))
    }

    fn delete(&self, name: &str) -> Result<DeleteOutcome> {
        let _guard = self.write_lock.lock();

        if self.get(name)?.is_none() {
            return Ok(DeleteOutcome::NotFound);
        }

        let cf = self.queues_cf()?;
        self.db.delete_cf(cf, name.as_bytes())?;

        debug!("Deleted queue {}", name);
        Ok(DeleteOutcome::Deleted)
    }

    fn set_attribute(&self, queue: &str, attribute: QueueAttribute) -> Result<UpdateOutcome> {
        let _guard = self.write_lock.lock();

        let Some(mut row) = self.get(queue)? else {
            return Ok(UpdateOutcome::NotFound);
        };

        row.upsert_attribute(attribute);
        row.modified_at = Utc::now();
        self.put(&row)?;
        Ok(UpdateOutcome::Updated)
    }

    fn delete_attribute(
        &self,
        queue: &str,
        name: &str,
        resource: Option<&str>,
    ) -> Result<DeleteOutcome> {
        let _guard = self.write_lock.lock();

        let Some(mut row) = self.get(queue)? else {
            return Ok(DeleteOutcome::NotFound);
        };

        if !row.remove_attribute(name, resource) {
            return Ok(DeleteOutcome::NotFound);
        }

        row.modified_at = Utc::now();
        self.put(&row)?;
        Ok(DeleteOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_core::{QueueName, ServerName};
    use std::time::Duration;
    use tempfile::TempDir;

    fn open_store(temp_dir: &TempDir) -> RocksQueueStore {
        let config = StoreConfig {
            data_dir: temp_dir.path().to_path_buf(),
        };
        RocksQueueStore::open(config).unwrap()
    }

    fn queue(name: &str, server: &str, queue_type: QueueType) -> QueueRecord {
        QueueRecord::new(
            QueueName::new(name).unwrap(),
            ServerName::new(server).unwrap(),
            queue_type,
        )
    }

    #[test]
    fn test_insert_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        let mut workq = queue("workq", "headnode", QueueType::Execution);
        workq.upsert_attribute(QueueAttribute::new("max_run", None, "10"));
        store.insert(&workq).unwrap();

        let loaded = store.load("workq").unwrap().unwrap();
        assert_eq!(loaded.name.as_str(), "workq");
        assert_eq!(loaded.queue_type, QueueType::Execution);
        assert_eq!(loaded.attribute("max_run", None).unwrap().value, "10");
        assert_eq!(loaded.created_at, loaded.modified_at);

        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        let workq = queue("workq", "headnode", QueueType::Execution);
        store.insert(&workq).unwrap();

        let result = store.insert(&workq);
        assert!(matches!(result, Err(PersistenceError::AlreadyExists(name)) if name == "workq"));
    }

    #[test]
    fn test_update_keeps_created_at() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        store
            .insert(&queue("workq", "headnode", QueueType::Execution))
            .unwrap();
        let created = store.load("workq").unwrap().unwrap().created_at;

        std::thread::sleep(Duration::from_millis(2));

        let mut changed = queue("workq", "headnode", QueueType::Route);
        changed.upsert_attribute(QueueAttribute::new("route_destinations", None, "batch@remote"));
        assert_eq!(store.update(&changed).unwrap(), UpdateOutcome::Updated);

        let loaded = store.load("workq").unwrap().unwrap();
        assert_eq!(loaded.queue_type, QueueType::Route);
        assert_eq!(loaded.created_at, created);
        assert!(loaded.modified_at > created);
        assert_eq!(loaded.attributes.len(), 1);

        let missing = queue("other", "headnode", QueueType::Route);
        assert_eq!(store.update(&missing).unwrap(), UpdateOutcome::NotFound);
    }

    #[test]
    fn test_find_orders_by_creation() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        for name in ["zeta", "alpha", "mid"] {
            store
                .insert(&queue(name, "headnode", QueueType::Execution))
                .unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }
        store
            .insert(&queue("routeq", "gateway", QueueType::Route))
            .unwrap();

        let names: Vec<String> = store
            .find(&QueueFilter::all())
            .unwrap()
            .map(|q| q.name.to_string())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid", "routeq"]);

        let filter = QueueFilter {
            server_name: Some("headnode".to_string()),
            queue_type: None,
        };
        let mut cursor = store.find(&filter).unwrap();
        assert_eq!(cursor.remaining(), 3);
        assert_eq!(cursor.next().unwrap().name.as_str(), "zeta");
        assert_eq!(cursor.remaining(), 2);

        let routes = store
            .find(&QueueFilter {
                server_name: None,
                queue_type: Some(QueueType::Route),
            })
            .unwrap();
        assert_eq!(routes.count(), 1);
    }

    #[test]
    fn test_cursor_survives_concurrent_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        store.insert(&queue("a", "headnode", QueueType::Execution)).unwrap();
        store.insert(&queue("b", "headnode", QueueType::Execution)).unwrap();

        let cursor = store.find(&QueueFilter::all()).unwrap();
        assert_eq!(store.delete("a").unwrap(), DeleteOutcome::Deleted);
        assert_eq!(cursor.count(), 2);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        store
            .insert(&queue("workq", "headnode", QueueType::Execution))
            .unwrap();
        assert_eq!(store.delete("workq").unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.delete("workq").unwrap(), DeleteOutcome::NotFound);
        assert!(store.load("workq").unwrap().is_none());
    }

    #[test]
    fn test_set_and_delete_attribute() {
        let temp_dir = TempDir::new().unwrap();
        let store = open_store(&temp_dir);

        store
            .insert(&queue("workq", "headnode", QueueType::Execution))
            .unwrap();

        let ncpus = QueueAttribute::new("resources_max", Some("ncpus".to_string()), "4");
        assert_eq!(store.set_attribute("workq", ncpus).unwrap(), UpdateOutcome::Updated);
        let ncpus = QueueAttribute::new("resources_max", Some("ncpus".to_string()), "8");
        assert_eq!(store.set_attribute("workq", ncpus).unwrap(), UpdateOutcome::Updated);

        let loaded = store.load("workq").unwrap().unwrap();
        assert_eq!(loaded.attributes.len(), 1);
        assert_eq!(loaded.attributes[0].value, "8");

        assert_eq!(
            store.delete_attribute("workq", "resources_max", None).unwrap(),
            DeleteOutcome::NotFound
        );
        assert_eq!(
            store
                .delete_attribute("workq", "resources_max", Some("ncpus"))
                .unwrap(),
            DeleteOutcome::Deleted
        );
        assert!(store.load("workq").unwrap().unwrap().attributes.is_empty());

        let orphan = QueueAttribute::new("max_run", None, "1");
        assert_eq!(store.set_attribute("nope", orphan).unwrap(), UpdateOutcome::NotFound);
        assert_eq!(
            store.delete_attribute("nope", "max_run", None).unwrap(),
            DeleteOutcome::NotFound
        );
    }

    #[test]
    fn test_reopen_persists() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = open_store(&temp_dir);
            store
                .insert(&queue("workq", "headnode", QueueType::Execution))
                .unwrap();
        }

        let store = open_store(&temp_dir);
        assert!(store.load("workq").unwrap().is_some());
    }

    #[test]
    fn test_store_is_shareable() {
        let temp_dir = TempDir::new().unwrap();
        let store: Arc<dyn QueueStore> = Arc::new(open_store(&temp_dir));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let name = format!("q{}", i);
                    store
                        .insert(&queue(&name, "headnode", QueueType::Execution))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.find(&QueueFilter::all()).unwrap().count(), 4);
    }
}
