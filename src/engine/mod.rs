//! The concurrent request-processing engine.
//!
//! Every client operation becomes a task on one of four bounded queues
//! (save, delete, read, add). Worker threads drain the queues, form batches
//! by size or timer, and touch disk through the shard map. A time-bounded
//! cache sits beside the pipelines: writes publish to it, reads consult it
//! first. An autoscaler watches queue depths and grows each pipeline's
//! worker pool under sustained pressure.

pub mod shard;

mod add;
mod delete;
mod read;
mod save;
mod scale;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::cache::{Cache, SWEEP_INTERVAL};
use crate::codec::{self, Codec};
use crate::config::Config;
use crate::error::{DbError, Result};
use self::shard::ShardMap;

/// upper bound on concurrent shard-file readers/writers, whatever the config says
const MAX_FILE_WRITERS: usize = 10;

pub(crate) struct SaveTask {
    pub key: String,
    pub value: Value,
}

pub(crate) struct DeleteTask {
    pub key: String,
}

pub(crate) struct AddTask {
    pub key: String,
    pub value: Value,
}

/// A queued read carries the one-shot sink its caller is blocked on.
pub(crate) struct ReadTask {
    pub key: String,
    pub response: Sender<ReadResponse>,
}

pub(crate) struct ReadResponse {
    pub value: Option<Value>,
}

/// Both halves of a bounded MPMC channel. Producers block on `tx` when the
/// queue is full; that is the system's backpressure mechanism. The `rx` half
/// is cloned into every worker of the pipeline and sampled by the autoscaler.
pub(crate) struct Queue<T> {
    pub tx: Sender<T>,
    pub rx: Receiver<T>,
}

impl<T> Queue<T> {
    fn with_capacity(cap: usize) -> Self {
        let (tx, rx) = bounded(cap);
        Queue { tx, rx }
    }
}

/// Live worker-thread counts per pipeline, grown by the autoscaler.
#[derive(Default)]
pub(crate) struct WorkerCounts {
    pub save: AtomicUsize,
    pub delete: AtomicUsize,
    pub read: AtomicUsize,
    pub add: AtomicUsize,
}

/// The database engine. One instance per process, shared behind an [`Arc`]
/// between the network listeners and the worker threads it spawns.
pub struct Database {
    pub(crate) dir: PathBuf,
    pub(crate) codec: Box<dyn Codec>,
    pub(crate) cache: Cache,
    /// the main data mutex: guards the shard map and serializes batch flushes
    pub(crate) state: Mutex<ShardMap>,
    pub(crate) save_queue: Queue<SaveTask>,
    pub(crate) delete_queue: Queue<DeleteTask>,
    pub(crate) read_queue: Queue<ReadTask>,
    pub(crate) add_queue: Queue<AddTask>,
    /// save staging map, shared by all save workers
    pub(crate) save_staging: Mutex<HashMap<String, Value>>,
    /// delete staging set, shared by all delete workers
    pub(crate) delete_staging: Mutex<HashSet<String>>,
    /// add buffer, shared by all add workers
    pub(crate) add_buffer: Mutex<Vec<AddTask>>,
    /// reads enqueued since the last poll-period adjustment
    pub(crate) read_requests: AtomicUsize,
    pub(crate) workers: WorkerCounts,
    /// bounded pool performing all shard-file reads and writes
    pub(crate) io_pool: rayon::ThreadPool,
    pub(crate) config: Config,
}

impl Database {
    /// Opens (or creates) the database under `base_dir/db`, rebuilds the
    /// shard map from the files found there, and spawns the worker threads,
    /// the autoscaler and the cache sweeper.
    pub fn open(base_dir: impl AsRef<Path>, config: Config) -> Result<Arc<Database>> {
        let dir = base_dir.as_ref().join("db");
        fs::create_dir_all(&dir)?;

        let codec = codec::for_config(config.use_bson);
        let mut shard_map = ShardMap::new(config.max_keys_per_file, codec.extension());
        shard_map.restore(scan_shard_files(&dir, codec.as_ref())?);

        let io_threads = config.max_io_threads.clamp(1, MAX_FILE_WRITERS);
        let io_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(io_threads)
            .thread_name(|i| format!("db-io-{}", i))
            .build()
            .map_err(|e| DbError::StringErr(format!("could not build file IO pool: {}", e)))?;

        let db = Arc::new(Database {
            dir,
            cache: Cache::new(&config),
            state: Mutex::new(shard_map),
            save_queue: Queue::with_capacity(config.queue_save_size),
            delete_queue: Queue::with_capacity(config.queue_delete_size),
            read_queue: Queue::with_capacity(config.queue_read_size),
            add_queue: Queue::with_capacity(config.queue_add_size),
            save_staging: Mutex::new(HashMap::new()),
            delete_staging: Mutex::new(HashSet::new()),
            add_buffer: Mutex::new(Vec::new()),
            read_requests: AtomicUsize::new(0),
            workers: WorkerCounts::default(),
            io_pool,
            codec,
            config,
        });

        let initial = initial_workers(&db.config);
        for _ in 0..initial {
            save::spawn_worker(&db);
            delete::spawn_worker(&db);
            read::spawn_worker(&db);
            add::spawn_worker(&db);
        }
        info!(workers_per_pipeline = initial, "database engine started");

        if db.config.asqs_config.enable {
            scale::spawn_autoscaler(&db);
        }
        spawn_cache_sweeper(&db);

        Ok(db)
    }

    /// Enqueues `value` to be written at the dotted path `key`. Returns as
    /// soon as the task is accepted; the write lands on disk with the next
    /// save-batch flush. Blocks when the save queue is full.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        if key.is_empty() {
            return Err(DbError::EmptyKey);
        }
        self.save_queue
            .tx
            .send(SaveTask {
                key: key.to_string(),
                value,
            })
            .map_err(|_| DbError::StringErr("save queue is closed".to_string()))
    }

    /// Resolves the value at `key`, consulting the cache first and falling
    /// back to a queued, batched file lookup. An empty key returns the whole
    /// shard-map view without touching the queue.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        if key.is_empty() {
            return Ok(Some(self.view()));
        }
        if let Some(value) = self.cache.get(key) {
            return Ok(Some(value));
        }

        self.read_requests.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = bounded(1);
        self.read_queue
            .tx
            .send(ReadTask {
                key: key.to_string(),
                response: tx,
            })
            .map_err(|_| DbError::StringErr("read queue is closed".to_string()))?;
        let response = rx
            .recv()
            .map_err(|_| DbError::StringErr("read worker dropped the response".to_string()))?;
        Ok(response.value)
    }

    /// Enqueues a shallow merge of `value` (an object) into whatever lives at
    /// `key`. Non-object values are dropped by the add pipeline.
    pub fn add(&self, key: &str, value: Value) -> Result<()> {
        if key.is_empty() {
            return Err(DbError::EmptyKey);
        }
        self.add_queue
            .tx
            .send(AddTask {
                key: key.to_string(),
                value,
            })
            .map_err(|_| DbError::StringErr("add queue is closed".to_string()))
    }

    /// Enqueues removal of the value at the dotted path `key`.
    pub fn delete(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(DbError::EmptyKey);
        }
        self.delete_queue
            .tx
            .send(DeleteTask {
                key: key.to_string(),
            })
            .map_err(|_| DbError::StringErr("delete queue is closed".to_string()))
    }

    /// The diagnostic whole-store view: every known root key mapped to the
    /// shard file holding it.
    pub fn view(&self) -> Value {
        let state = self.state.lock();
        let map: Map<String, Value> = state
            .key_files()
            .iter()
            .map(|(key, file)| (key.clone(), Value::String(file.clone())))
            .collect();
        Value::Object(map)
    }

    pub(crate) fn shard_path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }
}

/// initial worker-thread count per pipeline
fn initial_workers(config: &Config) -> usize {
    let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    (cpus * config.asqs_config.worker_count_multiplier).max(1)
}

/// Reads the top-level keys out of every shard file in `dir`, for rebuilding
/// the shard map at startup. Unreadable files are skipped with a warning so
/// one corrupt shard does not keep the store from coming up.
fn scan_shard_files(dir: &Path, codec: &dyn Codec) -> Result<Vec<(String, Vec<String>)>> {
    let suffix = format!(".{}", codec.extension());
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with("db_file_") || !name.ends_with(&suffix) {
            continue;
        }
        let bytes = fs::read(entry.path())?;
        match codec.decode(&bytes) {
            Ok(doc) => files.push((name, doc.keys().cloned().collect())),
            Err(e) => warn!("skipping unreadable shard file {}: {}", name, e),
        }
    }
    Ok(files)
}

fn spawn_cache_sweeper(db: &Arc<Database>) {
    let db = Arc::clone(db);
    let spawned = thread::Builder::new()
        .name("cache-sweeper".to_string())
        .spawn(move || loop {
            thread::sleep(SWEEP_INTERVAL);
            db.cache.sweep();
        });
    if let Err(e) = spawned {
        error!("failed to spawn cache sweeper: {}", e);
    }
}
