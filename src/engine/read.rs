//! The read pipeline: adaptive batching plus per-file coalesced lookups.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{tick, Receiver};
use crossbeam::select;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error};

use super::{Database, ReadResponse, ReadTask};
use crate::error::DbError;
use crate::path;

/// a full batch is processed immediately instead of waiting for the tick
const BATCH_LIMIT: usize = 100;

/// Starts one more read worker. Used at startup and by the autoscaler.
pub(crate) fn spawn_worker(db: &Arc<Database>) {
    let id = db.workers.read.load(Ordering::SeqCst);
    let spawned = thread::Builder::new().name(format!("read-worker-{}", id)).spawn({
        let db = Arc::clone(db);
        move || run(db)
    });
    match spawned {
        Ok(_) => {
            db.workers.read.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => error!("failed to spawn read worker: {}", e),
    }
}

fn run(db: Arc<Database>) {
    let mut pending: Vec<ReadTask> = Vec::new();
    let mut ticker = tick(Duration::from_millis(100));
    loop {
        select! {
            recv(db.read_queue.rx) -> task => {
                let Ok(task) = task else { break };
                pending.push(task);
                if pending.len() >= BATCH_LIMIT {
                    process_batch(&db, std::mem::take(&mut pending));
                }
            }
            recv(ticker) -> _tick => {
                if !pending.is_empty() {
                    process_batch(&db, std::mem::take(&mut pending));
                }
                ticker = adjusted_ticker(&db);
            }
        }
    }
    debug!("read worker exiting, queue closed");
}

/// Picks the poll period from the request rate observed since the last
/// adjustment: an idle store polls lazily, a busy one stays tight.
fn adjusted_ticker(db: &Database) -> Receiver<Instant> {
    let recent = db.read_requests.swap(0, Ordering::Relaxed);
    let period = match recent {
        0..=9 => Duration::from_millis(500),
        10..=99 => Duration::from_millis(250),
        100..=499 => Duration::from_millis(100),
        _ => Duration::from_millis(10),
    };
    tick(period)
}

fn process_batch(db: &Database, tasks: Vec<ReadTask>) {
    // sample the shard map under the data mutex, then release it before any
    // file IO; keys with an unknown root are misses
    let mut by_file: HashMap<String, Vec<String>> = HashMap::new();
    {
        let state = db.state.lock();
        for task in &tasks {
            if let Some(file) = state.lookup(path::root_key(&task.key)) {
                by_file
                    .entry(file.to_string())
                    .or_default()
                    .push(task.key.clone());
            }
        }
    }

    let results: Mutex<HashMap<String, Value>> = Mutex::new(HashMap::new());
    {
        let results = &results;
        db.io_pool.scope(|scope| {
            for (file, keys) in &by_file {
                scope.spawn(move |_| read_from_file(db, file, keys, results));
            }
        });
    }

    let results = results.into_inner();
    for task in tasks {
        let value = results.get(&task.key).cloned();
        if let Some(v) = &value {
            db.cache.put_outgoing(&task.key, v.clone());
        }
        // the caller may have given up on the response; that is not an error
        let _ = task.response.send(ReadResponse { value });
    }
}

/// Loads and decodes one shard file, resolving every key coalesced onto it.
fn read_from_file(
    db: &Database,
    file: &str,
    keys: &[String],
    results: &Mutex<HashMap<String, Value>>,
) {
    let file_path = db.shard_path(file);
    let doc = match fs::read(&file_path)
        .map_err(DbError::from)
        .and_then(|bytes| db.codec.decode(&bytes))
    {
        Ok(doc) => doc,
        Err(e) => {
            error!("error reading shard file {}: {}", file, e);
            return;
        }
    };

    let mut hits = Vec::new();
    for key in keys {
        if let Some(value) = path::nested_get(&doc, key) {
            hits.push((key.clone(), value.clone()));
        }
    }
    results.lock().extend(hits);
}
