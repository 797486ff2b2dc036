//! The save pipeline: queue -> staging map -> per-file batched appends.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::tick;
use crossbeam::select;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error};

use super::Database;
use crate::codec::Document;
use crate::error::Result;
use crate::path;

/// fallback flush period when the staging map stays below the batch threshold
const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Starts one more save worker. Used at startup and by the autoscaler.
pub(crate) fn spawn_worker(db: &Arc<Database>) {
    let id = db.workers.save.load(Ordering::SeqCst);
    let spawned = thread::Builder::new().name(format!("save-worker-{}", id)).spawn({
        let db = Arc::clone(db);
        move || run(db)
    });
    match spawned {
        Ok(_) => {
            db.workers.save.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => error!("failed to spawn save worker: {}", e),
    }
}

fn run(db: Arc<Database>) {
    let ticker = tick(FLUSH_INTERVAL);
    loop {
        select! {
            recv(db.save_queue.rx) -> task => {
                let Ok(task) = task else { break };
                let full = {
                    let mut staging = db.save_staging.lock();
                    staging.insert(task.key, task.value);
                    staging.len() >= db.config.batch_size
                };
                if full {
                    flush(&db);
                }
            }
            recv(ticker) -> _tick => {
                flush(&db);
            }
        }
    }
    debug!("save worker exiting, queue closed");
}

/// Drains the staging map and writes the batch out. A no-op when the staging
/// map is empty, which is the common case for the fallback tick.
fn flush(db: &Database) {
    let batch = {
        let mut staging = db.save_staging.lock();
        if staging.is_empty() {
            return;
        }
        std::mem::take(&mut *staging)
    };
    batch_save(db, batch);
}

fn batch_save(db: &Database, batch: HashMap<String, Value>) {
    // shard assignment and grouping happen under the data mutex, and the
    // mutex stays held across the fan-out: two flushes can never write the
    // same shard file concurrently
    let mut state = db.state.lock();
    let mut by_file: HashMap<String, Vec<(String, Value)>> = HashMap::new();
    for (key, value) in batch {
        let file = state.assign(path::root_key(&key));
        by_file.entry(file).or_default().push((key, value));
    }

    let failed: Mutex<Vec<(String, Value)>> = Mutex::new(Vec::new());
    {
        let failed = &failed;
        db.io_pool.scope(|scope| {
            for (file, records) in &by_file {
                scope.spawn(move |_| match append_to_file(db, file, records) {
                    Ok(()) => {
                        for (key, value) in records {
                            db.cache.put_incoming(key, value.clone());
                        }
                    }
                    Err(e) => {
                        error!("error appending to file {}: {}", file, e);
                        failed.lock().extend(records.iter().cloned());
                    }
                });
            }
        });
    }
    drop(state);

    // failed records go back to staging so the batch is retried on the next
    // tick; a value staged again in the meantime wins
    let failed = failed.into_inner();
    if !failed.is_empty() {
        let mut staging = db.save_staging.lock();
        for (key, value) in failed {
            staging.entry(key).or_insert(value);
        }
    }
}

/// Merges `records` into one shard file under their full dotted paths and
/// rewrites it. A record whose path conflicts with a non-object intermediate
/// is dropped with an error; the rest of the batch still lands.
fn append_to_file(db: &Database, file: &str, records: &[(String, Value)]) -> Result<()> {
    let file_path = db.shard_path(file);
    let mut doc = match fs::read(&file_path) {
        Ok(bytes) => db.codec.decode(&bytes)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Document::new(),
        Err(e) => return Err(e.into()),
    };

    for (key, value) in records {
        if let Err(e) = path::nested_set(&mut doc, key, value.clone()) {
            error!("dropping record at '{}': {}", key, e);
        }
    }

    let bytes = db.codec.encode(&doc)?;
    fs::write(&file_path, bytes)?;
    Ok(())
}
