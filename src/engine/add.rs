//! The add pipeline: queue -> buffer -> merge-with-existing -> save queue.
//!
//! Add is a shallow merge into the object at `key`: the incoming object's
//! top-level fields overwrite the existing object's. The merged whole is
//! re-enqueued as an ordinary save, so the dotted-path nesting happens in the
//! save pipeline's append step, never here.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::tick;
use crossbeam::select;
use serde_json::{Map, Value};
use tracing::{debug, error};

use super::{AddTask, Database};

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Starts one more add worker. Used at startup and by the autoscaler.
pub(crate) fn spawn_worker(db: &Arc<Database>) {
    let id = db.workers.add.load(Ordering::SeqCst);
    let spawned = thread::Builder::new().name(format!("add-worker-{}", id)).spawn({
        let db = Arc::clone(db);
        move || run(db)
    });
    match spawned {
        Ok(_) => {
            db.workers.add.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => error!("failed to spawn add worker: {}", e),
    }
}

fn run(db: Arc<Database>) {
    let ticker = tick(FLUSH_INTERVAL);
    loop {
        select! {
            recv(db.add_queue.rx) -> task => {
                let Ok(task) = task else { break };
                let full = {
                    let mut buffer = db.add_buffer.lock();
                    buffer.push(task);
                    buffer.len() >= db.config.queue_add_size
                };
                if full {
                    process_buffer(&db);
                }
            }
            recv(ticker) -> _tick => {
                process_buffer(&db);
            }
        }
    }
    debug!("add worker exiting, queue closed");
}

/// Drains up to one batch from the add buffer and merges each task with the
/// value currently stored at its key.
fn process_buffer(db: &Database) {
    let tasks: Vec<AddTask> = {
        let mut buffer = db.add_buffer.lock();
        if buffer.is_empty() {
            return;
        }
        let n = db.config.batch_size.min(buffer.len());
        buffer.drain(..n).collect()
    };

    for task in tasks {
        // only object values merge; anything else is dropped
        let fields = match task.value {
            Value::Object(map) => map,
            _ => continue,
        };

        let mut merged = existing_object(db, &task.key).unwrap_or_default();
        for (field, value) in fields {
            merged.insert(field, value);
        }
        if let Err(e) = db.set(&task.key, Value::Object(merged)) {
            error!("error re-queueing merged value for '{}': {}", task.key, e);
        }
    }
}

/// The object currently stored at `key`: cache first, then a read-pipeline
/// lookup. A missing or non-object value merges as if nothing existed.
fn existing_object(db: &Database, key: &str) -> Option<Map<String, Value>> {
    let existing = match db.cache.get(key) {
        Some(value) => Some(value),
        None => db.get(key).ok().flatten(),
    };
    match existing {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}
