//! The delete pipeline: queue -> staging set -> owning-shard rewrites.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::tick;
use crossbeam::select;
use tracing::{debug, error};

use super::shard::ShardMap;
use super::Database;
use crate::error::Result;
use crate::path;

/// fallback flush period when the staging set stays below the batch threshold
const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Starts one more delete worker. Used at startup and by the autoscaler.
pub(crate) fn spawn_worker(db: &Arc<Database>) {
    let id = db.workers.delete.load(Ordering::SeqCst);
    let spawned = thread::Builder::new().name(format!("delete-worker-{}", id)).spawn({
        let db = Arc::clone(db);
        move || run(db)
    });
    match spawned {
        Ok(_) => {
            db.workers.delete.fetch_add(1, Ordering::SeqCst);
        }
        Err(e) => error!("failed to spawn delete worker: {}", e),
    }
}

fn run(db: Arc<Database>) {
    let ticker = tick(FLUSH_INTERVAL);
    loop {
        select! {
            recv(db.delete_queue.rx) -> task => {
                let Ok(task) = task else { break };
                let full = {
                    let mut staging = db.delete_staging.lock();
                    staging.insert(task.key);
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
    debug!("delete worker exiting, queue closed");
}

fn flush(db: &Database) {
    let keys = {
        let mut staging = db.delete_staging.lock();
        if staging.is_empty() {
            return;
        }
        std::mem::take(&mut *staging)
    };
    batch_delete(db, keys);
}

fn batch_delete(db: &Database, keys: HashSet<String>) {
    {
        let mut state = db.state.lock();
        let mut by_file: HashMap<String, Vec<String>> = HashMap::new();
        for key in &keys {
            if let Some(file) = state.lookup(path::root_key(key)) {
                by_file.entry(file.to_string()).or_default().push(key.clone());
            }
        }

        // the data mutex stays held across the rewrites: a delete must not
        // interleave with a save flush targeting the same files
        for (file, paths) in &by_file {
            if let Err(e) = rewrite_without(db, &mut state, file, paths) {
                error!("error deleting batch from {}: {}", file, e);
            }
        }
    }

    for key in &keys {
        db.cache.invalidate(key);
    }
}

/// Rewrites one shard file with `paths` removed. Root keys whose whole
/// subtree vanished are dropped from the shard map as well.
fn rewrite_without(
    db: &Database,
    state: &mut ShardMap,
    file: &str,
    paths: &[String],
) -> Result<()> {
    let file_path = db.shard_path(file);
    let bytes = match fs::read(&file_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let mut doc = db.codec.decode(&bytes)?;

    for key in paths {
        path::nested_remove(&mut doc, key);
    }
    for key in paths {
        let root = path::root_key(key);
        if !doc.contains_key(root) {
            state.forget(root, file);
        }
    }

    let bytes = db.codec.encode(&doc)?;
    fs::write(&file_path, bytes)?;
    Ok(())
}
