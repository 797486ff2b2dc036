//! The worker autoscaler: queue pressure grows each pipeline's worker pool.
//!
//! Capacity is only ever added. There is no cap, no cooldown and no
//! scale-down: a store that has seen sustained pressure keeps the workers it
//! grew, and queue backpressure bounds how much work can pile up in front of
//! them.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::tick;
use tracing::{debug, error};

use super::{add, delete, read, save, Database};

pub(crate) fn spawn_autoscaler(db: &Arc<Database>) {
    let spawned = thread::Builder::new().name("autoscaler".to_string()).spawn({
        let db = Arc::clone(db);
        move || run(db)
    });
    if let Err(e) = spawned {
        error!("failed to spawn autoscaler: {}", e);
    }
}

fn run(db: Arc<Database>) {
    let ticker = tick(db.config.scale_interval());
    let threshold = db.config.asqs_config.queue_threshold;

    while ticker.recv().is_ok() {
        let save_len = db.save_queue.rx.len();
        let delete_len = db.delete_queue.rx.len();
        let read_len = db.read_queue.rx.len();
        let add_len = db.add_queue.rx.len();

        if save_len > threshold {
            save::spawn_worker(&db);
        }
        if delete_len > threshold {
            delete::spawn_worker(&db);
        }
        if read_len > threshold {
            read::spawn_worker(&db);
        }
        if add_len > threshold {
            add::spawn_worker(&db);
        }

        debug!(
            save_len,
            save_workers = db.workers.save.load(Ordering::SeqCst),
            add_len,
            add_workers = db.workers.add.load(Ordering::SeqCst),
            delete_len,
            delete_workers = db.workers.delete.load(Ordering::SeqCst),
            read_len,
            read_workers = db.workers.read.load(Ordering::SeqCst),
            "queue pressure sample"
        );
    }
}
