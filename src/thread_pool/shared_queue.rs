use std::thread;

use crossbeam::channel;
use crossbeam::channel::{Receiver, Sender};
use tracing::{debug, error};

use super::ThreadPool;
use crate::Result;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A thread pool draining jobs off one shared MPMC channel.
///
/// The sending half lives in the pool handle; every pool thread holds a clone
/// of the receiving half and runs whatever connection job arrives next. A
/// thread that panics while serving a connection is replaced, so one bad
/// connection cannot shrink the pool.
pub struct SharedQueueThreadPool {
    tx: Sender<Job>,
}

impl ThreadPool for SharedQueueThreadPool {
    fn new(threads: u32) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<Job>();
        for _ in 0..threads {
            let receiver = JobReceiver(rx.clone());
            thread::Builder::new().spawn(move || run_jobs(receiver))?;
        }
        Ok(SharedQueueThreadPool { tx })
    }

    /// Spawns a job onto the pool.
    ///
    /// # Panics
    /// Panics if every pool thread has died and the channel is closed.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .expect("there are no threads in the pool");
    }
}

/// The receiving half held by each pool thread. Its `Drop` impl respawns a
/// replacement thread when the current one is unwinding from a panic.
#[derive(Clone)]
struct JobReceiver(Receiver<Job>);

impl Drop for JobReceiver {
    fn drop(&mut self) {
        if thread::panicking() {
            debug!("pool thread panicked, starting a replacement");
            let receiver = self.clone();
            if let Err(e) = thread::Builder::new().spawn(move || run_jobs(receiver)) {
                error!("failed to spawn a replacement thread: {}", e);
            }
        }
    }
}

/// Waits for jobs on the wrapped receiver and runs them until the channel
/// closes.
fn run_jobs(rx: JobReceiver) {
    loop {
        match rx.0.recv() {
            Ok(job) => job(),
            Err(_) => {
                debug!("pool thread exiting, the thread pool was dropped");
                break;
            }
        }
    }
}
