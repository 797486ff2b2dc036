//! Thread pools for serving client connections.
use crate::Result;

/// A pool of threads that client-connection jobs can be spawned onto.
pub trait ThreadPool {
    /// creates a pool holding `threads` threads
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// Spawns a job onto the pool.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}

mod shared_queue;

pub use self::shared_queue::SharedQueueThreadPool;
