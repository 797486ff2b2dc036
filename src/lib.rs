//! # pathdb
//! A multi-threaded, file-backed store for hierarchical ("dotted-path") JSON
//! documents, served over HTTP and a line-delimited JSON TCP protocol.
//!
//! Values are addressed by dotted paths like `users.alice.age`; the first
//! segment picks the shard file, the rest walk nested objects. Saves, adds
//! and deletes are acknowledged at enqueue time and flushed to disk in
//! batches; reads are batched too and coalesced per shard file. A
//! time-bounded cache fronts all of it, and the worker pools behind the four
//! queues grow automatically under sustained pressure.

pub mod cache;
pub mod codec;
pub mod command;
pub mod config;
pub mod engine;
pub mod http;
pub mod path;
pub mod thread_pool;

mod client;
mod error;
mod server;

pub use client::Client;
pub use command::{dispatch, Request, Response};
pub use config::Config;
pub use engine::Database;
pub use error::{DbError, Result};
pub use server::TcpServer;
