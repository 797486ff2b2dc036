use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;

use serde_json::Deserializer;
use tracing::{debug, error};

use crate::command::{dispatch, Request};
use crate::engine::Database;
use crate::thread_pool::ThreadPool;
use crate::Result;

/// The TCP front of the store. It listens for newline-framed JSON request
/// envelopes on a socket address and serves each connection on a thread from
/// the pool, dispatching every envelope into the shared [`Database`] engine.
///
/// A connection persists until the client closes it or an I/O error occurs;
/// work already accepted by the engine is unaffected by either.
pub struct TcpServer<P: ThreadPool> {
    db: Arc<Database>,
    pool: P,
}

impl<P: ThreadPool> TcpServer<P> {
    /// Create a new `TcpServer` over a running engine and a connection pool.
    pub fn new(db: Arc<Database>, pool: P) -> Self {
        TcpServer { db, pool }
    }

    /// Starts the server listening on the given address. Each connection is
    /// serviced on its own thread from the pool.
    ///
    /// # Errors
    /// Returns an error if the listener could not be bound.
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> Result<()> {
        let listener = TcpListener::bind(addr)?;
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let db = Arc::clone(&self.db);
                    self.pool.spawn(move || {
                        if let Err(e) = serve(db, stream) {
                            error!("error serving client: {}", e);
                        }
                    });
                }
                Err(e) => error!("connection failed: {}", e),
            }
        }
        Ok(())
    }
}

/// Reads request envelopes off the given `tcp` stream until EOF, dispatching
/// each into the engine and writing the newline-terminated response back.
fn serve(db: Arc<Database>, tcp: TcpStream) -> Result<()> {
    let peer_addr = tcp.peer_addr()?;
    let stream_reader = BufReader::new(&tcp);
    let mut stream_writer = BufWriter::new(&tcp);
    let requests = Deserializer::from_reader(stream_reader).into_iter::<Request>();

    for request in requests {
        let request = request?;
        debug!("request from {}: {:?}", peer_addr, request);

        let response = dispatch(&db, request);
        serde_json::to_writer(&mut stream_writer, &response)?;
        stream_writer.write_all(b"\n")?;
        stream_writer.flush()?;
        debug!("response sent to {}: {:?}", peer_addr, response);
    }
    Ok(())
}
