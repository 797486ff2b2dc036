use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};

use serde::Deserialize;
use serde_json::de::IoRead;
use serde_json::{Deserializer, Value};

use crate::command::{Request, Response};
use crate::error::{DbError, Result};

/// A blocking client speaking the newline-framed JSON envelope to a running
/// TCP server.
pub struct Client {
    reader: Deserializer<IoRead<BufReader<TcpStream>>>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    /// creates a client and establishes a socket connection to the server at
    /// the given `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let tcp_reader = TcpStream::connect(addr)?;
        let tcp_writer = tcp_reader.try_clone()?;

        Ok(Client {
            reader: Deserializer::from_reader(BufReader::new(tcp_reader)),
            writer: BufWriter::new(tcp_writer),
        })
    }

    /// saves `value` at the dotted path `path` on the server
    pub fn set(&mut self, path: &str, value: Value) -> Result<()> {
        match self.request(Request::save(path, value))? {
            Response::Ok { .. } => Ok(()),
            Response::Err { error } => Err(DbError::StringErr(error)),
        }
    }

    /// gets the value at the dotted path `path` from the server
    /// ## Returns
    /// `Ok(Some(value))` if the path resolved, `Ok(None)` if it did not
    pub fn get(&mut self, path: &str) -> Result<Option<Value>> {
        match self.request(Request::read(path))? {
            Response::Ok { data, .. } => Ok(data),
            Response::Err { error } if error == "data not found" => Ok(None),
            Response::Err { error } => Err(DbError::StringErr(error)),
        }
    }

    /// shallow-merges the object `value` into whatever lives at `path`
    pub fn add(&mut self, path: &str, value: Value) -> Result<()> {
        match self.request(Request::add(path, value))? {
            Response::Ok { .. } => Ok(()),
            Response::Err { error } => Err(DbError::StringErr(error)),
        }
    }

    /// deletes the value at the dotted path `path`
    pub fn delete(&mut self, path: &str) -> Result<()> {
        match self.request(Request::delete(path))? {
            Response::Ok { .. } => Ok(()),
            Response::Err { error } => Err(DbError::StringErr(error)),
        }
    }

    /// writes one newline-terminated envelope and reads one response back
    fn request(&mut self, request: Request) -> Result<Response> {
        serde_json::to_writer(&mut self.writer, &request)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(Response::deserialize(&mut self.reader)?)
    }
}
