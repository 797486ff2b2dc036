//! The pathdb-client executable talks to a running server over the TCP wire:
//!
//! `pathdb-client set <PATH> <VALUE> [--addr IP-PORT]`
//!
//!     Save a JSON value at a dotted path. VALUE is parsed as JSON; anything
//!     that does not parse is sent as a plain string.
//!
//! `pathdb-client get <PATH> [--addr IP-PORT]`
//!
//!     Read the value at a dotted path. An empty PATH prints the whole
//!     store view.
//!
//! `pathdb-client add <PATH> <VALUE> [--addr IP-PORT]`
//!
//!     Shallow-merge a JSON object into the value at a dotted path.
//!
//! `pathdb-client rm <PATH> [--addr IP-PORT]`
//!
//!     Delete the value at a dotted path.

use std::net::SocketAddr;
use std::process::exit;

use clap::{crate_version, App, Arg, ArgMatches, SubCommand};
use pathdb::{Client, DbError, Request, Result};
use serde_json::Value;

const DEFAULT_ADDRESS: &str = "127.0.0.1:5431";

/// [`Opt`] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    /// the server's ip:port
    addr: SocketAddr,
    req: Request,
}

impl Opt {
    /// validates the `addr` parameter is a valid IP address and PORT
    fn build(addr: &str, req: Request) -> Result<Opt> {
        let addr: SocketAddr = addr.parse().map_err(|_| {
            DbError::Parsing(format!("could not parse {} into an IP address and port", &addr))
        })?;
        Ok(Opt { addr, req })
    }
}

fn main() {
    let matches = App::new("pathdb-client")
        .version(crate_version!())
        .about("client for a multi-threaded, file-backed JSON document store")
        .subcommands(vec![
            SubCommand::with_name("set")
                .about("Save a JSON value at a dotted path")
                .arg(Arg::with_name("PATH").required(true).index(1))
                .arg(Arg::with_name("VALUE").required(true).index(2)),
            SubCommand::with_name("get")
                .about("Read the value at a dotted path")
                .arg(Arg::with_name("PATH").required(true).index(1)),
            SubCommand::with_name("add")
                .about("Shallow-merge a JSON object into the value at a dotted path")
                .arg(Arg::with_name("PATH").required(true).index(1))
                .arg(Arg::with_name("VALUE").required(true).index(2)),
            SubCommand::with_name("rm")
                .about("Delete the value at a dotted path")
                .arg(Arg::with_name("PATH").required(true).index(1)),
        ])
        .arg(
            Arg::with_name("addr")
                .long("addr")
                .value_name("IP_ADDR:PORT")
                .help("sets the IP_ADDR:PORT of the server to connect to")
                .default_value(DEFAULT_ADDRESS),
        )
        .get_matches();

    let result = parse_options(matches).and_then(run);
    if let Err(e) = result {
        eprintln!("{}", e);
        exit(1);
    }
}

/// runs the parsed request against the server
fn run(opt: Opt) -> Result<()> {
    let mut client = Client::connect(opt.addr)?;
    match opt.req {
        Request {
            action: Some(action),
            path: Some(path),
            data,
        } => match (action.as_str(), data) {
            ("save", Some(value)) => client.set(&path, value),
            ("add", Some(value)) => client.add(&path, value),
            ("delete", _) => client.delete(&path),
            ("read", _) => {
                match client.get(&path)? {
                    Some(value) => println!("{}", value),
                    None => println!("Data not found"),
                }
                Ok(())
            }
            _ => Err(DbError::InvalidRequest("malformed request".to_string())),
        },
        _ => Err(DbError::InvalidRequest("malformed request".to_string())),
    }
}

/// parses the matches from the command line into an [`Opt`] struct
fn parse_options(matches: ArgMatches) -> Result<Opt> {
    let addr = matches.value_of("addr").unwrap();
    match matches.subcommand() {
        ("set", Some(args)) => {
            let path = args.value_of("PATH").map(String::from).unwrap();
            let value = parse_value(args.value_of("VALUE").unwrap());
            Opt::build(addr, Request::save(path, value))
        }
        ("get", Some(args)) => {
            let path = args.value_of("PATH").map(String::from).unwrap();
            Opt::build(addr, Request::read(path))
        }
        ("add", Some(args)) => {
            let path = args.value_of("PATH").map(String::from).unwrap();
            let value = parse_value(args.value_of("VALUE").unwrap());
            Opt::build(addr, Request::add(path, value))
        }
        ("rm", Some(args)) => {
            let path = args.value_of("PATH").map(String::from).unwrap();
            Opt::build(addr, Request::delete(path))
        }
        _ => Err(DbError::InvalidRequest(
            "expected one of: set, get, add, rm".to_string(),
        )),
    }
}

/// VALUE arguments are JSON; bare words fall back to a plain string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
