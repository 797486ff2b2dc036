//! this binary starts the pathdb server (HTTP + TCP listeners over one engine)
//! to see the list of options, type: `pathdb-server --help`

use std::path::Path;
use std::process::exit;
use std::sync::Arc;
use std::thread;

use clap::{crate_version, App, Arg};
use pathdb::thread_pool::{SharedQueueThreadPool, ThreadPool};
use pathdb::{http, Config, Database, Result, TcpServer};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_CONFIG: &str = "database_config.json";

fn main() {
    // set up a tracing subscriber to log to STDERR
    subscriber_config();

    // parse command line args
    let matches = App::new("pathdb-server")
        .version(crate_version!())
        .about("a multi-threaded, file-backed store for dotted-path JSON documents")
        .arg(
            Arg::with_name("config")
                .long("config")
                .value_name("FILE")
                .help("path to the JSON configuration file; created with defaults if missing")
                .default_value(DEFAULT_CONFIG),
        )
        .arg(
            Arg::with_name("dir")
                .long("dir")
                .value_name("DIR")
                .help("base directory that holds the db/ data directory")
                .default_value("."),
        )
        .get_matches();

    let config_path = matches.value_of("config").unwrap();
    let dir = matches.value_of("dir").unwrap();

    if let Err(e) = run(config_path, dir) {
        eprintln!("{:?}", e);
        exit(1);
    }
}

fn run(config_path: &str, dir: &str) -> Result<()> {
    let config = Config::load_or_create(Path::new(config_path))?;
    info!("pathdb-server {}", env!("CARGO_PKG_VERSION"));
    info!("codec: {}", if config.use_bson { "bson" } else { "json" });

    let db = Database::open(dir, config.clone())?;

    // the TCP listener gets its own thread; connections are served from a pool
    let tcp_db = Arc::clone(&db);
    let tcp_port = config.tcp_port;
    let threads = thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(4);
    let pool = SharedQueueThreadPool::new(threads)?;
    thread::Builder::new()
        .name("tcp-listener".to_string())
        .spawn(move || {
            info!("TCP server listening on port {}", tcp_port);
            let server = TcpServer::new(tcp_db, pool);
            if let Err(e) = server.run(("0.0.0.0", tcp_port)) {
                error!("TCP server failed: {:?}", e);
            }
        })?;

    // HTTP serves on a tokio runtime from the main thread
    let state = http::AppState::new(db, &config);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(http::serve(state))
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
