//! Logger module
//!
//! Sets up the `tracing` subscriber and provides the logging helpers the
//! server uses:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Error and warning logging

mod format;

pub use format::AccessLogEntry;

use crate::config::Config;
use std::fs::{File, OpenOptions};
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber
///
/// `RUST_LOG` takes precedence over `logging.level`. Output goes to
/// `logging.log_file` when set, stdout otherwise. Call once at startup.
pub fn init(config: &Config) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match config.logging.log_file.as_deref() {
        Some(path) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(open_log_file(path)?))
            .try_init(),
        None => builder.try_init(),
    };

    installed.map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))
}

/// Open or create a log file for appending
fn open_log_file(path: &str) -> io::Result<File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    info!("======================================");
    info!("Deal export server started");
    info!("Listening on: http://{addr}");
    info!("Log level: {}", config.logging.level);
    if let Some(workers) = config.server.workers {
        info!("Worker threads: {workers}");
    }
    if let Some(ref path) = config.logging.log_file {
        info!("Log file: {path}");
    }
    info!("Dataset directory: {}", config.storage.dataset_path().display());
    info!("User CSV directory: {}", config.storage.user_path().display());
    info!("Temp images directory: {}", config.storage.temp_image_path().display());
    info!("======================================");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    debug!("[Connection] Accepted from: {peer_addr}");
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    error!("[ERROR] Failed to serve connection: {err:?}");
}

pub fn log_error(message: &str) {
    error!("[ERROR] {message}");
}

pub fn log_warning(message: &str) {
    warn!("[WARN] {message}");
}

pub fn log_info(message: &str) {
    info!("{message}");
}

pub fn log_api_request(method: &str, path: &str, status: u16) {
    info!(target: "api", "[API] {method} {path} - {status}");
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    info!(target: "access", "{}", entry.format(format));
}

pub fn log_shutdown(active_connections: usize) {
    info!("[Shutdown] Stopped accepting connections ({active_connections} still active)");
}
