//! CLI argument definitions

use chatrelay::server::{DEFAULT_OUTBOUND_BUFFER, DEFAULT_PORT};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(about = "WebSocket chat relay", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0", env = "RELAY_BIND")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "RELAY_PORT")]
    pub port: u16,

    /// Directory uploaded files are written to
    #[arg(long, default_value = "uploads", env = "RELAY_UPLOAD_DIR")]
    pub upload_dir: PathBuf,

    /// Messages queued per connection before sends to it are dropped
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_BUFFER, value_parser = parse_buffer, env = "RELAY_OUTBOUND_BUFFER")]
    pub outbound_buffer: usize,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

fn parse_buffer(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("outbound buffer must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("Invalid buffer size '{}': {}", s, e)),
    }
}
