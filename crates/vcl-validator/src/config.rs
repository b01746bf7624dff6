//! Command line and environment configuration
//!
//! Every flag has a `VCL_VALIDATOR_*` environment variable; defaults match
//! the production deployment. The compiler command line is not configurable.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;
use vcl_validator_core::middleware::BodyLimitConfig;
use vcl_validator_core::ServerConfig;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human readable, for local use
    Pretty,
}

#[derive(Debug, Parser)]
#[command(name = "vcl-validator", version, about = "Validate VCL with varnishd over HTTP")]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "VCL_VALIDATOR_LISTEN", default_value = "0.0.0.0:8888")]
    pub listen: SocketAddr,

    /// Runtime worker threads (defaults to the number of CPUs)
    #[arg(long, env = "VCL_VALIDATOR_WORKERS")]
    pub workers: Option<usize>,

    /// Largest accepted VCL body, e.g. "512kb" or "10mb"
    #[arg(long, env = "VCL_VALIDATOR_MAX_BODY_SIZE", default_value = "10mb", value_parser = parse_size)]
    pub max_body_size: usize,

    /// Seconds to keep serving after SIGINT/SIGTERM before closing the listener
    #[arg(long, env = "VCL_VALIDATOR_SHUTDOWN_DELAY_SECS", default_value_t = 3)]
    pub shutdown_delay_secs: u64,

    /// Give up waiting for open connections after this many seconds
    #[arg(long, env = "VCL_VALIDATOR_DRAIN_TIMEOUT_SECS")]
    pub drain_timeout_secs: Option<u64>,

    /// Create placeholder haproxy sockets under /shared/unix-sockets at startup
    #[arg(long, env = "VCL_VALIDATOR_PLACEHOLDER_SOCKETS")]
    pub placeholder_sockets: bool,

    /// Log output format
    #[arg(long, env = "VCL_VALIDATOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

fn parse_size(s: &str) -> Result<usize, String> {
    BodyLimitConfig::parse(s)
        .map(|config| config.max_size)
        .ok_or_else(|| format!("invalid size '{}', expected e.g. 512kb or 10mb", s))
}

impl Cli {
    /// Server settings derived from the flags
    pub fn server_config(&self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            listen: self.listen,
            workers: self.workers.filter(|&n| n > 0).unwrap_or(defaults.workers),
            max_body_size: self.max_body_size,
            shutdown_delay: Duration::from_secs(self.shutdown_delay_secs),
            drain_timeout: self.drain_timeout_secs.map(Duration::from_secs),
            ..defaults
        }
    }
}
