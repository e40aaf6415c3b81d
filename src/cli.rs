//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// OIDC bearer-token guard for HTTP services
#[derive(Parser, Debug)]
#[command(name = "oidc-guard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "OIDC_GUARD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "OIDC_GUARD_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "OIDC_GUARD_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve {
        /// Host to bind to
        #[arg(long, env = "OIDC_GUARD_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "OIDC_GUARD_PORT")]
        port: Option<u16>,
    },

    /// Fetch the discovery document and list the published signing keys
    Discover,

    /// Verify a single token and print the resulting principal
    Verify {
        /// Compact JWT to verify
        #[arg(required = true)]
        token: String,
    },
}
