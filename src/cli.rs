// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `procdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procdag",
    version,
    about = "Supervise services and run task DAGs behind a JSON control API.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Procdag.toml` in the current working directory. A missing
    /// file is not an error; built-in defaults apply.
    #[arg(long, value_name = "PATH", default_value = "Procdag.toml")]
    pub config: String,

    /// Bind address for the control API (overrides the config file).
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Bind port for the control API (overrides the config file).
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
