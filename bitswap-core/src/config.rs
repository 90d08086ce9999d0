//! Configuration management for the Bitswap peer
//!
//! Handles CLI argument parsing, config file loading, and defaults.

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::connection::MAX_FRAME_SIZE;
use crate::protocol::{ProtocolVersion, BITSWAP_V120};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Parser, Debug)]
#[command(name = "bitswap-peer")]
#[command(about = "Bitswap message codec and responder", long_about = None)]
#[command(version)]
pub struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Multi-line human readable log output
    #[arg(long, global = true)]
    pub log_pretty: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Decode a message and print a JSON summary
    Inspect(InspectCommand),
    /// Answer a message from a block directory
    Respond(RespondCommand),
}

#[derive(Args, Debug, Clone)]
pub struct InspectCommand {
    /// Encoded message file
    pub input: PathBuf,

    /// Protocol the message was received on
    #[arg(long, default_value = BITSWAP_V120, value_parser = ProtocolVersion::from_str)]
    pub protocol: ProtocolVersion,

    /// Input file holds base64 text instead of raw bytes
    #[arg(long)]
    pub base64: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RespondCommand {
    /// Encoded inbound message file
    pub input: PathBuf,

    /// File receiving the length-prefixed response frames
    #[arg(long)]
    pub output: PathBuf,

    /// Directory holding one file per block
    #[arg(long)]
    pub blocks_dir: Option<PathBuf>,

    /// Protocol the message was received on
    #[arg(long, default_value = BITSWAP_V120, value_parser = ProtocolVersion::from_str)]
    pub protocol: ProtocolVersion,

    /// Input file holds base64 text instead of raw bytes
    #[arg(long)]
    pub base64: bool,

    /// Upper bound on each outgoing message, in bytes
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Write Prometheus metrics here when done
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub log_pretty: bool,
    pub max_message_size: usize,
    pub blocks_dir: PathBuf,
    pub telemetry_file: Option<PathBuf>,
}

impl Config {
    /// Parse the process arguments into a config and the command to run
    pub fn from_cli() -> Result<(Self, Commands), ConfigError> {
        Self::resolve(Cli::parse())
    }

    /// Build the effective config: file (or defaults), then CLI overrides
    pub fn resolve(cli: Cli) -> Result<(Self, Commands), ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };

        if let Some(level) = cli.log_level {
            config.log_level = level;
        }
        if cli.log_pretty {
            config.log_pretty = true;
        }
        if let Commands::Respond(cmd) = &cli.command {
            if let Some(dir) = &cmd.blocks_dir {
                config.blocks_dir = dir.clone();
            }
            if let Some(size) = cmd.max_message_size {
                config.max_message_size = size;
            }
        }

        config.validate()?;
        Ok((config, cli.command))
    }

    /// Load config from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid(
                "max_message_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            log_pretty: false,
            max_message_size: MAX_FRAME_SIZE,
            blocks_dir: PathBuf::from("./blocks"),
            telemetry_file: None,
        }
    }
}
