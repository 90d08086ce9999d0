//! Command drivers for the peer binary
//!
//! Each CLI command maps to one async function here; the binary only parses
//! arguments, installs logging and prints results.

use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::block_source::{FsBlockSource, SourceError};
use crate::config::{Config, InspectCommand, RespondCommand};
use crate::connection::StreamConnection;
use crate::message::Message;
use crate::protocol::{ProtocolError, ProtocolVersion};
use crate::responder::{Responder, ResponderError, ResponseSummary};
use crate::telemetry::{Telemetry, TelemetryConfig, TelemetryError};
use crate::wire::{BlockPresenceType, WantType};

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid base64 input: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Responder(#[from] ResponderError),

    #[error("Block source error: {0}")]
    Source(#[from] SourceError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub cid: String,
    pub priority: i32,
    pub cancel: bool,
    pub want_type: &'static str,
    pub send_dont_have: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    pub prefix: Option<String>,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceSummary {
    pub cid: String,
    #[serde(rename = "type")]
    pub presence: &'static str,
}

/// Human readable view of a decoded message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub protocol: String,
    pub full: bool,
    pub entries: Vec<EntrySummary>,
    pub blocks: Vec<BlockSummary>,
    pub presences: Vec<PresenceSummary>,
    pub pending_bytes: i32,
    pub estimated_size: usize,
}

impl MessageSummary {
    pub fn new(message: &Message, protocol: ProtocolVersion) -> Self {
        Self {
            protocol: protocol.to_string(),
            full: message.wantlist().full,
            entries: message
                .wantlist()
                .entries
                .iter()
                .map(|e| EntrySummary {
                    cid: e.cid().to_string(),
                    priority: e.priority().get(),
                    cancel: e.cancel(),
                    want_type: match e.want_type() {
                        WantType::Block => "block",
                        WantType::Have => "have",
                    },
                    send_dont_have: e.send_dont_have(),
                })
                .collect(),
            blocks: message
                .blocks()
                .iter()
                .map(|b| BlockSummary {
                    prefix: b.prefix().map(|p| STANDARD.encode(p)),
                    size: b.data().len(),
                })
                .collect(),
            presences: message
                .block_presences()
                .iter()
                .map(|p| PresenceSummary {
                    cid: p.cid().to_string(),
                    presence: match p.presence() {
                        BlockPresenceType::Have => "have",
                        BlockPresenceType::DontHave => "dont_have",
                    },
                })
                .collect(),
            pending_bytes: message.pending_bytes(),
            estimated_size: message.size(),
        }
    }
}

/// Read an encoded message, optionally stored as base64 text.
pub async fn read_input(path: &Path, base64: bool) -> Result<Vec<u8>, RuntimeError> {
    let raw = tokio::fs::read(path).await?;
    if !base64 {
        return Ok(raw);
    }
    let text = String::from_utf8_lossy(&raw);
    Ok(STANDARD.decode(text.trim())?)
}

pub async fn run_inspect(cmd: &InspectCommand) -> Result<MessageSummary, RuntimeError> {
    let encoded = read_input(&cmd.input, cmd.base64).await?;
    let message = Message::decode(&encoded, cmd.protocol)?;
    Ok(MessageSummary::new(&message, cmd.protocol))
}

pub async fn run_respond(
    config: &Config,
    cmd: &RespondCommand,
) -> Result<ResponseSummary, RuntimeError> {
    let encoded = read_input(&cmd.input, cmd.base64).await?;
    let source = FsBlockSource::open(&config.blocks_dir).await?;

    let telemetry = match &config.telemetry_file {
        Some(path) => Telemetry::new(TelemetryConfig::load_from_file(path)?),
        None => Telemetry::default(),
    };

    let responder = Responder::new(Arc::new(source), telemetry)
        .with_max_message_size(config.max_message_size);

    let output = tokio::fs::File::create(&cmd.output).await?;
    let connection = StreamConnection::new(output);
    let summary = responder.handle(&encoded, cmd.protocol, &connection).await?;

    if let Some(path) = &cmd.metrics_out {
        tokio::fs::write(path, responder.telemetry().export()).await?;
    }

    info!(
        "Answered {} entries with {} messages to {:?}",
        summary.entries, summary.messages, cmd.output
    );
    Ok(summary)
}
