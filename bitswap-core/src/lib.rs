//! Bitswap Core
//!
//! Message codec for the three Bitswap wire generations, CID handling,
//! size-bounded response packing and a block-source driven responder.

pub mod block;
pub mod block_source;
pub mod cid_util;
pub mod config;
pub mod connection;
pub mod entry;
pub mod message;
pub mod protocol;
pub mod responder;
pub mod response;
pub mod runtime;
pub mod telemetry;
pub mod wire;

pub use block::{Block, BlockPresence};
pub use block_source::{BlockSource, FsBlockSource, MemoryBlockSource, SourceError, SourceStats};
pub use cid_util::{cid_to_key, decode_cid, sha256_cid, to_v0, varint_encode};
pub use config::{Cli, Commands, Config, ConfigError};
pub use connection::{read_frame, Connection, SendContext, StreamConnection, MAX_FRAME_SIZE};
pub use entry::{Entry, Priority, WantList, MAX_PRIORITY};
pub use message::{
    Message, EMPTY_MESSAGE_OVERHEAD, NEW_BLOCK_OVERHEAD, NEW_PRESENCE_OVERHEAD,
    NON_EMPTY_MESSAGE_OVERHEAD,
};
pub use protocol::{ProtocolError, ProtocolVersion, BITSWAP_V100, BITSWAP_V110, BITSWAP_V120};
pub use responder::{Responder, ResponderError, ResponseSummary};
pub use response::{respond, Candidate, Resolution, Response};
pub use runtime::{run_inspect, run_respond, MessageSummary, RuntimeError};
pub use telemetry::{Telemetry, TelemetryConfig, TelemetryError};
pub use wire::{BlockPresenceType, WantType};

// Re-export Cid for external use
pub use cid::Cid;
