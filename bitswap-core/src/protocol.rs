//! Bitswap protocol generations and codec errors
//!
//! Three wire generations are negotiated per connection. They share one
//! protobuf schema (see [`crate::wire`]) but differ in which fields they
//! carry and in how CIDs are written.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const BITSWAP_V100: &str = "/ipfs/bitswap/1.0.0";
pub const BITSWAP_V110: &str = "/ipfs/bitswap/1.1.0";
pub const BITSWAP_V120: &str = "/ipfs/bitswap/1.2.0";

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed wire message: {0}")]
    MalformedWire(String),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl From<prost::DecodeError> for ProtocolError {
    fn from(e: prost::DecodeError) -> Self {
        ProtocolError::MalformedWire(e.to_string())
    }
}

impl From<cid::Error> for ProtocolError {
    fn from(e: cid::Error) -> Self {
        ProtocolError::MalformedWire(format!("invalid CID bytes: {}", e))
    }
}

/// A negotiated Bitswap wire generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolVersion {
    /// `/ipfs/bitswap/1.0.0`: raw blocks, CIDv0 only, no presences.
    V100,
    /// `/ipfs/bitswap/1.1.0`: prefixed blocks, presences, pending bytes.
    V110,
    /// `/ipfs/bitswap/1.2.0`: adds want-have and send-dont-have.
    V120,
}

impl ProtocolVersion {
    /// Offer order, newest first.
    pub const ALL: [ProtocolVersion; 3] = [
        ProtocolVersion::V120,
        ProtocolVersion::V110,
        ProtocolVersion::V100,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolVersion::V100 => BITSWAP_V100,
            ProtocolVersion::V110 => BITSWAP_V110,
            ProtocolVersion::V120 => BITSWAP_V120,
        }
    }

    /// Only the newest generation can say "don't have".
    pub fn supports_dont_have(self) -> bool {
        self == ProtocolVersion::V120
    }

    /// Pick the newest generation a peer offers, if any.
    pub fn negotiate<'a, I>(offered: I) -> Option<ProtocolVersion>
    where
        I: IntoIterator<Item = &'a str>,
    {
        offered
            .into_iter()
            .filter_map(|id| id.parse::<ProtocolVersion>().ok())
            .max()
    }
}

impl FromStr for ProtocolVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            BITSWAP_V100 => Ok(ProtocolVersion::V100),
            BITSWAP_V110 => Ok(ProtocolVersion::V110),
            BITSWAP_V120 => Ok(ProtocolVersion::V120),
            other => Err(ProtocolError::UnsupportedVersion(other.to_string())),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
