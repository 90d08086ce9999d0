//! Response items: block payloads and presence answers

use bytes::Bytes;
use cid::Cid;
use prost::Message as _;

use crate::cid_util::{block_prefix, decode_cid};
use crate::protocol::{ProtocolError, ProtocolVersion};
use crate::wire::{BlockPresenceType, RawBlock, RawBlockPresence};

/// Block content plus its CID prefix.
///
/// `prefix` is `None` only for blocks received over 1.0.0, which carries
/// bare data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    prefix: Option<Vec<u8>>,
    data: Bytes,
}

impl Block {
    /// Build a block for `cid`, deriving the prefix from it.
    pub fn from_cid(cid: &Cid, data: impl Into<Bytes>) -> Self {
        Self {
            prefix: Some(block_prefix(cid)),
            data: data.into(),
        }
    }

    /// Build a block from an already encoded prefix.
    pub fn from_prefix(prefix: Vec<u8>, data: impl Into<Bytes>) -> Self {
        Self {
            prefix: Some(prefix),
            data: data.into(),
        }
    }

    /// A block with no prefix, as carried by 1.0.0.
    pub fn raw(data: impl Into<Bytes>) -> Self {
        Self {
            prefix: None,
            data: data.into(),
        }
    }

    pub fn prefix(&self) -> Option<&[u8]> {
        self.prefix.as_deref()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn decode(raw: &RawBlock) -> Self {
        Self {
            prefix: raw.prefix.clone(),
            data: raw.data.clone().unwrap_or_default(),
        }
    }

    pub fn serialize(&self) -> RawBlock {
        RawBlock {
            prefix: self.prefix.clone(),
            data: Some(self.data.clone()),
        }
    }

    /// Encode as it appears on the wire for `protocol`: bare data for
    /// 1.0.0, a prefixed sub-message otherwise.
    pub fn encode(&self, protocol: ProtocolVersion) -> Vec<u8> {
        match protocol {
            ProtocolVersion::V100 => self.data.to_vec(),
            ProtocolVersion::V110 | ProtocolVersion::V120 => self.serialize().encode_to_vec(),
        }
    }
}

/// "Have" or "don't have" for a CID, without payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockPresence {
    cid: Cid,
    presence: BlockPresenceType,
}

impl BlockPresence {
    pub fn new(cid: Cid, presence: BlockPresenceType) -> Self {
        Self { cid, presence }
    }

    pub fn have(cid: Cid) -> Self {
        Self::new(cid, BlockPresenceType::Have)
    }

    pub fn dont_have(cid: Cid) -> Self {
        Self::new(cid, BlockPresenceType::DontHave)
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn presence(&self) -> BlockPresenceType {
        self.presence
    }

    /// Unknown presence values on the wire read as `Have`.
    pub fn decode(raw: &RawBlockPresence) -> Result<Self, ProtocolError> {
        Ok(Self {
            cid: decode_cid(&raw.cid)?,
            presence: raw.r#type(),
        })
    }

    pub fn serialize(&self) -> RawBlockPresence {
        RawBlockPresence {
            cid: self.cid.to_bytes(),
            r#type: Some(self.presence as i32),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.serialize().encode_to_vec()
    }
}
