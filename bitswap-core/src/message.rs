//! Bitswap message envelope
//!
//! A [`Message`] is built for one exchange turn, filled through [`Message::push`]
//! and consumed by [`Message::send`]. It keeps a running estimate of its
//! encoded size so a responder can pack items up to a byte budget without
//! re-encoding after every addition.
//!
//! # Size accounting
//!
//! The overheads below are worst-case figures for the 1.2.0 schema, which
//! has the largest framing of the three generations, and are applied to
//! every generation:
//!
//! - non-empty message: 2 bytes of field keys for the embedded messages plus
//!   4 x 2 bytes of length varints at messages up to 4 MiB;
//! - new block: 1 byte message key, 1 byte prefix key, 4 bytes of data
//!   length varint at 4 MiB, 4 bytes of CID prefix;
//! - new presence: message key, CID key, type key, type value, 1 byte each.
//!
//! An empty message is 6 bytes on the wire; with the non-empty overhead
//! that gives the starting estimate of 16.

use tracing::debug;

use crate::block::{Block, BlockPresence};
use crate::connection::{Connection, SendContext};
use crate::entry::WantList;
use crate::protocol::{ProtocolError, ProtocolVersion};
use crate::response::{respond, Candidate, Response};
use crate::wire::RawMessage;
use prost::Message as _;

pub const NON_EMPTY_MESSAGE_OVERHEAD: usize = 2 + 8;
pub const NEW_BLOCK_OVERHEAD: usize = 1 + 1 + 4 + 4;
pub const NEW_PRESENCE_OVERHEAD: usize = 1 + 1 + 1 + 1;
pub const EMPTY_MESSAGE_OVERHEAD: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    wantlist: WantList,
    blocks: Vec<Block>,
    block_presences: Vec<BlockPresence>,
    pending_bytes: i32,
    blocks_size: usize,
}

impl Message {
    pub fn new(
        wantlist: WantList,
        blocks: Vec<Block>,
        block_presences: Vec<BlockPresence>,
        pending_bytes: i32,
    ) -> Self {
        let mut message = Self {
            wantlist,
            blocks,
            block_presences,
            pending_bytes,
            blocks_size: EMPTY_MESSAGE_OVERHEAD,
        };

        if !message.is_empty() {
            message.blocks_size = message.serialize(ProtocolVersion::V120).encoded_len()
                + NON_EMPTY_MESSAGE_OVERHEAD;
        }
        message
    }

    pub fn wantlist(&self) -> &WantList {
        &self.wantlist
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_presences(&self) -> &[BlockPresence] {
        &self.block_presences
    }

    pub fn pending_bytes(&self) -> i32 {
        self.pending_bytes
    }

    /// True when there are no entries, blocks or presences.
    pub fn is_empty(&self) -> bool {
        self.wantlist.is_empty() && !self.has_responses()
    }

    /// True when there is at least one block or presence to send.
    pub fn has_responses(&self) -> bool {
        !self.blocks.is_empty() || !self.block_presences.is_empty()
    }

    pub fn decode(encoded: &[u8], protocol: ProtocolVersion) -> Result<Self, ProtocolError> {
        let raw = RawMessage::decode(encoded)?;
        let raw_wantlist = raw.wantlist.clone().unwrap_or_default();
        let wantlist = WantList::decode(&raw_wantlist, protocol)?;

        let message = match protocol {
            ProtocolVersion::V100 => Message::new(
                wantlist,
                raw.blocks.iter().cloned().map(Block::raw).collect(),
                Vec::new(),
                0,
            ),
            ProtocolVersion::V110 | ProtocolVersion::V120 => Message::new(
                wantlist,
                raw.payload.iter().map(Block::decode).collect(),
                raw.block_presences
                    .iter()
                    .map(BlockPresence::decode)
                    .collect::<Result<Vec<_>, _>>()?,
                raw.pending_bytes(),
            ),
        };

        debug!(
            "Decoded {} message of {} bytes: {} entries, {} blocks, {} presences",
            protocol,
            encoded.len(),
            message.wantlist.len(),
            message.blocks.len(),
            message.block_presences.len()
        );
        Ok(message)
    }

    pub fn serialize(&self, protocol: ProtocolVersion) -> RawMessage {
        let wantlist = Some(self.wantlist.serialize(protocol));

        match protocol {
            ProtocolVersion::V100 => RawMessage {
                wantlist,
                blocks: self.blocks.iter().map(|b| b.data().clone()).collect(),
                ..Default::default()
            },
            ProtocolVersion::V110 | ProtocolVersion::V120 => RawMessage {
                wantlist,
                blocks: Vec::new(),
                payload: self.blocks.iter().map(Block::serialize).collect(),
                block_presences: self
                    .block_presences
                    .iter()
                    .map(BlockPresence::serialize)
                    .collect(),
                pending_bytes: Some(self.pending_bytes),
            },
        }
    }

    pub fn encode(&self, protocol: ProtocolVersion) -> Vec<u8> {
        self.serialize(protocol).encode_to_vec()
    }

    /// Append the response `candidate` calls for, if any.
    ///
    /// `size` is the caller's estimate of the item's payload, normally
    /// [`Response::payload_size`]. Raw data or CID lengths leave out the
    /// length prefixes and undercount once items grow. Returns whether
    /// anything was appended.
    pub fn push(&mut self, candidate: &Candidate, size: usize, protocol: ProtocolVersion) -> bool {
        match respond(candidate, protocol) {
            Some(response) => {
                self.append(response, size);
                true
            }
            None => false,
        }
    }

    /// Append an already decided response item.
    pub fn append(&mut self, response: Response, size: usize) {
        self.blocks_size += response.overhead() + size;
        match response {
            Response::Block(block) => self.blocks.push(block),
            Response::Presence(presence) => self.block_presences.push(presence),
        }
    }

    /// Whether appending `response` keeps the estimate within `limit`.
    pub fn fits(&self, response: &Response, size: usize, limit: usize) -> bool {
        self.blocks_size + response.overhead() + size <= limit
    }

    /// Running upper-bound estimate of the encoded size.
    pub fn size(&self) -> usize {
        self.blocks_size
    }

    /// Encode with the negotiated protocol and transmit.
    ///
    /// Messages without blocks or presences are not sent; want-list only
    /// traffic goes out through another path. Returns whether anything was
    /// transmitted.
    pub async fn send<C>(self, context: &SendContext<'_, C>) -> Result<bool, ProtocolError>
    where
        C: Connection + ?Sized,
    {
        if !self.has_responses() {
            return Ok(false);
        }

        let encoded = self.encode(context.protocol);
        debug!(
            "Sending {} message: {} blocks, {} presences, {} bytes (estimated {})",
            context.protocol,
            self.blocks.len(),
            self.block_presences.len(),
            encoded.len(),
            self.blocks_size
        );
        context.connection.send(encoded).await?;
        Ok(true)
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new(WantList::default(), Vec::new(), Vec::new(), 0)
    }
}
