//! Response policy
//!
//! Maps a want-list entry plus what the local store knows about its CID to
//! the item (if any) that goes back to the peer.

use bytes::Bytes;
use cid::Cid;
use prost::Message as _;

use crate::block::{Block, BlockPresence};
use crate::cid_util::cid_to_key;
use crate::entry::Entry;
use crate::message::{NEW_BLOCK_OVERHEAD, NEW_PRESENCE_OVERHEAD};
use crate::protocol::ProtocolVersion;
use crate::wire::WantType;

/// What local lookup found for a CID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Block content was loaded.
    Content(Bytes),
    /// The block exists; content was not loaded.
    Present,
    NotFound,
}

/// A want-list entry together with its local resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub entry: Entry,
    pub resolution: Option<Resolution>,
}

impl Candidate {
    /// An entry that has not been looked up yet.
    pub fn new(entry: Entry) -> Self {
        Self {
            entry,
            resolution: None,
        }
    }

    pub fn resolved(entry: Entry, resolution: Resolution) -> Self {
        Self {
            entry,
            resolution: Some(resolution),
        }
    }

    pub fn cid(&self) -> &Cid {
        self.entry.cid()
    }

    /// Key under which the block source stores this CID.
    pub fn key(&self) -> String {
        cid_to_key(self.entry.cid())
    }
}

/// An item to append to an outgoing message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Block(Block),
    Presence(BlockPresence),
}

impl Response {
    /// Fixed encoding overhead of this item, excluding its payload.
    pub fn overhead(&self) -> usize {
        match self {
            Response::Block(_) => NEW_BLOCK_OVERHEAD,
            Response::Presence(_) => NEW_PRESENCE_OVERHEAD,
        }
    }

    /// Exact bytes this item adds to a 1.1.0 or 1.2.0 message: field tag,
    /// length varint and the embedded sub-message. 1.0.0 carries less.
    pub fn encoded_len(&self) -> usize {
        let embedded = match self {
            Response::Block(block) => {
                let n = block.serialize().encoded_len();
                prost::length_delimiter_len(n) + n
            },
            Response::Presence(presence) => {
                let n = presence.serialize().encoded_len();
                prost::length_delimiter_len(n) + n
            },
        };
        1 + embedded
    }

    /// Payload size to pass to [`Message::fits`] and [`Message::append`] so
    /// that `overhead() + payload_size()` covers the item's real encoding.
    ///
    /// [`Message::fits`]: crate::message::Message::fits
    /// [`Message::append`]: crate::message::Message::append
    pub fn payload_size(&self) -> usize {
        self.encoded_len().saturating_sub(self.overhead())
    }
}

/// Decide what to send back for `candidate`.
///
/// | want  | resolution        | response                          |
/// |-------|-------------------|-----------------------------------|
/// | block | content           | block                             |
/// | have  | content / present | have                              |
/// | any   | not found         | dont-have, if asked for and 1.2.0 |
///
/// Anything else, including cancellations and unresolved entries,
/// produces nothing.
pub fn respond(candidate: &Candidate, protocol: ProtocolVersion) -> Option<Response> {
    let entry = &candidate.entry;
    if entry.cancel() {
        return None;
    }

    match (entry.want_type(), candidate.resolution.as_ref()?) {
        (WantType::Block, Resolution::Content(data)) => {
            Some(Response::Block(Block::from_cid(entry.cid(), data.clone())))
        }
        (WantType::Block, Resolution::Present) => None,
        (WantType::Have, Resolution::Content(_) | Resolution::Present) => {
            Some(Response::Presence(BlockPresence::have(*entry.cid())))
        }
        (_, Resolution::NotFound) => {
            if entry.send_dont_have() && protocol.supports_dont_have() {
                Some(Response::Presence(BlockPresence::dont_have(*entry.cid())))
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::wire::BlockPresenceType;
    use std::str::FromStr;

    fn cid() -> Cid {
        Cid::from_str("bafybeiccfclkdtucu6y4yc5cpr6y3yuinr67svmii46v5cfcrkp47ihehy").unwrap()
    }

    fn candidate(want_type: WantType, send_dont_have: bool, resolution: Resolution) -> Candidate {
        Candidate::resolved(Entry::new(cid(), 1, false, want_type, send_dont_have), resolution)
    }

    fn presence_of(response: Option<Response>) -> Option<BlockPresenceType> {
        match response {
            Some(Response::Presence(p)) => Some(p.presence()),
            _ => None,
        }
    }

    #[test]
    fn test_block_found() {
        let c = candidate(WantType::Block, false, Resolution::Content(Bytes::from_static(b"data")));
        match respond(&c, ProtocolVersion::V100) {
            Some(Response::Block(block)) => {
                assert_eq!(block.data().as_ref(), b"data");
                assert_eq!(block.prefix(), Some(&[0x01, 0x70, 0x12, 0x20][..]));
            }
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_block_not_found() {
        let c = candidate(WantType::Block, true, Resolution::NotFound);
        assert_eq!(presence_of(respond(&c, ProtocolVersion::V120)), Some(BlockPresenceType::DontHave));
        assert_eq!(respond(&c, ProtocolVersion::V110), None);
        assert_eq!(respond(&c, ProtocolVersion::V100), None);

        let c = candidate(WantType::Block, false, Resolution::NotFound);
        assert_eq!(respond(&c, ProtocolVersion::V120), None);
    }

    #[test]
    fn test_block_present_without_content() {
        let c = candidate(WantType::Block, true, Resolution::Present);
        assert_eq!(respond(&c, ProtocolVersion::V120), None);
    }

    #[test]
    fn test_have_found() {
        let c = candidate(WantType::Have, false, Resolution::Present);
        assert_eq!(presence_of(respond(&c, ProtocolVersion::V120)), Some(BlockPresenceType::Have));

        let c = candidate(WantType::Have, false, Resolution::Content(Bytes::new()));
        assert_eq!(presence_of(respond(&c, ProtocolVersion::V110)), Some(BlockPresenceType::Have));
    }

    #[test]
    fn test_have_not_found() {
        let c = candidate(WantType::Have, true, Resolution::NotFound);
        assert_eq!(presence_of(respond(&c, ProtocolVersion::V120)), Some(BlockPresenceType::DontHave));
        assert_eq!(respond(&c, ProtocolVersion::V110), None);

        let c = candidate(WantType::Have, false, Resolution::NotFound);
        assert_eq!(respond(&c, ProtocolVersion::V120), None);
    }

    #[test]
    fn test_unresolved_and_cancelled() {
        let entry = Entry::new(cid(), 1, false, WantType::Have, true);
        assert_eq!(respond(&Candidate::new(entry), ProtocolVersion::V120), None);

        let entry = Entry::new(cid(), 1, true, WantType::Block, true);
        let c = Candidate::resolved(entry, Resolution::Content(Bytes::from_static(b"x")));
        assert_eq!(respond(&c, ProtocolVersion::V120), None);
    }

    #[test]
    fn test_candidate_key() {
        let c = candidate(WantType::Block, false, Resolution::NotFound);
        assert_eq!(c.key(), "zQmSnuWmxptJZdLJpKRarxBMS2Ju2oANVrgbr2xWbie9b2D");
    }

    #[test]
    fn test_overheads() {
        let block = Response::Block(Block::raw(Bytes::new()));
        let presence = Response::Presence(BlockPresence::have(cid()));
        assert_eq!(block.overhead(), 10);
        assert_eq!(presence.overhead(), 4);
    }

    #[test]
    fn test_encoded_len_matches_wire() {
        let responses = [
            Response::Presence(BlockPresence::have(cid())),
            Response::Presence(BlockPresence::dont_have(cid())),
            Response::Block(Block::from_cid(&cid(), vec![1u8; 10])),
            Response::Block(Block::from_cid(&cid(), vec![2u8; 1000])),
            Response::Block(Block::from_cid(&cid(), vec![3u8; 70_000])),
        ];

        for response in responses {
            let mut message = Message::default();
            let empty = message.encode(ProtocolVersion::V120).len();
            message.append(response.clone(), response.payload_size());

            let encoded = message.encode(ProtocolVersion::V120);
            assert_eq!(encoded.len(), empty + response.encoded_len());
            assert_eq!(response.overhead() + response.payload_size(), response.encoded_len());
            assert!(encoded.len() <= message.size());
        }
    }

    #[test]
    fn test_payload_size_covers_length_prefixes() {
        // presence: tag, length, cid tag, cid length, cid, type tag, type
        let presence = Response::Presence(BlockPresence::have(cid()));
        assert_eq!(presence.payload_size(), cid().encoded_len() + 2);

        // 1000 bytes of data need a two byte length varint
        let block = Response::Block(Block::from_cid(&cid(), vec![0u8; 1000]));
        assert!(block.payload_size() > 1000);
    }
}
