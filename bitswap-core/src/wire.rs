//! Bitswap protobuf messages
//!
//! One schema serves all three protocol generations; each generation
//! populates a subset of the fields. Scalars are declared `optional` so a
//! field is written whenever it is set, even to its default value. Deployed
//! peers emit defaults (e.g. `cancel = false`, `pendingBytes = 0`) and the
//! encodings must match them byte for byte.

use bytes::Bytes;

#[derive(Clone, PartialEq, prost::Message)]
pub struct RawMessage {
    #[prost(message, optional, tag = "1")]
    pub wantlist: Option<RawWantlist>,

    /// Raw block data, 1.0.0 only
    #[prost(bytes = "bytes", repeated, tag = "2")]
    pub blocks: Vec<Bytes>,

    #[prost(message, repeated, tag = "3")]
    pub payload: Vec<RawBlock>,

    #[prost(message, repeated, tag = "4")]
    pub block_presences: Vec<RawBlockPresence>,

    #[prost(int32, optional, tag = "5")]
    pub pending_bytes: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RawWantlist {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<RawEntry>,

    #[prost(bool, optional, tag = "2")]
    pub full: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RawEntry {
    /// CID bytes
    #[prost(bytes = "vec", tag = "1")]
    pub block: Vec<u8>,

    #[prost(int32, optional, tag = "2")]
    pub priority: Option<i32>,

    #[prost(bool, optional, tag = "3")]
    pub cancel: Option<bool>,

    #[prost(enumeration = "WantType", optional, tag = "4")]
    pub want_type: Option<i32>,

    #[prost(bool, optional, tag = "5")]
    pub send_dont_have: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RawBlock {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub prefix: Option<Vec<u8>>,

    #[prost(bytes = "bytes", optional, tag = "2")]
    pub data: Option<Bytes>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RawBlockPresence {
    #[prost(bytes = "vec", tag = "1")]
    pub cid: Vec<u8>,

    #[prost(enumeration = "BlockPresenceType", optional, tag = "2")]
    pub r#type: Option<i32>,
}

/// What a want-list entry asks for. Unknown wire values read as `Block`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WantType {
    Block = 0,
    Have = 1,
}

/// Presence answer. Unknown wire values read as `Have`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum BlockPresenceType {
    Have = 0,
    DontHave = 1,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_default_scalars_are_written_when_set() {
        let raw = RawMessage {
            wantlist: Some(RawWantlist {
                entries: vec![],
                full: Some(true),
            }),
            pending_bytes: Some(0),
            ..Default::default()
        };

        assert_eq!(raw.encode_to_vec(), vec![0x0a, 0x02, 0x10, 0x01, 0x28, 0x00]);
    }

    #[test]
    fn test_unset_scalars_are_omitted() {
        let raw = RawWantlist {
            entries: vec![],
            full: None,
        };
        assert!(raw.encode_to_vec().is_empty());
    }

    #[test]
    fn test_unknown_enum_values_coerce_to_default() {
        let entry = RawEntry {
            want_type: Some(7),
            ..Default::default()
        };
        assert_eq!(entry.want_type(), WantType::Block);

        let presence = RawBlockPresence {
            cid: vec![],
            r#type: Some(-3),
        };
        assert_eq!(presence.r#type(), BlockPresenceType::Have);
    }

    #[test]
    fn test_decode_all_fields() {
        let raw = RawMessage {
            wantlist: Some(RawWantlist {
                entries: vec![RawEntry {
                    block: vec![1, 2, 3],
                    priority: Some(5),
                    cancel: Some(true),
                    want_type: Some(WantType::Have as i32),
                    send_dont_have: Some(true),
                }],
                full: Some(false),
            }),
            blocks: vec![Bytes::from_static(b"raw")],
            payload: vec![RawBlock {
                prefix: Some(vec![1, 0x55, 0x12, 0x20]),
                data: Some(Bytes::from_static(b"data")),
            }],
            block_presences: vec![RawBlockPresence {
                cid: vec![4, 5, 6],
                r#type: Some(BlockPresenceType::DontHave as i32),
            }],
            pending_bytes: Some(1024),
        };

        let decoded = RawMessage::decode(raw.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, raw);
    }
}
