//! Want-list entries
//!
//! An [`Entry`] names a CID the remote peer wants, together with how badly
//! and in what form. A [`WantList`] is an ordered sequence of entries.

use cid::Cid;
use prost::Message as _;
use tracing::trace;

use crate::cid_util::{decode_cid, to_v0, v0_bytes};
use crate::protocol::{ProtocolError, ProtocolVersion};
use crate::wire::{RawEntry, RawWantlist, WantType};

/// Largest priority the wire's int32 field can carry.
pub const MAX_PRIORITY: i32 = i32::MAX;

/// Entry priority, always within `[1, MAX_PRIORITY]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Priority(i32);

impl Priority {
    /// Clamp any integer into the valid range. Values below 1 become 1.
    pub fn clamp(value: i64) -> Self {
        if value < 1 {
            Priority(1)
        } else if value > i64::from(MAX_PRIORITY) {
            Priority(MAX_PRIORITY)
        } else {
            Priority(value as i32)
        }
    }

    /// Parse loosely: anything that is not a number becomes 1.
    pub fn parse(input: &str) -> Self {
        match input.trim().parse::<f64>() {
            Ok(v) if !v.is_nan() => Self::clamp(v as i64),
            _ => Priority(1),
        }
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority(1)
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self::clamp(i64::from(value))
    }
}

/// One want-list item. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    cid: Cid,
    priority: Priority,
    cancel: bool,
    want_type: WantType,
    send_dont_have: bool,
}

impl Entry {
    pub fn new(
        cid: Cid,
        priority: impl Into<Priority>,
        cancel: bool,
        want_type: WantType,
        send_dont_have: bool,
    ) -> Self {
        Self {
            cid,
            priority: priority.into(),
            cancel,
            want_type,
            send_dont_have,
        }
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn cancel(&self) -> bool {
        self.cancel
    }

    pub fn want_type(&self) -> WantType {
        self.want_type
    }

    pub fn send_dont_have(&self) -> bool {
        self.send_dont_have
    }

    /// Rebuild an entry from its wire form.
    ///
    /// 1.0.0 has no want-type or send-dont-have fields and only speaks
    /// CIDv0, so those are forced rather than read.
    /// A wire priority of 0 or below is normalized to 1, so such an entry
    /// re-encodes with a different priority byte than it arrived with.
    pub fn decode(raw: &RawEntry, protocol: ProtocolVersion) -> Result<Self, ProtocolError> {
        let cid = decode_cid(&raw.block)?;
        let priority = Priority::from(raw.priority());

        let entry = match protocol {
            ProtocolVersion::V100 => {
                Entry::new(to_v0(&cid)?, priority, raw.cancel(), WantType::Block, false)
            }
            ProtocolVersion::V110 | ProtocolVersion::V120 => Entry::new(
                cid,
                priority,
                raw.cancel(),
                raw.want_type(),
                raw.send_dont_have(),
            ),
        };

        trace!("Decoded entry {} ({:?})", entry.cid, entry.want_type);
        Ok(entry)
    }

    pub fn serialize(&self, protocol: ProtocolVersion) -> RawEntry {
        match protocol {
            ProtocolVersion::V100 => RawEntry {
                block: v0_bytes(&self.cid),
                priority: Some(self.priority.get()),
                cancel: Some(self.cancel),
                want_type: None,
                send_dont_have: None,
            },
            ProtocolVersion::V110 => RawEntry {
                block: self.cid.to_bytes(),
                priority: Some(self.priority.get()),
                cancel: Some(self.cancel),
                want_type: None,
                send_dont_have: None,
            },
            ProtocolVersion::V120 => RawEntry {
                block: self.cid.to_bytes(),
                priority: Some(self.priority.get()),
                cancel: Some(self.cancel),
                want_type: Some(self.want_type as i32),
                send_dont_have: Some(self.send_dont_have),
            },
        }
    }

    pub fn encode(&self, protocol: ProtocolVersion) -> Vec<u8> {
        self.serialize(protocol).encode_to_vec()
    }
}

/// Ordered want-list. `full` marks a complete snapshot rather than a diff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WantList {
    pub entries: Vec<Entry>,
    pub full: bool,
}

impl WantList {
    pub fn new(entries: Vec<Entry>, full: bool) -> Self {
        Self { entries, full }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn decode(raw: &RawWantlist, protocol: ProtocolVersion) -> Result<Self, ProtocolError> {
        let entries = raw
            .entries
            .iter()
            .map(|e| Entry::decode(e, protocol))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            entries,
            full: raw.full(),
        })
    }

    pub fn serialize(&self, protocol: ProtocolVersion) -> RawWantlist {
        RawWantlist {
            entries: self.entries.iter().map(|e| e.serialize(protocol)).collect(),
            full: Some(self.full),
        }
    }

    pub fn encode(&self, protocol: ProtocolVersion) -> Vec<u8> {
        self.serialize(protocol).encode_to_vec()
    }
}

/// An empty, complete want-list.
impl Default for WantList {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            full: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::str::FromStr;

    fn cid() -> Cid {
        Cid::from_str("bafybeiccfclkdtucu6y4yc5cpr6y3yuinr67svmii46v5cfcrkp47ihehy").unwrap()
    }

    #[test]
    fn test_priority_clamping() {
        assert_eq!(Priority::clamp(-1).get(), 1);
        assert_eq!(Priority::clamp(0).get(), 1);
        assert_eq!(Priority::clamp(1).get(), 1);
        assert_eq!(Priority::clamp(42).get(), 42);
        assert_eq!(Priority::clamp(i64::from(MAX_PRIORITY)).get(), MAX_PRIORITY);
        assert_eq!(Priority::clamp(i64::from(MAX_PRIORITY) + 1).get(), MAX_PRIORITY);
        assert_eq!(Priority::clamp(i64::MIN).get(), 1);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(Priority::parse("not-a-number").get(), 1);
        assert_eq!(Priority::parse("NaN").get(), 1);
        assert_eq!(Priority::parse("-5").get(), 1);
        assert_eq!(Priority::parse(" 17 ").get(), 17);
        assert_eq!(Priority::parse("1e20").get(), MAX_PRIORITY);
    }

    #[test]
    fn test_entry_sanitizes_priority() {
        let entry = Entry::new(cid(), -1, true, WantType::Have, true);
        assert_eq!(entry.priority().get(), 1);

        let entry = Entry::new(cid(), Priority::clamp(i64::from(MAX_PRIORITY) + 1), true, WantType::Have, true);
        assert_eq!(entry.priority().get(), MAX_PRIORITY);
    }

    #[test]
    fn test_decode_entry_v120() {
        let raw = RawEntry {
            block: hex::decode(
                "01551220fb8608af83b9fbae3a3319be6466f347f22e8557b37f804f06316e5299011f9c",
            )
            .unwrap(),
            priority: Some(1),
            cancel: Some(false),
            want_type: Some(WantType::Block as i32),
            send_dont_have: Some(true),
        };

        let entry = Entry::decode(&raw, ProtocolVersion::V120).unwrap();
        assert_eq!(
            entry.cid().to_string(),
            "bafkreih3qyek7a5z7oxdumyzxzsgn42h6ixikv5tp6ae6brrnzjjsai7tq"
        );
        assert_eq!(entry.priority().get(), 1);
        assert!(!entry.cancel());
        assert_eq!(entry.want_type(), WantType::Block);
        assert!(entry.send_dont_have());
    }

    #[test]
    fn test_decode_entry_v100_forces_legacy_fields() {
        let raw = RawEntry {
            block: hex::decode(
                "1220c5f88ca2291d282b078f11bba4ea5bc9b6c2ee064501bd0bdf75d185d480dcf3",
            )
            .unwrap(),
            priority: Some(1),
            cancel: Some(false),
            want_type: Some(WantType::Have as i32),
            send_dont_have: Some(true),
        };

        let entry = Entry::decode(&raw, ProtocolVersion::V100).unwrap();
        assert_eq!(
            entry.cid().to_string(),
            "QmbfSqvUycmA1zG5WAfMfCknSJwbGxDMCnaXF5BieZ7Xnz"
        );
        assert_eq!(entry.want_type(), WantType::Block);
        assert!(!entry.send_dont_have());
    }

    #[test]
    fn test_decode_entry_v100_downgrades_v1() {
        let raw = Entry::new(cid(), 3, false, WantType::Block, false).serialize(ProtocolVersion::V120);
        let entry = Entry::decode(&raw, ProtocolVersion::V100).unwrap();
        assert_eq!(entry.cid().version(), cid::Version::V0);
        assert_eq!(entry.cid().hash(), cid().hash());
    }

    #[test]
    fn test_decode_entry_missing_priority_reads_as_one() {
        let raw = RawEntry {
            block: cid().to_bytes(),
            ..Default::default()
        };
        let entry = Entry::decode(&raw, ProtocolVersion::V110).unwrap();
        assert_eq!(entry.priority().get(), 1);
        assert!(!entry.cancel());
    }

    #[test]
    fn test_decode_entry_zero_priority_reencodes_as_one() {
        let raw = RawEntry {
            block: cid().to_bytes(),
            priority: Some(0),
            cancel: Some(false),
            want_type: Some(WantType::Block as i32),
            send_dont_have: Some(false),
        };

        let entry = Entry::decode(&raw, ProtocolVersion::V120).unwrap();
        assert_eq!(entry.priority().get(), 1);
        assert_eq!(entry.serialize(ProtocolVersion::V120).priority, Some(1));
    }

    #[test]
    fn test_decode_entry_bad_cid() {
        let raw = RawEntry {
            block: vec![0xde, 0xad],
            ..Default::default()
        };
        assert!(matches!(
            Entry::decode(&raw, ProtocolVersion::V120),
            Err(ProtocolError::MalformedWire(_))
        ));
    }

    #[test]
    fn test_encode_entry_v120() {
        let entry = Entry::new(cid(), -1, true, WantType::Have, true);
        assert_eq!(
            STANDARD.encode(entry.encode(ProtocolVersion::V120)),
            "CiQBcBIgQiiWoc6Cp7HMC6J8fY3iiGx9+VWIRz1eiKKKn8+g5D4QARgBIAEoAQ=="
        );

        let entry = Entry::new(cid(), Priority::clamp(1 << 31), true, WantType::Have, true);
        assert_eq!(
            STANDARD.encode(entry.encode(ProtocolVersion::V120)),
            "CiQBcBIgQiiWoc6Cp7HMC6J8fY3iiGx9+VWIRz1eiKKKn8+g5D4Q/////wcYASABKAE="
        );
    }

    #[test]
    fn test_encode_entry_version_downgrade() {
        let entry = Entry::new(cid(), 1, false, WantType::Have, true);
        let v0 = Entry::new(to_v0(&cid()).unwrap(), 1, false, WantType::Have, true);

        assert_eq!(
            entry.encode(ProtocolVersion::V100),
            v0.encode(ProtocolVersion::V100)
        );
        assert_eq!(entry.serialize(ProtocolVersion::V110).block, cid().to_bytes());
        assert_eq!(entry.serialize(ProtocolVersion::V120).block, cid().to_bytes());
        assert_eq!(entry.serialize(ProtocolVersion::V110).want_type, None);
    }

    #[test]
    fn test_wantlist_decode_preserves_order() {
        let other = crate::cid_util::sha256_cid(b"other").unwrap();
        let raw = WantList::new(
            vec![
                Entry::new(cid(), 1, false, WantType::Block, false),
                Entry::new(other, 2, false, WantType::Have, true),
            ],
            false,
        )
        .serialize(ProtocolVersion::V120);

        let wantlist = WantList::decode(&raw, ProtocolVersion::V120).unwrap();
        assert!(!wantlist.full);
        assert_eq!(wantlist.len(), 2);
        assert_eq!(wantlist.entries[0].cid(), &cid());
        assert_eq!(wantlist.entries[1].cid(), &other);
    }

    #[test]
    fn test_wantlist_decode_v100() {
        let raw = RawWantlist {
            entries: vec![RawEntry {
                block: hex::decode(
                    "1220fb8608af83b9fbae3a3319be6466f347f22e8557b37f804f06316e5299011f9c",
                )
                .unwrap(),
                priority: Some(1),
                cancel: Some(false),
                want_type: None,
                send_dont_have: None,
            }],
            full: Some(false),
        };

        let wantlist = WantList::decode(&raw, ProtocolVersion::V100).unwrap();
        assert!(!wantlist.full);
        assert_eq!(
            wantlist.entries[0].cid().to_string(),
            "QmfGVahyJZtbWcLa8L3XLnxN5yfS53Cb7CdiEFA61AJ7yV"
        );
    }

    #[test]
    fn test_empty_wantlist_encode() {
        assert_eq!(
            STANDARD.encode(WantList::default().encode(ProtocolVersion::V120)),
            "EAE="
        );
    }
}
