//! CID helpers for the wire codec
//!
//! Varint prefixes, strict CID decoding, version downgrade and the storage
//! key derived from a CID's multihash.

use cid::{Cid, Version};
use multihash::Multihash;
use sha2::{Digest, Sha256};

use crate::protocol::ProtocolError;

/// sha2-256 multihash code
pub const SHA256_CODE: u64 = 0x12;

/// dag-pb codec, the only codec a CIDv0 can carry
pub const DAG_PB_CODEC: u64 = 0x70;

/// raw binary codec
pub const RAW_CODEC: u64 = 0x55;

/// Concatenate the minimal unsigned varint of every number.
pub fn varint_encode(numbers: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(numbers.len() * 2);
    let mut buf = unsigned_varint::encode::u64_buffer();
    for n in numbers {
        out.extend_from_slice(unsigned_varint::encode::u64(*n, &mut buf));
    }
    out
}

/// Block prefix: varint `[version, codec, hash code, digest length]`.
pub fn block_prefix(cid: &Cid) -> Vec<u8> {
    let hash = cid.hash();
    varint_encode(&[
        u64::from(cid.version()),
        cid.codec(),
        hash.code(),
        u64::from(hash.size()),
    ])
}

/// Decode a CID, rejecting trailing bytes.
pub fn decode_cid(bytes: &[u8]) -> Result<Cid, ProtocolError> {
    let cid = Cid::try_from(bytes)?;
    if cid.encoded_len() != bytes.len() {
        return Err(ProtocolError::MalformedWire(format!(
            "CID occupies {} of {} bytes",
            cid.encoded_len(),
            bytes.len()
        )));
    }
    Ok(cid)
}

/// Downgrade a CID to version 0. Only dag-pb/sha2-256 CIDs have a v0 form.
pub fn to_v0(cid: &Cid) -> Result<Cid, ProtocolError> {
    match cid.version() {
        Version::V0 => Ok(*cid),
        Version::V1 => {
            if cid.codec() != DAG_PB_CODEC {
                return Err(ProtocolError::MalformedWire(format!(
                    "cannot downgrade CID with codec 0x{:x} to v0",
                    cid.codec()
                )));
            }
            Ok(Cid::new_v0(*cid.hash())?)
        }
    }
}

/// The version-0 byte form of a CID: its bare multihash.
pub fn v0_bytes(cid: &Cid) -> Vec<u8> {
    cid.hash().to_bytes()
}

/// Storage key for a CID: base58btc multibase of the multihash.
///
/// CIDs that differ only in version or codec share the same key.
pub fn cid_to_key(cid: &Cid) -> String {
    format!("z{}", bs58::encode(cid.hash().to_bytes()).into_string())
}

/// Compute a CIDv1 (raw codec, sha2-256) for block data.
pub fn sha256_cid(data: &[u8]) -> Result<Cid, ProtocolError> {
    let digest = Sha256::digest(data);
    let mh = Multihash::wrap(SHA256_CODE, &digest)
        .map_err(|e| ProtocolError::MalformedWire(format!("Failed to create multihash: {}", e)))?;
    Ok(Cid::new_v1(RAW_CODEC, mh))
}
