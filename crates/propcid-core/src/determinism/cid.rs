//! Content identifiers.
//!
//! Every CID produced here is a CIDv1 over a SHA2-256 multihash, rendered in
//! base32-lower multibase (`bafk...`, `bagu...`, `baga...`).
//!
//! Codec selection:
//! - `raw` (0x55): binary/image payloads and non-JSON text
//! - `dag-json` (0x0129): JSON documents that contain at least one IPLD link
//! - `json` (0x0200): all other JSON documents
//!
//! All functions are pure: the CID depends on the bytes and the codec only.

use cid::Cid;
use multihash::Multihash;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::{PropcidError, PropcidResult};

/// SHA2-256 multihash code.
const SHA2_256: u64 = 0x12;

/// Multicodec table entries used by propcid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Raw,
    Json,
    DagJson,
}

impl Codec {
    pub fn code(&self) -> u64 {
        match self {
            Self::Raw => 0x55,
            Self::Json => 0x0200,
            Self::DagJson => 0x0129,
        }
    }
}

/// Compute a CIDv1 string for `bytes` under `codec`.
pub fn cid_for_bytes(codec: Codec, bytes: &[u8]) -> PropcidResult<String> {
    let digest = Sha256::digest(bytes);
    let mh = Multihash::<64>::wrap(SHA2_256, &digest)
        .map_err(|e| PropcidError::invariant(format!("sha2-256 digest rejected by multihash: {e}")))?;
    Ok(Cid::new_v1(codec.code(), mh).to_string())
}

/// CID of a canonical JSON document.
///
/// `original` is the value the canonical bytes were produced from; it selects
/// between the `dag-json` and `json` codecs.
pub fn calculate_cid_from_canonical_json(canonical: &[u8], original: &Value) -> PropcidResult<String> {
    let codec = if contains_ipld_link(original) {
        Codec::DagJson
    } else {
        Codec::Json
    };
    cid_for_bytes(codec, canonical)
}

/// Raw-codec CID for binary payloads (images).
pub fn calculate_cid_v1_for_raw_data(bytes: &[u8]) -> PropcidResult<String> {
    cid_for_bytes(Codec::Raw, bytes)
}

/// Raw-codec CID for non-JSON text payloads.
pub fn calculate_cid_v1(bytes: &[u8]) -> PropcidResult<String> {
    cid_for_bytes(Codec::Raw, bytes)
}

/// Parse a CID string (v0 or v1).
pub fn parse_cid(s: &str) -> Option<Cid> {
    if s.is_empty() || s.trim() != s {
        return None;
    }
    Cid::try_from(s).ok()
}

pub fn is_valid_cid(s: &str) -> bool {
    parse_cid(s).is_some()
}

/// `ipfs://<cid>` form.
pub fn to_ipfs_uri(cid: &str) -> String {
    format!("ipfs://{cid}")
}

/// The IPLD link target if `value` is exactly `{"/": <string>}`.
pub fn link_target(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    obj.get("/")?.as_str()
}

/// True if `value` holds an IPLD link at any depth.
pub fn contains_ipld_link(value: &Value) -> bool {
    if link_target(value).is_some() {
        return true;
    }
    match value {
        Value::Array(items) => items.iter().any(contains_ipld_link),
        Value::Object(map) => map.values().any(contains_ipld_link),
        _ => false,
    }
}
