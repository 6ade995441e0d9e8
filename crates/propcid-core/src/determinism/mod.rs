//! Deterministic encoding and content addressing.

pub mod canonical_json;
pub mod cid;

pub use canonical_json::{canonicalize, canonicalize_to_string};
pub use cid::{
    calculate_cid_from_canonical_json, calculate_cid_v1, calculate_cid_v1_for_raw_data, is_valid_cid,
};
