//! Custom string formats used by property schemas.
//!
//! Each checker is a plain `fn(&str) -> bool` so it can be registered with
//! `jsonschema::options().with_format(..)` directly.

use std::sync::OnceLock;

use regex::Regex;
use time::{Date, Month};

use crate::determinism::cid::is_valid_cid;

fn currency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(0|[1-9][0-9]*)(\.[0-9]{1,2})?$").expect("static regex"))
}

fn rate_percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]\.[0-9]{3}$").expect("static regex"))
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9]{4})-([0-9]{2})-([0-9]{2})$").expect("static regex"))
}

/// `ipfs://<cid>`.
pub fn is_ipfs_uri(s: &str) -> bool {
    s.strip_prefix("ipfs://").is_some_and(is_valid_cid)
}

/// Lenient `ipfs_uri`: also a bare CID or a relative local path.
pub fn is_ipfs_uri_or_local(s: &str) -> bool {
    if is_ipfs_uri(s) || is_valid_cid(s) {
        return true;
    }
    !s.is_empty() && !s.contains("://") && !s.starts_with('/')
}

pub fn is_cid(s: &str) -> bool {
    is_valid_cid(s)
}

/// Non-negative amount with at most two decimals.
pub fn is_currency(s: &str) -> bool {
    currency_re().is_match(s)
}

/// `d.ddd`.
pub fn is_rate_percent(s: &str) -> bool {
    rate_percent_re().is_match(s)
}

/// `YYYY-MM-DD` naming a real calendar day.
pub fn is_date(s: &str) -> bool {
    let Some(caps) = date_re().captures(s) else {
        return false;
    };
    let year: i32 = caps[1].parse().unwrap_or(0);
    let month: u8 = caps[2].parse().unwrap_or(0);
    let day: u8 = caps[3].parse().unwrap_or(0);
    Month::try_from(month)
        .ok()
        .and_then(|m| Date::from_calendar_date(year, m, day).ok())
        .is_some()
}
