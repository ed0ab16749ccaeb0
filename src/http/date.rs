//! HTTP date handling, always in GMT.
//!
//! Only the fixed IMF format `Sun, 06 Nov 1994 08:49:37 GMT` is produced
//! and accepted.

use std::time::{SystemTime, UNIX_EPOCH};

/// Length of an IMF-fixdate.
const IMF_FIXDATE_LEN: usize = 29;

pub fn format_http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// Parse an IMF-fixdate. Anything else yields `None`.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    let value = value.trim();
    if value.len() != IMF_FIXDATE_LEN || !value.ends_with(" GMT") {
        return None;
    }
    httpdate::parse_http_date(value).ok()
}

/// Seconds since the epoch, truncated. Pre-epoch times clamp to zero.
pub fn whole_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
