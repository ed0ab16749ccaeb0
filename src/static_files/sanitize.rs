//! Request path sanitization.
//!
//! Maps a raw request target onto a path relative to the document root, or
//! rejects it. Nothing that survives can name a location outside the root.

use std::path::{PathBuf, MAIN_SEPARATOR};

use percent_encoding::percent_decode_str;

/// Characters never allowed in a decoded path.
const FORBIDDEN: [char; 5] = ['<', '>', '&', '"', '\0'];

/// Decode and validate `target`, returning a path relative to the root.
///
/// The query and fragment are ignored. `+` is left as is. Returns `None` for
/// invalid UTF-8 after decoding, a path not starting with `/`, any dot
/// segment adjacent to a separator, a leading or trailing `.`, and the
/// characters `<>&"` or NUL.
pub fn sanitize_path(target: &str) -> Option<PathBuf> {
    let raw = target.split(['?', '#']).next().unwrap_or_default();
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;

    if !decoded.starts_with('/') {
        return None;
    }

    let native: String = decoded
        .chars()
        .map(|c| if c == '/' { MAIN_SEPARATOR } else { c })
        .collect();

    let sep_dot = format!("{}.", MAIN_SEPARATOR);
    let dot_sep = format!(".{}", MAIN_SEPARATOR);
    if native.contains(&sep_dot)
        || native.contains(&dot_sep)
        || native.starts_with('.')
        || native.ends_with('.')
        || native.contains(FORBIDDEN)
    {
        return None;
    }

    Some(PathBuf::from(native.trim_start_matches(MAIN_SEPARATOR)))
}
