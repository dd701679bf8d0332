//! Archive-internal filename sanitizing.
//!
//! Manifest `file_name` values and central directory names are untrusted.
//! A name is first decoded to a canonical form (percent escapes undone,
//! backslashes turned into slashes, `.`/`..` segments resolved) and only
//! accepted if that canonical form stays inside the archive root and uses a
//! conservative character set.

use std::fmt;

/// Longest accepted cleaned name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Percent-decoding passes; `%252e` needs two.
const MAX_DECODE_ROUNDS: usize = 4;

/// Why a name was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    NullByte,
    PathTraversal,
    InvalidCharacters,
    HiddenFile,
    TooLong,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Empty => "empty name",
            Rejection::NullByte => "null byte",
            Rejection::PathTraversal => "path traversal",
            Rejection::InvalidCharacters => "invalid characters",
            Rejection::HiddenFile => "hidden file",
            Rejection::TooLong => "name too long",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for Rejection {}

/// Validate and normalize an archive-internal path.
///
/// Returns the cleaned, root-relative name on success.
///
/// ```
/// use a3d_archive::sanitize::{sanitize, Rejection};
///
/// assert_eq!(sanitize("assets/model.glb").unwrap(), "assets/model.glb");
/// assert_eq!(sanitize("/a/b/../c").unwrap(), "a/c");
/// assert_eq!(sanitize("../../etc/passwd"), Err(Rejection::PathTraversal));
/// ```
pub fn sanitize(raw: &str) -> Result<String, Rejection> {
    if raw.is_empty() {
        return Err(Rejection::Empty);
    }
    if raw.contains('\0') {
        return Err(Rejection::NullByte);
    }

    let decoded = percent_decode_fully(raw)?;
    if decoded.contains('\0') {
        return Err(Rejection::NullByte);
    }

    let cleaned = resolve_segments(&decoded.replace('\\', "/"))?;

    if cleaned.is_empty() {
        return Err(Rejection::Empty);
    }
    if !cleaned.bytes().all(is_allowed_byte) {
        return Err(Rejection::InvalidCharacters);
    }
    if cleaned.starts_with('.') {
        return Err(Rejection::HiddenFile);
    }
    if cleaned.len() > MAX_NAME_LEN {
        return Err(Rejection::TooLong);
    }

    Ok(cleaned)
}

pub fn is_safe(raw: &str) -> bool {
    sanitize(raw).is_ok()
}

fn is_allowed_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-' | b'/')
}

/// Resolve `.` and `..` segments; empty segments (and so leading slashes)
/// are dropped. Climbing above the root is traversal.
fn resolve_segments(path: &str) -> Result<String, Rejection> {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return Err(Rejection::PathTraversal);
                }
            }
            s if s.contains("..") => return Err(Rejection::PathTraversal),
            s => stack.push(s),
        }
    }
    Ok(stack.join("/"))
}

/// Undo percent escapes until the string stops changing.
fn percent_decode_fully(raw: &str) -> Result<String, Rejection> {
    let mut current = raw.to_string();
    for _ in 0..MAX_DECODE_ROUNDS {
        if !current.contains('%') {
            return Ok(current);
        }
        let next = percent_decode(&current)?;
        if next == current {
            return Ok(current);
        }
        current = next;
    }
    // Still changing after several passes: deliberately nested encoding
    if current.contains('%') && percent_decode(&current)? != current {
        return Err(Rejection::PathTraversal);
    }
    Ok(current)
}

fn percent_decode(s: &str) -> Result<String, Rejection> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).map_err(|_| Rejection::InvalidCharacters)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
