//! Small string helpers shared by logging and rollout code

/// Truncate a string to at most `max_bytes` bytes, ensuring the cut lands on a
/// valid UTF-8 char boundary. Returns the longest prefix that fits.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Shorten a session id for log lines: first 8 bytes followed by "...".
pub fn short_id(id: &str) -> String {
    if id.len() <= 8 {
        return id.to_string();
    }
    format!("{}...", truncate_str(id, 8))
}

/// 32-bit rolling string hash (`h = h * 31 + c` with wrapping), returned as
/// its absolute value. Stable across processes, so a session keeps landing in
/// the same rollout bucket.
pub fn string_hash(s: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in s.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    hash.unsigned_abs()
}
