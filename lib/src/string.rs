//! Byte-string helpers for fixed-size name fields.

/// Interpret bytes as str, replacing invalid UTF-8 with an empty string.
/// Kernel names are ASCII in practice.
#[inline]
pub fn bytes_as_str(bytes: &[u8]) -> &str {
    core::str::from_utf8(bytes).unwrap_or("")
}

/// Strip trailing spaces and NULs, as found in space-padded on-disk names.
pub fn rtrim(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();
    while end > 0 && (bytes[end - 1] == b' ' || bytes[end - 1] == 0) {
        end -= 1;
    }
    &bytes[..end]
}

/// Length of a NUL-terminated string within a fixed buffer.
pub fn cstr_len(bytes: &[u8]) -> usize {
    bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len())
}

#[inline]
pub fn to_upper(b: u8) -> u8 {
    if b.is_ascii_lowercase() { b - 32 } else { b }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtrim_strips_padding() {
        assert_eq!(rtrim(b"README  "), b"README");
        assert_eq!(rtrim(b"A\0\0"), b"A");
        assert_eq!(rtrim(b"   "), b"");
    }

    #[test]
    fn cstr_len_stops_at_nul() {
        assert_eq!(cstr_len(b"abc\0def"), 3);
        assert_eq!(cstr_len(b"abc"), 3);
    }
}
