//! UTF-16LE helpers: file names travel the way the kernel stores them.

/// Encode a Rust string slice as UTF-16LE bytes (no terminator).
pub fn to_utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Decode UTF-16LE bytes, replacing unpaired surrogates.
///
/// A trailing odd byte cannot form a code unit and is ignored.
pub fn from_utf16le_lossy(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}
