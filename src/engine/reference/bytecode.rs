//! Compiled blob format
//!
//! ```text
//! +--------+-------------+---------+-----+------------+--------+
//! | "DBJS" | version:u16 | url:u32 | url | source:u32 | source |
//! +--------+-------------+---------+-----+------------+--------+
//! ```
//! Integers are little-endian. The payload is the checked source; the
//! blob is only accepted by an engine of the same version.

use crate::error::BytecodeError;

pub const MAGIC: &[u8; 4] = b"DBJS";

/// Bumped whenever the dialect changes incompatibly
pub const VERSION: u16 = 1;

pub fn encode(source_url: &str, source: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(14 + source_url.len() + source.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    put_str(&mut out, source_url);
    put_str(&mut out, source);
    out
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Decoded blob: source url and source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub source_url: String,
    pub source: String,
}

pub fn decode(bytes: &[u8]) -> Result<Decoded, BytecodeError> {
    if bytes.len() < 6 {
        return Err(if bytes.starts_with(&MAGIC[..bytes.len().min(4)]) {
            BytecodeError::Truncated
        } else {
            BytecodeError::BadMagic
        });
    }
    if &bytes[..4] != MAGIC {
        return Err(BytecodeError::BadMagic);
    }
    let found = u16::from_le_bytes([bytes[4], bytes[5]]);
    if found != VERSION {
        return Err(BytecodeError::IncompatibleVersion {
            expected: VERSION,
            found,
        });
    }
    let mut pos = 6;
    let source_url = take_str(bytes, &mut pos)?;
    let source = take_str(bytes, &mut pos)?;
    Ok(Decoded { source_url, source })
}

fn take_str(bytes: &[u8], pos: &mut usize) -> Result<String, BytecodeError> {
    let len_bytes = bytes.get(*pos..*pos + 4).ok_or(BytecodeError::Truncated)?;
    let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    *pos += 4;
    let end = pos.checked_add(len).ok_or(BytecodeError::Truncated)?;
    let raw = bytes.get(*pos..end).ok_or(BytecodeError::Truncated)?;
    *pos = end;
    String::from_utf8(raw.to_vec()).map_err(|_| BytecodeError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_encoded() {
        let blob = encode("app.js", "let a = 1");
        assert_eq!(&blob[..4], b"DBJS");
        let decoded = decode(&blob).unwrap();
        assert_eq!(decoded.source_url, "app.js");
        assert_eq!(decoded.source, "let a = 1");
    }

    #[test]
    fn test_version_mismatch() {
        let mut blob = encode("a.js", "1");
        blob[4] = 99;
        assert_eq!(
            decode(&blob),
            Err(BytecodeError::IncompatibleVersion { expected: VERSION, found: 99 })
        );
    }

    #[test]
    fn test_malformed() {
        assert_eq!(decode(b"nope-not-bytecode"), Err(BytecodeError::BadMagic));
        assert_eq!(decode(b"DB"), Err(BytecodeError::Truncated));
        let blob = encode("a.js", "some source");
        assert_eq!(decode(&blob[..blob.len() - 3]), Err(BytecodeError::Truncated));
    }
}
