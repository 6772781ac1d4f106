//! Modified UTF-8 as used by `CONSTANT_Utf8` entries: NUL is encoded as
//! `C0 80` and supplementary characters as surrogate pairs of three bytes each.

use crate::error::{Error, Result};

pub fn decode(bytes: &[u8]) -> Result<String> {
    if bytes.iter().all(|b| (0x01..0x80).contains(b)) {
        // ASCII without NUL is identical in both encodings.
        return String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::class_format(format!("invalid utf8 constant: {e}")));
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            if b0 == 0 {
                return Err(Error::class_format("raw NUL byte in modified utf8"));
            }
            units.push(u16::from(b0));
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = continuation(bytes, i + 1)?;
            units.push((u16::from(b0 & 0x1F) << 6) | u16::from(b1 & 0x3F));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = continuation(bytes, i + 1)?;
            let b2 = continuation(bytes, i + 2)?;
            units.push(
                (u16::from(b0 & 0x0F) << 12) | (u16::from(b1 & 0x3F) << 6) | u16::from(b2 & 0x3F),
            );
            i += 3;
        } else {
            return Err(Error::class_format(format!(
                "invalid modified utf8 lead byte 0x{b0:02x}"
            )));
        }
    }

    String::from_utf16(&units)
        .map_err(|_| Error::unsupported("utf8 constant contains an unpaired surrogate"))
}

fn continuation(bytes: &[u8], at: usize) -> Result<u8> {
    match bytes.get(at) {
        Some(b) if b & 0xC0 == 0x80 => Ok(*b),
        _ => Err(Error::class_format("truncated modified utf8 sequence")),
    }
}

pub fn encode(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) as u8 & 0x1F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) as u8 & 0x0F));
                out.push(0x80 | ((unit >> 6) as u8 & 0x3F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nul_uses_two_byte_form() {
        assert_eq!(encode("a\0b"), vec![b'a', 0xC0, 0x80, b'b']);
        assert_eq!(decode(&[b'a', 0xC0, 0x80, b'b']).unwrap(), "a\0b");
    }

    #[test]
    fn supplementary_characters_use_surrogate_pairs() {
        let encoded = encode("\u{1F600}");
        assert_eq!(encoded.len(), 6);
        assert_eq!(decode(&encoded).unwrap(), "\u{1F600}");
    }

    #[test]
    fn rejects_truncated_sequence() {
        assert!(decode(&[0xE2, 0x82]).is_err());
    }
}
