// skiff-runtime - Tagged values, heap and garbage collector for the skiff VM
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Constructor-name hashing for s-expression tags.
//!
//! A tag name is packed six bits per character, most significant
//! first, using the character's index in a 64-symbol alphabet. Only
//! the first five characters are significant, so the packed code fits
//! in 30 bits and always boxes as a valid integer value.

/// Index in this alphabet is the 6-bit code of a character.
const ALPHABET: &[u8; 64] = b"_abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ'0123456789";

/// Packs a constructor name. `None` when a significant character is
/// outside the alphabet.
pub fn tag_hash(name: &[u8]) -> Option<i32> {
    let mut hash: i32 = 0;
    for &byte in name.iter().take(5) {
        let code = ALPHABET.iter().position(|&c| c == byte)?;
        hash = (hash << 6) | code as i32;
    }
    Some(hash)
}

/// Recovers a printable name from a packed tag, for diagnostics.
///
/// The scan stops at a zero code, so `_` characters and anything
/// following them are not recovered.
pub fn tag_name(hash: i32) -> String {
    let mut n = hash as u32;
    let mut buf = Vec::new();
    while n != 0 {
        buf.push(ALPHABET[(n & 0x3F) as usize] as char);
        n >>= 6;
    }
    buf.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_characters_pack_to_their_codes() {
        assert_eq!(tag_hash(b""), Some(0));
        assert_eq!(tag_hash(b"_"), Some(0));
        assert_eq!(tag_hash(b"a"), Some(1));
        assert_eq!(tag_hash(b"z"), Some(26));
        assert_eq!(tag_hash(b"A"), Some(27));
        assert_eq!(tag_hash(b"'"), Some(53));
        assert_eq!(tag_hash(b"9"), Some(63));
    }

    #[test]
    fn names_pack_most_significant_first() {
        assert_eq!(tag_hash(b"cons"), Some((3 << 18) | (15 << 12) | (14 << 6) | 19));
    }

    #[test]
    fn only_five_characters_are_significant() {
        assert_eq!(tag_hash(b"Branch"), tag_hash(b"Branc"));
    }

    #[test]
    fn bad_characters_are_rejected() {
        assert_eq!(tag_hash(b"so-so"), None);
        assert_eq!(tag_hash(b" "), None);
    }

    #[test]
    fn names_come_back_out() {
        for name in ["cons", "Nil", "Branc", "x'9"] {
            let hash = tag_hash(name.as_bytes()).unwrap();
            assert_eq!(tag_name(hash), name);
        }
    }
}
