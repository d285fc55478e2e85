//! Fixed-width SimHash and Hamming distance.
//!
//! Each token of the normalized text votes on every output bit with the
//! matching bit of its 32-bit FNV-1a hash. Output position `i` reads bit
//! `i % 32` of the token hash seeded for lane `i / 32`, so every 32-bit lane
//! is independent. A bit is set iff its vote total is positive. Text with no
//! tokens yields the all-zero hash, which callers treat as "no similarity
//! data".

use std::fmt;

use super::canonical::normalize;
use crate::core::TestCaseRecord;

/// Default SimHash width.
pub const DEFAULT_BITS: usize = 64;

/// Default Hamming distance at or below which two hashes are similar.
pub const DEFAULT_HAMMING_THRESHOLD: u32 = 4;

/// Separator between fields of the per-record SimHash input.
pub const RECORD_SEPARATOR: char = '\u{1e}';

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a. A non-zero `seed` is folded in before the data.
pub(crate) fn fnv1a32(bytes: &[u8], seed: u32) -> u32 {
    let mut hash = FNV_OFFSET;
    if seed != 0 {
        for b in seed.to_le_bytes() {
            hash ^= u32::from(b);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// A SimHash of `bits` width. Bit `i` lives in `blocks[i / 64]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Simhash {
    bits: usize,
    blocks: Vec<u64>,
}

impl Simhash {
    /// The all-zero hash of the given width.
    pub fn zero(bits: usize) -> Self {
        Self {
            bits,
            blocks: vec![0; bits.div_ceil(64)],
        }
    }

    /// Width in bits.
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Whether bit `i` is set. Out-of-range bits read as unset.
    pub fn bit(&self, i: usize) -> bool {
        i < self.bits && (self.blocks[i / 64] >> (i % 64)) & 1 == 1
    }

    fn set_bit(&mut self, i: usize) {
        self.blocks[i / 64] |= 1u64 << (i % 64);
    }

    /// True when no bit is set (empty input).
    pub fn is_zero(&self) -> bool {
        self.blocks.iter().all(|&b| b == 0)
    }

    /// Lowercase hex, most significant nibble first.
    pub fn to_hex(&self) -> String {
        let nibbles = self.bits.div_ceil(4);
        let mut out = String::with_capacity(nibbles);
        for k in (0..nibbles).rev() {
            let mut nibble = 0u32;
            for j in 0..4 {
                if self.bit(k * 4 + j) {
                    nibble |= 1 << j;
                }
            }
            if let Some(c) = char::from_digit(nibble, 16) {
                out.push(c);
            }
        }
        out
    }

    /// Parse the output of [`to_hex`](Self::to_hex). Width is four bits per
    /// character. Returns `None` on empty or non-hex input.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if hex.is_empty() {
            return None;
        }
        let mut hash = Self::zero(hex.len() * 4);
        for (k, c) in hex.chars().rev().enumerate() {
            let nibble = c.to_digit(16)?;
            for j in 0..4 {
                if (nibble >> j) & 1 == 1 {
                    hash.set_bit(k * 4 + j);
                }
            }
        }
        Some(hash)
    }
}

impl fmt::Display for Simhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Split normalized text into word tokens (alphanumerics and `_`).
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build a SimHash of `bits` width over the tokens of `text`.
pub fn build_simhash(text: &str, bits: usize) -> Simhash {
    let mut hash = Simhash::zero(bits);
    let tokens = tokenize(text);
    if tokens.is_empty() || bits == 0 {
        return hash;
    }

    let lanes = bits.div_ceil(32);
    let mut votes = vec![0i64; bits];
    for token in &tokens {
        let lane_hashes: Vec<u32> = (0..lanes)
            .map(|lane| fnv1a32(token.as_bytes(), lane as u32))
            .collect();
        for (i, vote) in votes.iter_mut().enumerate() {
            if (lane_hashes[i / 32] >> (i % 32)) & 1 == 1 {
                *vote += 1;
            } else {
                *vote -= 1;
            }
        }
    }

    for (i, vote) in votes.iter().enumerate() {
        if *vote > 0 {
            hash.set_bit(i);
        }
    }
    hash
}

/// Number of differing bits. Hashes of different widths compare as if the
/// shorter one were zero-padded.
pub fn hamming(a: &Simhash, b: &Simhash) -> u32 {
    let len = a.blocks.len().max(b.blocks.len());
    (0..len)
        .map(|i| {
            let x = a.blocks.get(i).copied().unwrap_or(0);
            let y = b.blocks.get(i).copied().unwrap_or(0);
            (x ^ y).count_ones()
        })
        .sum()
}

/// `hamming(a, b) <= threshold`.
pub fn are_similar(a: &Simhash, b: &Simhash, threshold: u32) -> bool {
    hamming(a, b) <= threshold
}

/// SimHash input for a record: title, module, then `action|data|expected`
/// per step, joined with [`RECORD_SEPARATOR`].
pub fn record_text(record: &TestCaseRecord) -> String {
    let mut parts = vec![record.title.clone(), record.module.clone()];
    parts.extend(
        record
            .steps
            .iter()
            .map(|s| format!("{}|{}|{}", s.action, s.test_data, s.expected_result)),
    );
    parts.join(&RECORD_SEPARATOR.to_string())
}

/// SimHash of a record.
pub fn simhash_for_record(record: &TestCaseRecord, bits: usize) -> Simhash {
    build_simhash(&record_text(record), bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKOUT: &str = "Checkout with saved card: open cart, choose saved visa card, \
        confirm payment, verify order confirmation page shows order number and total";

    #[test]
    fn test_fnv1a32_known_vectors() {
        assert_eq!(fnv1a32(b"", 0), 0x811c_9dc5);
        assert_eq!(fnv1a32(b"a", 0), 0xe40c_292c);
        assert_eq!(fnv1a32(b"foobar", 0), 0xbf9c_f968);
        assert_ne!(fnv1a32(b"a", 1), fnv1a32(b"a", 0));
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Click 'Login' -- then  VERIFY_state!"),
            vec!["click", "login", "then", "verify_state"]
        );
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn test_empty_text_is_zero() {
        assert!(build_simhash("", 64).is_zero());
        assert!(build_simhash("   \t\n", 64).is_zero());
        assert!(!build_simhash("login", 64).is_zero());
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(build_simhash(CHECKOUT, 64), build_simhash(CHECKOUT, 64));
    }

    #[test]
    fn test_punctuation_and_case_do_not_matter() {
        let a = build_simhash(CHECKOUT, 64);
        let b = build_simhash(&CHECKOUT.to_uppercase().replace(',', ";"), 64);
        assert_eq!(hamming(&a, &b), 0);
        assert!(are_similar(&a, &b, DEFAULT_HAMMING_THRESHOLD));
    }

    #[test]
    fn test_small_edit_closer_than_unrelated_text() {
        let a = build_simhash(CHECKOUT, 64);
        let edited = build_simhash(&CHECKOUT.replace("visa", "mastercard"), 64);
        let unrelated = build_simhash(
            "Admin exports audit log as CSV from the reports dashboard filtered by date range",
            64,
        );
        assert!(hamming(&a, &edited) < hamming(&a, &unrelated));
        assert!(!are_similar(&a, &unrelated, DEFAULT_HAMMING_THRESHOLD));
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = build_simhash(CHECKOUT, 64);
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 16);
        assert_eq!(Simhash::from_hex(&hex), Some(hash));
    }

    #[test]
    fn test_hex_matches_u64_formatting() {
        let hash = Simhash::from_hex("00000000000000ff").unwrap();
        assert_eq!(hash.bits(), 64);
        assert!(hash.bit(0));
        assert!(hash.bit(7));
        assert!(!hash.bit(8));
        assert_eq!(hash.to_hex(), "00000000000000ff");
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert_eq!(Simhash::from_hex(""), None);
        assert_eq!(Simhash::from_hex("xyz"), None);
    }

    #[test]
    fn test_hamming_counts_bits() {
        let a = Simhash::from_hex("0000000000000000").unwrap();
        let b = Simhash::from_hex("000000000000000f").unwrap();
        assert_eq!(hamming(&a, &b), 4);
        assert!(are_similar(&a, &b, 4));
        assert!(!are_similar(&a, &b, 3));
    }

    #[test]
    fn test_wider_hashes() {
        let h = build_simhash(CHECKOUT, 128);
        assert_eq!(h.bits(), 128);
        assert_eq!(h.to_hex().len(), 32);
        assert_eq!(Simhash::from_hex(&h.to_hex()), Some(h));
    }

    #[test]
    fn test_record_text_layout() {
        let record = crate::core::TestCaseRecord::new("Valid login", "Login").with_steps(vec![
            crate::core::Step::new(1, "Enter user")
                .with_data("alice")
                .with_expected("accepted"),
        ]);
        let text = record_text(&record);
        assert_eq!(text, "Valid login\u{1e}Login\u{1e}Enter user|alice|accepted");
    }

    #[test]
    fn test_empty_record_simhash_is_zero() {
        let record = crate::core::TestCaseRecord::default();
        assert!(simhash_for_record(&record, 64).is_zero());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_hamming_symmetric(a in "[a-z ]{0,40}", b in "[a-z ]{0,40}") {
                let ha = build_simhash(&a, 64);
                let hb = build_simhash(&b, 64);
                prop_assert_eq!(hamming(&ha, &hb), hamming(&hb, &ha));
                prop_assert_eq!(hamming(&ha, &ha), 0);
            }

            #[test]
            fn prop_hex_roundtrip(text in "[a-z ]{0,40}") {
                let h = build_simhash(&text, 64);
                prop_assert_eq!(Simhash::from_hex(&h.to_hex()), Some(h));
            }
        }
    }
}
