//! Exact and loose identity fingerprints.
//!
//! The canonical core tuple has fixed keys `{section, title, steps, expected,
//! data, preconditions}`, each value normalized. `steps` joins the normalized
//! step actions with `|`, so reordering steps changes identity. The tuple is
//! written as JSON with keys in sorted order and hashed with SHA-256; the
//! digest is returned as lowercase hex. The loose tuple drops `expected` and
//! `data`.
//!
//! The legacy signature is a 32-bit FNV-1a over module, title and actions.
//! It only exists to recognise records written before fingerprints existed.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use super::canonical::normalize;
use super::simhash::{fnv1a32, simhash_for_record};
use crate::core::{DedupMetadata, TestCaseRecord};

/// Keys dropped from the loose tuple.
const LOOSE_EXCLUDED: [&str; 2] = ["expected", "data"];

/// Encodes a byte slice as a lowercase hexadecimal string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX_CHARS[(b >> 4) as usize] as char);
        out.push(HEX_CHARS[(b & 0x0f) as usize] as char);
    }
    out
}

/// Normalized `|`-joined step actions.
pub fn normalized_actions(record: &TestCaseRecord) -> String {
    record
        .steps
        .iter()
        .map(|s| normalize(&s.action))
        .collect::<Vec<_>>()
        .join("|")
}

/// The canonical core tuple, keyed in sorted order.
pub fn canonical_tuple(record: &TestCaseRecord) -> BTreeMap<&'static str, String> {
    let mut tuple = BTreeMap::new();
    tuple.insert("section", normalize(&record.module));
    tuple.insert("title", normalize(&record.title));
    tuple.insert("steps", normalized_actions(record));
    tuple.insert("expected", normalize(&record.effective_expected()));
    tuple.insert("data", normalize(&record.effective_test_data()));
    tuple.insert("preconditions", normalize(&record.preconditions));
    tuple
}

/// Serialize a tuple as compact JSON. Iteration order of the `BTreeMap` fixes
/// the key order; string escaping goes through `serde_json`.
fn canonical_json(tuple: &BTreeMap<&'static str, String>) -> String {
    let body = tuple
        .iter()
        .map(|(key, value)| {
            format!(
                "{}:{}",
                serde_json::Value::from(*key),
                serde_json::Value::from(value.as_str())
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{}}}", body)
}

/// Canonical string hashed by [`fingerprint`].
pub fn canonical_string(record: &TestCaseRecord) -> String {
    canonical_json(&canonical_tuple(record))
}

/// Canonical string hashed by [`loose_fingerprint`].
pub fn loose_canonical_string(record: &TestCaseRecord) -> String {
    let mut tuple = canonical_tuple(record);
    for key in LOOSE_EXCLUDED {
        tuple.remove(key);
    }
    canonical_json(&tuple)
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Exact identity fingerprint (64 hex chars).
pub fn fingerprint(record: &TestCaseRecord) -> String {
    sha256_hex(&canonical_string(record))
}

/// Loose identity fingerprint: ignores expected result and test data.
pub fn loose_fingerprint(record: &TestCaseRecord) -> String {
    sha256_hex(&loose_canonical_string(record))
}

/// Non-cryptographic signature used by records that predate fingerprints.
pub fn legacy_signature(record: &TestCaseRecord) -> String {
    let key = format!(
        "{}|{}|{}",
        normalize(&record.module),
        normalize(&record.title),
        normalized_actions(record)
    );
    format!("{:08x}", fnv1a32(key.as_bytes(), 0))
}

/// Compute fresh fingerprints and SimHash for a record.
///
/// A legacy signature already on the record is carried over unchanged; new
/// records never get one.
pub fn compute_metadata(record: &TestCaseRecord, simhash_bits: usize) -> DedupMetadata {
    DedupMetadata {
        fingerprint: Some(fingerprint(record)),
        loose_fingerprint: Some(loose_fingerprint(record)),
        simhash: Some(simhash_for_record(record, simhash_bits).to_hex()),
        legacy_signature: record.dedup.legacy_signature.clone(),
    }
}

/// Replace a record's metadata with freshly computed values.
pub fn attach_metadata(record: &mut TestCaseRecord, simhash_bits: usize) {
    record.dedup = compute_metadata(record, simhash_bits);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Step;

    fn login() -> TestCaseRecord {
        TestCaseRecord::new("Valid login", "Login")
            .with_actions(["Enter user", "Enter pass", "Click Login"])
            .with_expected("Redirect to dashboard")
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        let fp = fingerprint(&login());
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_canonical_string_key_order() {
        let s = canonical_string(&login());
        assert!(s.starts_with("{\"data\":"));
        let positions: Vec<usize> = ["data", "expected", "preconditions", "section", "steps", "title"]
            .iter()
            .map(|k| s.find(&format!("\"{}\":", k)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(s.contains("\"steps\":\"enter user|enter pass|click login\""));
    }

    #[test]
    fn test_ids_and_timestamps_do_not_affect_identity() {
        let a = login().with_id("a").with_created_at(chrono::Utc::now());
        let b = login().with_id("b");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_formatting_differences_ignored() {
        let a = login();
        let b = TestCaseRecord::new("  VALID   login ", "login")
            .with_actions(["enter USER", "Enter  pass", "click login"])
            .with_expected("redirect to   Dashboard");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_key_order_of_input_json_irrelevant() {
        let a: TestCaseRecord = serde_json::from_str(
            r#"{"title":"Valid login","module":"Login","steps":["Enter user"],"expectedResult":"ok"}"#,
        )
        .unwrap();
        let b: TestCaseRecord = serde_json::from_str(
            r#"{"expectedResult":"ok","steps":["Enter user"],"module":"Login","title":"Valid login"}"#,
        )
        .unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&b));

        let reserialized: TestCaseRecord =
            serde_json::from_str(&serde_json::to_string(&a).unwrap()).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&reserialized));
    }

    #[test]
    fn test_identity_sensitivity() {
        let base = login();
        let base_fp = fingerprint(&base);

        let mut changed = base.clone();
        changed.title = "Invalid login".to_string();
        assert_ne!(fingerprint(&changed), base_fp);

        let mut changed = base.clone();
        changed.module = "Auth".to_string();
        assert_ne!(fingerprint(&changed), base_fp);

        let mut changed = base.clone();
        changed.steps[1].action = "Enter password".to_string();
        assert_ne!(fingerprint(&changed), base_fp);

        let mut changed = base.clone();
        changed.expected_result = "Error shown".to_string();
        assert_ne!(fingerprint(&changed), base_fp);

        let mut changed = base.clone();
        changed.test_data = "user=bob".to_string();
        assert_ne!(fingerprint(&changed), base_fp);

        let mut changed = base.clone();
        changed.preconditions = "User exists".to_string();
        assert_ne!(fingerprint(&changed), base_fp);
    }

    #[test]
    fn test_reordered_steps_change_identity() {
        let a = login();
        let b = TestCaseRecord::new("Valid login", "Login")
            .with_actions(["Enter pass", "Enter user", "Click Login"])
            .with_expected("Redirect to dashboard");
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_loose_ignores_expected_and_data() {
        let a = login();
        let mut b = login();
        b.expected_result = "Something else".to_string();
        b.test_data = "other data".to_string();

        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(loose_fingerprint(&a), loose_fingerprint(&b));

        b.preconditions = "Logged out".to_string();
        assert_ne!(loose_fingerprint(&a), loose_fingerprint(&b));
    }

    #[test]
    fn test_step_expectations_feed_identity_when_record_has_none() {
        let a = TestCaseRecord::new("t", "m")
            .with_steps(vec![Step::new(1, "do").with_expected("done")]);
        let b = TestCaseRecord::new("t", "m")
            .with_steps(vec![Step::new(1, "do").with_expected("not done")]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(loose_fingerprint(&a), loose_fingerprint(&b));
    }

    #[test]
    fn test_malformed_record_still_fingerprints() {
        let empty = TestCaseRecord::default();
        let fp = fingerprint(&empty);
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, fingerprint(&TestCaseRecord::default()));
    }

    #[test]
    fn test_legacy_signature_shape() {
        let sig = legacy_signature(&login());
        assert_eq!(sig.len(), 8);
        let mut other = login();
        other.expected_result = "different".to_string();
        assert_eq!(sig, legacy_signature(&other));
    }

    #[test]
    fn test_compute_metadata_keeps_legacy_signature() {
        let mut record = login();
        record.dedup.legacy_signature = Some("deadbeef".to_string());
        attach_metadata(&mut record, 64);
        assert!(record.dedup.is_complete());
        assert_eq!(record.dedup.legacy_signature.as_deref(), Some("deadbeef"));
        assert_eq!(record.dedup.simhash.as_ref().map(String::len), Some(16));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_record() -> impl Strategy<Value = TestCaseRecord> {
            (
                "[A-Za-z ]{0,20}",
                "[A-Za-z]{0,10}",
                prop::collection::vec("[A-Za-z ]{1,15}", 0..5),
                "[A-Za-z ]{0,20}",
            )
                .prop_map(|(title, module, actions, expected)| {
                    TestCaseRecord::new(title, module)
                        .with_actions(actions)
                        .with_expected(expected)
                })
        }

        proptest! {
            #[test]
            fn prop_fingerprint_deterministic(record in arb_record()) {
                prop_assert_eq!(fingerprint(&record), fingerprint(&record.clone()));
                prop_assert_eq!(loose_fingerprint(&record), loose_fingerprint(&record));
            }

            #[test]
            fn prop_fingerprint_survives_json_roundtrip(record in arb_record()) {
                let json = serde_json::to_string(&record).unwrap();
                let back: TestCaseRecord = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(fingerprint(&record), fingerprint(&back));
            }
        }
    }
}
