//! Text normalization feeding every hash and tokenizer.

/// Lower-case, collapse whitespace runs to a single space, trim.
///
/// Total and idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// [`normalize`] for optional text; `None` is the empty string.
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("  Valid   LOGIN\t\nflow "), "valid login flow");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\t"), "");
        assert_eq!(normalize_opt(None), "");
    }

    #[test]
    fn test_normalize_keeps_punctuation() {
        assert_eq!(normalize("Click 'Login'!"), "click 'login'!");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_normalize_idempotent(text in "[a-zA-Z0-9 \\t\\n.,!?'-]{0,64}") {
                let once = normalize(&text);
                prop_assert_eq!(normalize(&once), once);
            }

            #[test]
            fn prop_whitespace_insensitive(words in prop::collection::vec("[a-zA-Z]{1,8}", 0..6)) {
                let tight = words.join(" ");
                let loose = format!("  {}  ", words.join(" \t  "));
                prop_assert_eq!(normalize(&tight), normalize(&loose));
            }
        }
    }
}
