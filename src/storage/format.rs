//! Display formatting for issued numbers and default counter templates.

use serde::{Deserialize, Serialize};

/// Pad width used when a counter is created without an explicit template.
pub const DEFAULT_PAD_WIDTH: u32 = 6;

/// Prefix used when nothing usable can be derived from the name.
pub const FALLBACK_PREFIX: &str = "NS";

/// Maximum number of characters taken from the name for a derived prefix.
const DERIVED_PREFIX_LEN: usize = 3;

/// Shape of a freshly created counter row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterTemplate {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default = "default_pad_width")]
    pub pad_width: u32,
}

fn default_pad_width() -> u32 {
    DEFAULT_PAD_WIDTH
}

impl CounterTemplate {
    /// Template with a prefix derived from `name`, no suffix, width 6.
    pub fn derived(name: &str) -> Self {
        Self {
            prefix: derive_prefix(name),
            suffix: String::new(),
            pad_width: DEFAULT_PAD_WIDTH,
        }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: String::new(),
            pad_width: DEFAULT_PAD_WIDTH,
        }
    }
}

/// Zero-pads `value` to at least `pad_width` ASCII digits and wraps it in
/// `prefix`/`suffix`. Values wider than `pad_width` are never truncated.
pub fn format_number(value: u64, pad_width: u32, prefix: &str, suffix: &str) -> String {
    let width = pad_width.max(1) as usize;
    format!("{prefix}{value:0>width$}{suffix}")
}

/// Derives a display prefix from a sequence name.
///
/// Up to the first 3 alphabetic characters, uppercased. Names with no
/// alphabetic characters fall back to their first 3 characters, and an
/// empty name yields [`FALLBACK_PREFIX`].
pub fn derive_prefix(name: &str) -> String {
    let letters: String = name
        .chars()
        .filter(|c| c.is_alphabetic())
        .take(DERIVED_PREFIX_LEN)
        .flat_map(char::to_uppercase)
        .collect();
    if !letters.is_empty() {
        return letters;
    }

    let raw: String = name.chars().take(DERIVED_PREFIX_LEN).collect();
    if raw.is_empty() {
        FALLBACK_PREFIX.to_string()
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_width() {
        assert_eq!(format_number(1, 6, "S", ""), "S000001");
        assert_eq!(format_number(42, 4, "INV-", "/26"), "INV-0042/26");
    }

    #[test]
    fn wide_values_grow_the_string() {
        assert_eq!(format_number(1_234_567, 6, "S", ""), "S1234567");
        assert_eq!(format_number(u64::MAX, 1, "", ""), u64::MAX.to_string());
    }

    #[test]
    fn zero_width_behaves_like_one() {
        assert_eq!(format_number(7, 0, "", ""), "7");
    }

    #[test]
    fn empty_prefix_and_suffix() {
        assert_eq!(format_number(12, 3, "", ""), "012");
    }

    #[test]
    fn derives_from_leading_letters() {
        assert_eq!(derive_prefix("SalesInvoice"), "SAL");
        assert_eq!(derive_prefix("Customer"), "CUS");
        assert_eq!(derive_prefix("CashTransaction"), "CAS");
        assert_eq!(derive_prefix("CustomerTransaction"), "CUS");
    }

    #[test]
    fn skips_non_alphabetic_characters() {
        assert_eq!(derive_prefix("2024-invoice"), "INV");
        assert_eq!(derive_prefix("a1b2"), "AB");
    }

    #[test]
    fn falls_back_to_raw_characters() {
        assert_eq!(derive_prefix("12345"), "123");
        assert_eq!(derive_prefix("--"), "--");
    }

    #[test]
    fn empty_name_uses_fallback() {
        assert_eq!(derive_prefix(""), FALLBACK_PREFIX);
    }

    #[test]
    fn derived_template_defaults() {
        let t = CounterTemplate::derived("Product");
        assert_eq!(t.prefix, "PRO");
        assert_eq!(t.suffix, "");
        assert_eq!(t.pad_width, DEFAULT_PAD_WIDTH);
    }

    #[test]
    fn template_deserializes_with_defaults() {
        let t: CounterTemplate = serde_json::from_str(r#"{"prefix":"S"}"#).unwrap();
        assert_eq!(t, CounterTemplate::with_prefix("S"));
    }
}
