//! Property tests for number formatting and sequence monotonicity.
//! Run with: cargo test --test property_tests

use std::sync::Arc;

use docseq::contracts::SequenceGenerator;
use docseq::storage::{
    derive_prefix, format_number, CounterTemplate, GeneratorConfig, MemorySequenceStore,
    StoreSequenceGenerator, FALLBACK_PREFIX,
};
use proptest::prelude::*;

// =============================================================================
// Formatting
// =============================================================================

proptest! {
    /// The digits parse back to the value and are never narrower than the padding.
    #[test]
    fn formatted_number_preserves_value(
        value in any::<u64>(),
        pad_width in 1u32..20,
        prefix in "[A-Z]{0,4}",
        suffix in "(/[0-9]{2})?",
    ) {
        let out = format_number(value, pad_width, &prefix, &suffix);

        prop_assert!(out.starts_with(&prefix));
        prop_assert!(out.ends_with(&suffix));

        let digits = &out[prefix.len()..out.len() - suffix.len()];
        prop_assert!(digits.len() >= pad_width as usize);
        prop_assert!(digits.chars().all(|c| c.is_ascii_digit()));
        prop_assert_eq!(digits.parse::<u64>().unwrap(), value);
    }

    /// A larger value never formats shorter than a smaller one.
    #[test]
    fn formatted_length_is_monotonic(a in any::<u64>(), b in any::<u64>(), pad_width in 1u32..12) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            format_number(lo, pad_width, "", "").len() <= format_number(hi, pad_width, "", "").len()
        );
    }

    /// Derived prefixes are short and non-empty, uppercase when the name has letters.
    #[test]
    fn derived_prefix_shape(name in "[ -~]{0,24}") {
        let prefix = derive_prefix(&name);

        prop_assert!(!prefix.is_empty());
        if name.is_empty() {
            prop_assert_eq!(prefix, FALLBACK_PREFIX);
        } else if name.chars().any(|c| c.is_ascii_alphabetic()) {
            prop_assert!(prefix.len() <= 3);
            prop_assert!(prefix.chars().all(|c| c.is_ascii_uppercase()));
        } else {
            prop_assert!(name.starts_with(&prefix));
        }
    }
}

// =============================================================================
// Sequences
// =============================================================================

/// Without failures, each next() advances the counter by exactly one.
fn prop_sequence_advances_by_one<G: SequenceGenerator>(gen: &G, name: &str, iterations: usize) {
    let mut prev = 0u64;
    for _ in 0..iterations {
        gen.next(name).expect("next() should not fail");
        let value = gen
            .current(name)
            .expect("current() should not fail")
            .expect("counter exists after next()")
            .current_value;
        assert_eq!(value, prev + 1, "Sequence {name} skipped from {prev} to {value}");
        prev = value;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn sequences_advance_by_one(name in "[A-Za-z][A-Za-z0-9]{0,15}", iterations in 1usize..50) {
        let gen = StoreSequenceGenerator::with_defaults(Arc::new(MemorySequenceStore::new()));
        prop_sequence_advances_by_one(&gen, &name, iterations);
    }

    #[test]
    fn issued_number_matches_template(
        prefix in "[A-Z]{1,4}",
        pad_width in 1u32..10,
        calls in 1u64..30,
    ) {
        let config = GeneratorConfig::default().with_template(
            "Doc",
            CounterTemplate { prefix: prefix.clone(), suffix: String::new(), pad_width },
        );
        let gen = StoreSequenceGenerator::new(Arc::new(MemorySequenceStore::new()), config);

        let last = (0..calls).map(|_| gen.next("Doc").unwrap()).last().unwrap();
        prop_assert_eq!(last, format_number(calls, pad_width, &prefix, ""));
    }
}
