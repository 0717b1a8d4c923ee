//! Reversibility of substitution over generated text.

use masque_detect::PatternDetector;
use masque_privacy::{anonymize, deanonymize};
use proptest::prelude::*;

/// Plain words mixed with emails, phone numbers and fiscal codes.
fn arb_token() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => "[a-z]{1,8}",
        1 => "[a-z]{3,8}@[a-z]{3,8}\\.(com|it|org)",
        1 => "\\+39 3[0-9]{2} [0-9]{3} [0-9]{4}",
        1 => "[1-9][0-9]{6,11}",
        1 => "[A-Z]{6}[0-9]{2}[A-Z][0-9]{2}[A-Z][0-9]{3}[A-Z]",
    ]
}

fn arb_text() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_token(), 0..16).prop_map(|tokens| tokens.join(" "))
}

proptest! {
    #[test]
    fn deanonymize_restores_anonymized_text(text in arb_text()) {
        let spans = PatternDetector::new().detect(&text);
        let (anonymized, mapping) = anonymize(&text, &spans, |_| false);

        prop_assert_eq!(mapping.len(), spans.len());
        for span in &spans {
            prop_assert!(
                mapping.iter().any(|(_, original)| original == span.text),
                "{:?} missing from mapping",
                span.text
            );
        }
        prop_assert_eq!(deanonymize(&anonymized, &mapping), text);
    }

    #[test]
    fn allowed_spans_stay_in_place(text in arb_text()) {
        let spans = PatternDetector::new().detect(&text);
        let (anonymized, mapping) = anonymize(&text, &spans, |_| true);

        prop_assert!(mapping.is_empty());
        prop_assert_eq!(anonymized, text);
    }
}
