//! Property-based tests for pair canonicalization and channel naming.
//!
//! 1. `PairKey::new(a, b) == PairKey::new(b, a)` for any ids
//! 2. The stored order is always low <= high
//! 3. Sanitized channel names always pass validation

use huddle_proto::{PairKey, is_valid_channel_name, sanitize_channel_name};
use proptest::prelude::*;

/// Opaque identity ids: anything printable, including unicode.
fn identity_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[^\0]{0,40}").expect("valid regex")
}

proptest! {
    #[test]
    fn pair_is_symmetric(a in identity_strategy(), b in identity_strategy()) {
        prop_assert_eq!(PairKey::new(&a, &b), PairKey::new(&b, &a));
        prop_assert_eq!(PairKey::new(&a, &b).as_key(), PairKey::new(&b, &a).as_key());
    }

    #[test]
    fn pair_is_ordered(a in identity_strategy(), b in identity_strategy()) {
        let pair = PairKey::new(&a, &b);
        prop_assert!(pair.low() <= pair.high());
        prop_assert!(pair.contains(&a));
        prop_assert!(pair.contains(&b));
    }

    #[test]
    fn other_side_is_consistent(a in identity_strategy(), b in identity_strategy()) {
        let pair = PairKey::new(&a, &b);
        prop_assert_eq!(pair.other(&a), Some(b.as_str()));
        prop_assert_eq!(pair.is_self_pair(), a == b);
    }

    #[test]
    fn sanitized_channels_are_valid(raw in "[^\0]{1,120}") {
        if let Some(name) = sanitize_channel_name(&raw) {
            prop_assert!(is_valid_channel_name(&name));
        }
    }
}
