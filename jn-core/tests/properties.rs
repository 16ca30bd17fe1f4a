//! Property-based tests for the invariants spec.md §8.1 calls out by name:
//! address round-trip, left-fold merge order, and specificity ordering.

use jn_core::address::parse;
use jn_core::plugin::{compile_matches, specificity, Tier};
use jn_core::profile::{deep_merge, merge_chain};
use proptest::prelude::*;
use serde_json::{json, Value};

fn simple_path_segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,8}".prop_map(|s| s)
}

proptest! {
    /// Any file-style address with a plain extension round-trips through
    /// `canonical()` with its structural fields intact.
    #[test]
    fn file_address_round_trips(name in simple_path_segment(), ext in "[a-z]{2,4}") {
        let raw = format!("{name}.{ext}");
        let a = parse(&raw).unwrap();
        let b = parse(&a.canonical()).unwrap();
        prop_assert_eq!(a.kind, b.kind);
        prop_assert_eq!(a.path, b.path);
        prop_assert_eq!(a.format_hint, b.format_hint);
        prop_assert_eq!(a.compression, b.compression);
    }

    /// Profile addresses with arbitrary namespace/name/query round-trip.
    #[test]
    fn profile_address_round_trips(ns in simple_path_segment(), name in simple_path_segment(), key in simple_path_segment(), value in "[a-zA-Z0-9]{1,10}") {
        let raw = format!("@{ns}/{name}?{key}={value}");
        let a = parse(&raw).unwrap();
        let b = parse(&a.canonical()).unwrap();
        prop_assert_eq!(a.profile_ref, b.profile_ref);
        prop_assert_eq!(a.parameters, b.parameters);
    }

    /// `merge_chain` is always equal to folding `deep_merge` left to right,
    /// regardless of how many documents are chained (spec.md §4.2, the
    /// merge is `(a ⊕ b) ⊕ c`, never right-associative).
    #[test]
    fn merge_chain_matches_explicit_left_fold(
        a_val in 0i64..100,
        b_val in 0i64..100,
        c_val in 0i64..100,
    ) {
        let a = json!({"x": a_val, "shared": "a"});
        let b = json!({"y": b_val, "shared": "b"});
        let c = json!({"z": c_val, "shared": "c"});

        let chained = merge_chain([a.clone(), b.clone(), c.clone()]);
        let explicit = deep_merge(deep_merge(a, b), c);
        prop_assert_eq!(chained, explicit);
    }

    /// A pattern with strictly more literal characters than another scores
    /// strictly higher at the same tier (spec.md §4.3, "Specificity
    /// scoring"), independent of which literal characters they are.
    #[test]
    fn more_literal_chars_scores_higher(extra in "[a-zA-Z0-9]{1,6}") {
        let short = specificity("x", Tier::Bundled);
        let long = specificity(&format!("x{extra}"), Tier::Bundled);
        prop_assert!(long > short);
    }

    /// Registry ordering never places a lower-tier plugin ahead of a
    /// higher-tier plugin once both match with identical pattern
    /// specificity (spec.md §4.3, tier tie-break).
    #[test]
    fn project_tier_outranks_bundled_when_pattern_ties(pattern in "[a-z]{3,6}") {
        let (bundled_matches, _) = compile_matches(&[pattern.clone()], Tier::Bundled);
        let (project_matches, _) = compile_matches(&[pattern], Tier::Project);
        prop_assert!(project_matches[0].specificity > bundled_matches[0].specificity);
    }
}

#[test]
fn deep_merge_is_associative_on_disjoint_keys() {
    let a: Value = json!({"a": 1});
    let b: Value = json!({"b": 2});
    let c: Value = json!({"c": 3});
    let left = deep_merge(deep_merge(a.clone(), b.clone()), c.clone());
    let right = deep_merge(a, deep_merge(b, c));
    assert_eq!(left, right);
}
