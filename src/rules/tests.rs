use proptest::prelude::*;

use super::types::wildcard_to_regex;
use super::{AliasRule, RuleError, RuleSet};

fn rule(pattern: &str, destination: &str) -> AliasRule {
    AliasRule::new(pattern, destination).expect("valid rule")
}

#[test]
fn wildcard_prefix_semantics() {
    let r = rule("a*@b.com", "target@x.com");
    assert!(r.matches("a@b.com"));
    assert!(r.matches("axyz@b.com"));
    assert!(!r.matches("ba@b.com"));
    assert!(!r.matches("a@c.com"));
}

#[test]
fn matching_ignores_case() {
    let r = rule("someone.*@alias-domain.com", "target@target-domain.com");
    assert!(r.matches("SomeOne.Awesome@ALIAS-domain.com"));
}

#[test]
fn surrounding_whitespace_does_not_match() {
    let r = rule("a@b.com", "target@x.com");
    assert!(r.matches("a@b.com"));
    assert!(!r.matches(" a@b.com"));
    assert!(!r.matches("a@b.com\t"));
}

#[test]
fn dots_match_literally() {
    let r = rule("first.last@example.com", "target@x.com");
    assert!(r.matches("first.last@example.com"));
    assert!(!r.matches("firstxlast@example.com"));
}

#[test]
fn regex_metacharacters_are_escaped() {
    let r = rule("a+b(1)?@x.com", "target@x.com");
    assert!(r.matches("a+b(1)?@x.com"));
    assert!(!r.matches("aab1@x.com"));
    assert_eq!(wildcard_to_regex("a+*@x.com"), r"^a\+.*@x\.com$");
}

#[test]
fn star_alone_matches_everything() {
    let r = rule("*", "target@x.com");
    assert!(r.matches(""));
    assert!(r.matches("anyone@anywhere.org"));
}

#[test]
fn first_match_wins() {
    let rules = RuleSet::from_pairs([
        ("someone.*@alias-domain.com", "target1@x.com"),
        ("*@alias-domain.com", "target2@x.com"),
    ])
    .expect("rules compile");

    let hit = rules.find("someone.testing@alias-domain.com").expect("match");
    assert_eq!(hit.destination().address(), "target1@x.com");

    let fallback = rules.find("other@alias-domain.com").expect("match");
    assert_eq!(fallback.destination().address(), "target2@x.com");

    assert!(rules.find("someone@elsewhere.com").is_none());
}

#[test]
fn invalid_destination_is_rejected() {
    let err = AliasRule::new("*@alias-domain.com", "not-an-address").unwrap_err();
    assert!(matches!(err, RuleError::Destination { .. }));
}

#[test]
fn empty_pattern_is_rejected() {
    let err = AliasRule::new("  ", "target@x.com").unwrap_err();
    assert!(matches!(err, RuleError::EmptyPattern));
}

#[test]
fn rule_set_reports_failing_index() {
    let err = RuleSet::from_pairs([("*@a.com", "ok@x.com"), ("*@b.com", "broken")]).unwrap_err();
    match err {
        RuleError::InRuleSet { index, .. } => assert_eq!(index, 1),
        other => panic!("expected indexed error, got {other:?}"),
    }
}

proptest! {
    #[test]
    fn literal_pattern_matches_itself_in_any_case(local in "[a-z0-9.+_-]{1,20}", domain in "[a-z]{1,10}\\.[a-z]{2,4}") {
        let address = format!("{local}@{domain}");
        let r = AliasRule::new(&address, "target@x.com").expect("literal pattern compiles");
        prop_assert!(r.matches(&address));
        prop_assert!(r.matches(&address.to_uppercase()));
        let prefixed = format!("z{address}");
        prop_assert!(!r.matches(&prefixed));
    }

    #[test]
    fn trailing_star_matches_any_suffix(prefix in "[a-z]{1,8}", suffix in "[a-z0-9@.]{0,16}") {
        let r = AliasRule::new(&format!("{prefix}*"), "target@x.com").expect("compiles");
        let candidate = format!("{prefix}{suffix}");
        prop_assert!(r.matches(&candidate));
    }
}
