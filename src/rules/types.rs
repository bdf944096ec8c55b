use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::validator::{Mailbox, ValidationMode};

use super::RuleError;

/// A single `pattern -> destination` mapping.
///
/// `pattern` is a case-insensitive wildcard over the whole address: `*`
/// matches any run of characters (including none), everything else matches
/// literally. It is compiled once, at construction.
#[derive(Debug, Clone)]
pub struct AliasRule {
    pattern: String,
    matcher: Regex,
    destination: Mailbox,
}

impl AliasRule {
    pub fn new(pattern: &str, destination: &str) -> Result<Self, RuleError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(RuleError::EmptyPattern);
        }
        let matcher = compile_wildcard(pattern)?;
        let destination = Mailbox::parse(destination, ValidationMode::Strict)
            .map_err(|source| RuleError::destination(pattern, source))?;
        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
            destination,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn destination(&self) -> &Mailbox {
        &self.destination
    }

    /// Matches `address` exactly as given; callers normalize it first.
    pub fn matches(&self, address: &str) -> bool {
        self.matcher.is_match(address)
    }
}

impl fmt::Display for AliasRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.pattern, self.destination)
    }
}

/// Escapes every regex metacharacter, turns `*` into `.*` and anchors the
/// result to the full address.
pub(crate) fn wildcard_to_regex(pattern: &str) -> String {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{body}$")
}

fn compile_wildcard(pattern: &str) -> Result<Regex, RuleError> {
    RegexBuilder::new(&wildcard_to_regex(pattern))
        .case_insensitive(true)
        .build()
        .map_err(|source| RuleError::pattern(pattern, source))
}

/// Ordered alias rules. Declaration order is priority order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<AliasRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<AliasRule>) -> Self {
        Self { rules }
    }

    /// Compiles `(pattern, destination)` pairs in order, failing on the
    /// first invalid one.
    pub fn from_pairs<I, P, D>(pairs: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = (P, D)>,
        P: AsRef<str>,
        D: AsRef<str>,
    {
        let rules = pairs
            .into_iter()
            .enumerate()
            .map(|(index, (pattern, destination))| {
                AliasRule::new(pattern.as_ref(), destination.as_ref())
                    .map_err(|err| RuleError::in_rule_set(index, err))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// First rule, in declaration order, matching `address`.
    pub fn find(&self, address: &str) -> Option<&AliasRule> {
        self.rules.iter().find(|rule| rule.matches(address))
    }

    pub fn is_match(&self, address: &str) -> bool {
        self.find(address).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AliasRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a AliasRule;
    type IntoIter = std::slice::Iter<'a, AliasRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
