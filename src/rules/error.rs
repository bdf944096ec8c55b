use thiserror::Error;

use crate::validator::EmailError;

/// Errors raised while compiling alias rules.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("alias pattern is empty")]
    EmptyPattern,
    #[error("alias pattern '{pattern}' does not compile: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("forward address for pattern '{pattern}' is invalid: {source}")]
    Destination {
        pattern: String,
        #[source]
        source: EmailError,
    },
    #[error("rule #{index} is invalid: {source}")]
    InRuleSet {
        index: usize,
        #[source]
        source: Box<RuleError>,
    },
}

impl RuleError {
    pub(crate) fn pattern(pattern: &str, source: regex::Error) -> Self {
        Self::Pattern {
            pattern: pattern.to_string(),
            source,
        }
    }

    pub(crate) fn destination(pattern: &str, source: EmailError) -> Self {
        Self::Destination {
            pattern: pattern.to_string(),
            source,
        }
    }

    pub(crate) fn in_rule_set(index: usize, source: RuleError) -> Self {
        Self::InRuleSet {
            index,
            source: Box::new(source),
        }
    }
}
