//! Per-recipient rule matching with deduplication.

use std::collections::HashSet;

use thiserror::Error;

use crate::rules::{AliasRule, RuleSet};
use crate::validator::Mailbox;

/// One inbound transaction as handed over by the inbound protocol server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundTransaction {
    /// Envelope sender. Empty for the null sender.
    pub sender: String,
    pub recipients: Vec<String>,
    pub message: Vec<u8>,
}

impl InboundTransaction {
    pub fn new(
        sender: impl Into<String>,
        recipients: impl IntoIterator<Item = impl Into<String>>,
        message: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipients: recipients.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }
}

/// An inbound recipient and the rule that claimed it.
#[derive(Debug, Clone)]
pub struct MatchedDestination {
    pub original_recipient: String,
    pub rule: AliasRule,
}

impl MatchedDestination {
    pub fn destination(&self) -> &Mailbox {
        self.rule.destination()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// None of the recipients matched a rule: the message is not for us.
    #[error("no recipients matched any alias rule")]
    NoRecipientsMatched,
}

/// Matches every recipient against `rules`.
///
/// Recipients are processed once each (case-insensitive), and when several
/// recipients resolve to the same destination mailbox only the first one is
/// kept so that a message is never sent twice to the same mailbox.
pub fn resolve_recipients<S: AsRef<str>>(
    rules: &RuleSet,
    recipients: &[S],
) -> Result<Vec<MatchedDestination>, ResolveError> {
    let mut seen_recipients = HashSet::new();
    let mut seen_destinations = HashSet::new();
    let mut matched = Vec::new();

    for recipient in recipients {
        let recipient = recipient.as_ref().trim();
        if recipient.is_empty() || !seen_recipients.insert(recipient.to_lowercase()) {
            continue;
        }
        let Some(rule) = rules.find(recipient) else {
            continue;
        };
        if !seen_destinations.insert(rule.destination().key()) {
            continue;
        }
        matched.push(MatchedDestination {
            original_recipient: recipient.to_string(),
            rule: rule.clone(),
        });
    }

    if matched.is_empty() {
        Err(ResolveError::NoRecipientsMatched)
    } else {
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)]) -> RuleSet {
        RuleSet::from_pairs(pairs.iter().copied()).expect("rules compile")
    }

    #[test]
    fn no_match_is_reported() {
        let rules = rules(&[("someone.*@alias-domain.com", "target@target-domain.com")]);
        let err = resolve_recipients(&rules, &["noone@alias-domain.com"]).unwrap_err();
        assert_eq!(err, ResolveError::NoRecipientsMatched);
    }

    #[test]
    fn empty_recipient_list_is_no_match() {
        let rules = rules(&[("*", "target@x.com")]);
        let none: [&str; 0] = [];
        assert!(resolve_recipients(&rules, &none).is_err());
    }

    #[test]
    fn duplicate_recipients_processed_once() {
        let rules = rules(&[("a@alias.com", "t1@x.com"), ("*@alias.com", "t2@x.com")]);
        let matched =
            resolve_recipients(&rules, &["A@alias.com", "a@ALIAS.com", "b@alias.com"]).unwrap();
        let recipients: Vec<_> = matched.iter().map(|m| m.original_recipient.as_str()).collect();
        assert_eq!(recipients, ["A@alias.com", "b@alias.com"]);
    }

    #[test]
    fn destinations_deduplicated_first_wins() {
        let rules = rules(&[("*@alias-domain.com", "target@x.com")]);
        let matched = resolve_recipients(
            &rules,
            &["a@alias-domain.com", "b@alias-domain.com", "c@alias-domain.com"],
        )
        .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].original_recipient, "a@alias-domain.com");
        assert_eq!(matched[0].destination().address(), "target@x.com");
    }

    #[test]
    fn destination_dedup_ignores_case() {
        let rules = rules(&[("a@alias.com", "Target@x.com"), ("b@alias.com", "target@X.com")]);
        let matched = resolve_recipients(&rules, &["a@alias.com", "b@alias.com"]).unwrap();
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn unmatched_recipients_are_skipped() {
        let rules = rules(&[("someone.*@alias-domain.com", "target@target-domain.com")]);
        let matched = resolve_recipients(
            &rules,
            &["stranger@elsewhere.com", "someone.awesome@alias-domain.com"],
        )
        .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].original_recipient, "someone.awesome@alias-domain.com");
    }
}
