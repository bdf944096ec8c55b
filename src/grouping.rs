//! Partitioning of matched destinations by mail domain.

use crate::recipients::MatchedDestination;
use crate::validator::Mailbox;

/// Destinations sharing one mail domain, delivered over one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainGroup {
    /// Lowercase ASCII domain.
    pub domain: String,
    pub destinations: Vec<Mailbox>,
}

impl DomainGroup {
    /// Envelope addresses for `RCPT TO`.
    pub fn recipient_addresses(&self) -> Vec<String> {
        self.destinations.iter().map(Mailbox::address).collect()
    }
}

/// Groups destinations by domain, in order of first appearance.
///
/// Destinations already deduplicated upstream stay unique; a repeated
/// mailbox (case-insensitive) is dropped here as well.
pub fn group_by_domain(matched: &[MatchedDestination]) -> Vec<DomainGroup> {
    let mut groups: Vec<DomainGroup> = Vec::new();

    for destination in matched.iter().map(MatchedDestination::destination) {
        let domain = destination.domain();
        let index = match groups.iter().position(|g| g.domain == domain) {
            Some(index) => index,
            None => {
                groups.push(DomainGroup {
                    domain: domain.to_string(),
                    destinations: Vec::new(),
                });
                groups.len() - 1
            }
        };
        let group = &mut groups[index];
        if group.destinations.iter().all(|d| d.key() != destination.key()) {
            group.destinations.push(destination.clone());
        }
    }

    groups
}
