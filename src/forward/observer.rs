use tracing::{debug, info, warn};

use crate::grouping::DomainGroup;
use crate::mx::MxError;
use crate::recipients::MatchedDestination;
use crate::transport::{SmtpReply, TransportError};

use super::{DeliveryOutcome, TransactionOutcome};

/// Hook points fired by the [`Forwarder`](super::Forwarder).
///
/// Every method defaults to a no-op. Group hooks run on the delivery task
/// of that group, so implementations must tolerate concurrent calls.
pub trait ForwardObserver: Send + Sync {
    fn no_recipients_matched(&self, _recipients: &[String]) {}

    fn recipient_matched(&self, _matched: &MatchedDestination) {}

    fn mx_lookup_failed(&self, _domain: &str, _error: &MxError) {}

    fn group_delivered(&self, _group: &DomainGroup, _host: &str, _reply: &SmtpReply) {}

    fn group_failed(&self, _group: &DomainGroup, _outcome: &DeliveryOutcome) {}

    fn disconnect_failed(&self, _domain: &str, _error: &TransportError) {}

    fn transaction_completed(&self, _outcome: &TransactionOutcome) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ForwardObserver for NoopObserver {}

/// Reports forwarding events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ForwardObserver for TracingObserver {
    fn no_recipients_matched(&self, recipients: &[String]) {
        warn!(?recipients, "no alias rule matched, message refused");
    }

    fn recipient_matched(&self, matched: &MatchedDestination) {
        info!(
            recipient = %matched.original_recipient,
            pattern = matched.rule.pattern(),
            forward = %matched.destination(),
            "recipient matched"
        );
    }

    fn mx_lookup_failed(&self, domain: &str, error: &MxError) {
        warn!(domain, "MX lookup failed: {error}");
    }

    fn group_delivered(&self, group: &DomainGroup, host: &str, reply: &SmtpReply) {
        info!(
            domain = %group.domain,
            host,
            recipients = group.destinations.len(),
            %reply,
            "message forwarded"
        );
    }

    fn group_failed(&self, group: &DomainGroup, outcome: &DeliveryOutcome) {
        warn!(domain = %group.domain, recipients = ?group.recipient_addresses(), "forwarding failed: {outcome}");
    }

    fn disconnect_failed(&self, domain: &str, error: &TransportError) {
        debug!(domain, "disconnect failed: {error}");
    }

    fn transaction_completed(&self, outcome: &TransactionOutcome) {
        let response = outcome.response();
        match outcome {
            TransactionOutcome::Delivered { groups } => {
                let failed = groups.iter().filter(|r| !r.outcome.is_delivered()).count();
                if failed > 0 {
                    warn!(failed, total = groups.len(), "message partially forwarded");
                }
                info!(%response, "transaction completed");
            }
            TransactionOutcome::InvalidMessage(reason) => {
                warn!(%response, "message unreadable: {reason}");
            }
            TransactionOutcome::Cancelled => warn!(%response, "transaction cancelled"),
            _ => info!(%response, "transaction completed"),
        }
    }
}
