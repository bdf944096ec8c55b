//! Forwarding of one inbound transaction to every matched destination.
//!
//! Recipients are matched against the [`RuleSet`], grouped by destination
//! domain, and each group is delivered on its own Tokio task with its own
//! [`Transport`]. Group failures are captured as [`DeliveryOutcome`]s and
//! folded into a single [`TransactionOutcome`].

mod observer;
mod types;

pub use observer::{ForwardObserver, NoopObserver, TracingObserver};
pub use types::{
    DeliveryOutcome, FailureClass, ForwardOptions, GroupResult, ResponseCode, TransactionOutcome,
};

use std::future::{self, Future};
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::grouping::{DomainGroup, group_by_domain};
use crate::message::ForwardMessage;
use crate::mx::{MxLookup, resolve_mx_hosts};
use crate::recipients::{InboundTransaction, resolve_recipients};
use crate::rules::RuleSet;
use crate::transport::{Transport, TransportFactory};

#[derive(Clone)]
pub struct Forwarder {
    rules: Arc<RuleSet>,
    resolver: Arc<dyn MxLookup>,
    transports: Arc<dyn TransportFactory>,
    observer: Arc<dyn ForwardObserver>,
    options: ForwardOptions,
}

impl Forwarder {
    pub fn new(
        rules: RuleSet,
        resolver: Arc<dyn MxLookup>,
        transports: Arc<dyn TransportFactory>,
        options: ForwardOptions,
    ) -> Self {
        Self {
            rules: Arc::new(rules),
            resolver,
            transports,
            observer: Arc::new(NoopObserver),
            options,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ForwardObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn options(&self) -> &ForwardOptions {
        &self.options
    }

    /// Forwards `transaction`, bounded by the configured message timeout.
    pub async fn forward(&self, transaction: &InboundTransaction) -> TransactionOutcome {
        self.forward_with_cancel(transaction, future::pending()).await
    }

    /// Like [`forward`](Self::forward), but also gives up as soon as
    /// `cancel` completes. In-flight deliveries are aborted and their
    /// connections dropped.
    pub async fn forward_with_cancel<F>(
        &self,
        transaction: &InboundTransaction,
        cancel: F,
    ) -> TransactionOutcome
    where
        F: Future<Output = ()>,
    {
        let outcome = self.run(transaction, cancel).await;
        self.observer.transaction_completed(&outcome);
        outcome
    }

    async fn run<F>(&self, transaction: &InboundTransaction, cancel: F) -> TransactionOutcome
    where
        F: Future<Output = ()>,
    {
        let Ok(matched) = resolve_recipients(&self.rules, &transaction.recipients) else {
            self.observer.no_recipients_matched(&transaction.recipients);
            return TransactionOutcome::NoRecipientsMatched;
        };
        for destination in &matched {
            self.observer.recipient_matched(destination);
        }

        let message = match ForwardMessage::parse(transaction.message.clone()) {
            Ok(message) => Arc::new(message),
            Err(err) => return TransactionOutcome::InvalidMessage(err.to_string()),
        };
        let sender: Arc<str> = Arc::from(transaction.sender.trim());

        let groups = group_by_domain(&matched);
        let mut tasks = JoinSet::new();
        for (index, group) in groups.iter().cloned().enumerate() {
            let delivery = GroupDelivery {
                resolver: Arc::clone(&self.resolver),
                transport: self.transports.create(),
                observer: Arc::clone(&self.observer),
                options: self.options.clone(),
                message: Arc::clone(&message),
                sender: Arc::clone(&sender),
            };
            tasks.spawn(async move { (index, delivery.run(&group).await) });
        }

        let mut outcomes: Vec<Option<DeliveryOutcome>> = groups.iter().map(|_| None).collect();
        let mut task_failure = None;
        let finished = {
            let collect = async {
                while let Some(joined) = tasks.join_next().await {
                    match joined {
                        Ok((index, outcome)) => outcomes[index] = Some(outcome),
                        Err(err) => task_failure = Some(err.to_string()),
                    }
                }
            };
            tokio::select! {
                () = collect => true,
                () = cancel => false,
                () = tokio::time::sleep(self.options.message_timeout) => false,
            }
        };

        if !finished {
            tasks.shutdown().await;
            return TransactionOutcome::Cancelled;
        }

        let results = groups
            .into_iter()
            .zip(outcomes)
            .map(|(group, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    let reason = task_failure
                        .clone()
                        .unwrap_or_else(|| "delivery task lost".to_string());
                    DeliveryOutcome::TransportError(reason)
                });
                GroupResult { group, outcome }
            })
            .collect();
        TransactionOutcome::aggregate(results)
    }
}

/// State owned by one group's delivery task.
struct GroupDelivery {
    resolver: Arc<dyn MxLookup>,
    transport: Box<dyn Transport>,
    observer: Arc<dyn ForwardObserver>,
    options: ForwardOptions,
    message: Arc<ForwardMessage>,
    sender: Arc<str>,
}

impl GroupDelivery {
    async fn run(mut self, group: &DomainGroup) -> DeliveryOutcome {
        let outcome = self.deliver(group).await;
        if !outcome.is_delivered() {
            self.observer.group_failed(group, &outcome);
        }
        outcome
    }

    /// Most preferred MX host, connect, send, then a best-effort disconnect.
    async fn deliver(&mut self, group: &DomainGroup) -> DeliveryOutcome {
        let host = match resolve_mx_hosts(self.resolver.as_ref(), &group.domain).await {
            Ok(status) => match status.preferred_host() {
                Some(host) => host.to_string(),
                None => return DeliveryOutcome::NoMailServer,
            },
            Err(err) => {
                self.observer.mx_lookup_failed(&group.domain, &err);
                return DeliveryOutcome::NoMailServer;
            }
        };

        if let Err(err) = self
            .transport
            .connect(&host, self.options.port, self.options.security)
            .await
        {
            return DeliveryOutcome::ConnectFailed(err.to_string());
        }

        let recipients = group.recipient_addresses();
        let outcome = match self
            .transport
            .send(&self.message, &self.sender, &recipients)
            .await
        {
            Ok(reply) => {
                self.observer.group_delivered(group, &host, &reply);
                DeliveryOutcome::Delivered
            }
            Err(err) => match err.rejection() {
                Some(reply) => DeliveryOutcome::SendRejected(reply.clone()),
                None => DeliveryOutcome::TransportError(err.to_string()),
            },
        };

        if let Err(err) = self.transport.disconnect().await {
            self.observer.disconnect_failed(&group.domain, &err);
        }
        outcome
    }
}
