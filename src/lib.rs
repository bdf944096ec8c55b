#![forbid(unsafe_code)]
//! mailforward_lib: SMTP alias forwarding with wildcard rules and MX routing.

pub mod config;
pub mod forward;
pub mod grouping;
pub mod message;
pub mod mx;
pub mod recipients;
pub mod rules;
pub mod server;
pub mod transport;
pub mod validator;

pub use config::{Config, ConfigError};
pub use forward::{
    DeliveryOutcome, FailureClass, ForwardObserver, ForwardOptions, Forwarder, GroupResult,
    ResponseCode, TracingObserver, TransactionOutcome,
};
pub use grouping::{DomainGroup, group_by_domain};
pub use message::{ForwardMessage, MessageError};
pub use mx::{MxError, MxLookup, MxRecord, MxStatus, resolve_mx_hosts};
#[cfg(feature = "with-dns")]
pub use mx::DnsMxResolver;
pub use recipients::{InboundTransaction, MatchedDestination, ResolveError, resolve_recipients};
pub use rules::{AliasRule, RuleError, RuleSet};
pub use server::{Listener, ServerOptions, Session, run_listeners};
pub use transport::{
    SecurityMode, SmtpReply, Transport, TransportError, TransportFactory, TransportOptions,
};
#[cfg(feature = "with-smtp")]
pub use transport::{SmtpTransport, SmtpTransportFactory};
pub use validator::{
    EmailError, Mailbox, NormalizedEmail, ValidationMode, ValidationReport, normalize_email,
    validate_email,
};
