use std::fmt;
use std::time::Duration;

use crate::grouping::DomainGroup;
use crate::transport::{SMTP_PORT, SecurityMode, SmtpReply};

/// Outbound delivery settings shared by every group of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOptions {
    pub port: u16,
    pub security: SecurityMode,
    /// Deadline for the whole transaction, all groups included.
    pub message_timeout: Duration,
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self {
            port: SMTP_PORT,
            security: SecurityMode::Auto,
            message_timeout: Duration::from_secs(300),
        }
    }
}

/// Result of delivering one [`DomainGroup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// MX lookup failed or returned no host.
    NoMailServer,
    ConnectFailed(String),
    /// The remote server refused the message or a recipient.
    SendRejected(SmtpReply),
    TransportError(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::SendRejected(reply) if reply.is_permanent_failure())
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered => f.write_str("delivered"),
            Self::NoMailServer => f.write_str("no mail server"),
            Self::ConnectFailed(reason) => write!(f, "connect failed: {reason}"),
            Self::SendRejected(reply) => write!(f, "rejected: {reply}"),
            Self::TransportError(reason) => write!(f, "transport error: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupResult {
    pub group: DomainGroup,
    pub outcome: DeliveryOutcome,
}

/// Everything that happened to one inbound transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// No recipient matched a rule. Nothing was sent.
    NoRecipientsMatched,
    /// The message could not be read. Nothing was sent.
    InvalidMessage(String),
    /// At least one group was delivered.
    Delivered { groups: Vec<GroupResult> },
    /// Every group failed.
    Failed { groups: Vec<GroupResult> },
    /// Stopped by shutdown or the message timeout.
    Cancelled,
}

impl TransactionOutcome {
    pub(crate) fn aggregate(groups: Vec<GroupResult>) -> Self {
        if groups.iter().any(|result| result.outcome.is_delivered()) {
            Self::Delivered { groups }
        } else {
            Self::Failed { groups }
        }
    }

    pub fn groups(&self) -> &[GroupResult] {
        match self {
            Self::Delivered { groups } | Self::Failed { groups } => groups,
            _ => &[],
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// The single reply the inbound client receives.
    pub fn response(&self) -> ResponseCode {
        match self {
            Self::Delivered { .. } => ResponseCode::Ok,
            Self::NoRecipientsMatched => ResponseCode::MailboxNameNotAllowed,
            Self::Failed { groups }
                if !groups.is_empty() && groups.iter().all(|r| r.outcome.is_permanent()) =>
            {
                ResponseCode::TransactionFailed(FailureClass::Permanent)
            }
            Self::Failed { .. } | Self::InvalidMessage(_) | Self::Cancelled => {
                ResponseCode::TransactionFailed(FailureClass::Transient)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Permanent,
}

/// Protocol-level answer to a completed `DATA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    MailboxNameNotAllowed,
    TransactionFailed(FailureClass),
}

impl ResponseCode {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 250,
            Self::MailboxNameNotAllowed => 550,
            Self::TransactionFailed(FailureClass::Transient) => 451,
            Self::TransactionFailed(FailureClass::Permanent) => 554,
        }
    }

    pub fn enhanced_status(self) -> &'static str {
        match self {
            Self::Ok => "2.0.0",
            Self::MailboxNameNotAllowed => "5.7.1",
            Self::TransactionFailed(FailureClass::Transient) => "4.4.0",
            Self::TransactionFailed(FailureClass::Permanent) => "5.0.0",
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::Ok => "Message forwarded",
            Self::MailboxNameNotAllowed => "Mailbox name not allowed",
            Self::TransactionFailed(FailureClass::Transient) => {
                "Forwarding failed, try again later"
            }
            Self::TransactionFailed(FailureClass::Permanent) => "Forwarding failed",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.code(), self.enhanced_status(), self.text())
    }
}
