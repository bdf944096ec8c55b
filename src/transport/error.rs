use std::io;

use thiserror::Error;

use super::SmtpReply;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("connection to {host} timed out")]
    ConnectTimeout { host: String },
    #[error("I/O error: {source}")]
    Io {
        #[source]
        source: io::Error,
    },
    #[error("{command} timed out")]
    Timeout { command: String },
    #[error("TLS handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("'{host}' is not a valid TLS server name")]
    InvalidServerName { host: String },
    #[error("STARTTLS required but not advertised by {host}")]
    StartTlsUnavailable { host: String },
    #[error("{command} rejected: {reply}")]
    Rejected { command: String, reply: SmtpReply },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("transport is not connected")]
    NotConnected,
}

impl TransportError {
    pub(crate) fn io(source: io::Error) -> Self {
        Self::Io { source }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn rejected(command: impl Into<String>, reply: SmtpReply) -> Self {
        Self::Rejected {
            command: command.into(),
            reply,
        }
    }

    /// Réponse distante quand le serveur a refusé une commande.
    pub fn rejection(&self) -> Option<&SmtpReply> {
        match self {
            Self::Rejected { reply, .. } => Some(reply),
            _ => None,
        }
    }
}
