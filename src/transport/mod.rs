//! Transport sortant.
//!
//! L'orchestrateur pilote un [`Transport`] via
//! `connect -> send -> disconnect` et demande à la [`TransportFactory`] une
//! instance neuve par groupe de domaine: aucun état protocolaire n'est
//! partagé entre livraisons concurrentes. Avec la feature `with-smtp`,
//! [`SmtpTransport`] parle SMTP sur Tokio, STARTTLS en option.

mod error;
mod options;
mod reply;

#[cfg(feature = "with-smtp")]
mod client;
#[cfg(feature = "with-smtp")]
mod session;

pub use error::TransportError;
pub use options::{SecurityMode, TransportOptions};
pub use reply::SmtpReply;

#[cfg(feature = "with-smtp")]
pub use client::{SmtpTransport, SmtpTransportFactory, dot_stuff};

use async_trait::async_trait;

use crate::message::ForwardMessage;

/// Port SMTP standard entre serveurs.
pub const SMTP_PORT: u16 = 25;

/// Une connexion sortante.
#[async_trait]
pub trait Transport: Send {
    /// Ouvre la connexion et termine la poignée de main.
    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        security: SecurityMode,
    ) -> Result<(), TransportError>;

    /// Soumet `message` à tous les `recipients` en une transaction.
    async fn send(
        &mut self,
        message: &ForwardMessage,
        sender: &str,
        recipients: &[String],
    ) -> Result<SmtpReply, TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

/// Fournit un [`Transport`] indépendant par livraison.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn Transport>;
}
