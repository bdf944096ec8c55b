use std::sync::Arc;

use async_trait::async_trait;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{debug, warn};

use super::session::SmtpSession;
use super::{
    SecurityMode, SmtpReply, Transport, TransportError, TransportFactory, TransportOptions,
};
use crate::message::ForwardMessage;

/// [`Transport`] SMTP vers un hôte distant.
pub struct SmtpTransport {
    options: Arc<TransportOptions>,
    tls: TlsConnector,
    session: Option<SmtpSession>,
}

impl SmtpTransport {
    pub fn new(options: Arc<TransportOptions>, tls: TlsConnector) -> Self {
        Self {
            options,
            tls,
            session: None,
        }
    }

    async fn ehlo(&self, session: &mut SmtpSession) -> Result<SmtpReply, TransportError> {
        let helo = self.options.helo_name();
        let ehlo_cmd = format!("EHLO {helo}");
        let reply = session.command(&ehlo_cmd).await?;
        if reply.is_positive_completion() {
            return Ok(reply);
        }
        if reply.is_permanent_failure() {
            // Serveur pré-ESMTP.
            let helo_cmd = format!("HELO {helo}");
            let reply = session.command(&helo_cmd).await?;
            if reply.is_positive_completion() {
                return Ok(reply);
            }
            return Err(TransportError::rejected(helo_cmd, reply));
        }
        Err(TransportError::rejected(ehlo_cmd, reply))
    }

    async fn negotiate_tls(
        &self,
        session: &mut SmtpSession,
        ehlo: &SmtpReply,
        security: SecurityMode,
    ) -> Result<(), TransportError> {
        let advertised = ehlo.has_capability("STARTTLS");
        match security {
            SecurityMode::None => return Ok(()),
            SecurityMode::Auto if !advertised => return Ok(()),
            SecurityMode::StartTls if !advertised => {
                return Err(TransportError::StartTlsUnavailable {
                    host: session.host().to_string(),
                });
            }
            SecurityMode::Auto | SecurityMode::StartTls => {}
        }

        let reply = session.starttls(&self.tls).await?;
        if !reply.is_positive_completion() {
            if security == SecurityMode::StartTls {
                return Err(TransportError::rejected("STARTTLS", reply));
            }
            debug!(host = session.host(), %reply, "STARTTLS refused, continuing in plain text");
            return Ok(());
        }
        self.ehlo(session).await?;
        Ok(())
    }
}

/// Annule la transaction (RSET) et renvoie le rejet.
async fn reject(session: &mut SmtpSession, command: String, reply: SmtpReply) -> TransportError {
    if let Err(err) = session.command("RSET").await {
        debug!(host = session.host(), "RSET after rejection failed: {err}");
    }
    TransportError::rejected(command, reply)
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        security: SecurityMode,
    ) -> Result<(), TransportError> {
        if self.session.is_some() {
            return Err(TransportError::protocol("transport already connected"));
        }
        let mut session = SmtpSession::connect(
            host,
            port,
            self.options.connect_timeout,
            self.options.command_timeout,
        )
        .await?;

        let banner = session.read_reply("greeting").await?;
        if !banner.is_positive_completion() {
            return Err(TransportError::rejected("greeting", banner));
        }
        let ehlo = self.ehlo(&mut session).await?;
        self.negotiate_tls(&mut session, &ehlo, security).await?;

        self.session = Some(session);
        Ok(())
    }

    async fn send(
        &mut self,
        message: &ForwardMessage,
        sender: &str,
        recipients: &[String],
    ) -> Result<SmtpReply, TransportError> {
        let session = self.session.as_mut().ok_or(TransportError::NotConnected)?;
        if recipients.is_empty() {
            return Err(TransportError::protocol("no recipients to send to"));
        }

        let mail_from = format!("MAIL FROM:<{}>", sender.trim());
        let reply = session.command(&mail_from).await?;
        if !reply.is_positive_completion() {
            return Err(reject(session, mail_from, reply).await);
        }

        for recipient in recipients {
            let rcpt = format!("RCPT TO:<{recipient}>");
            let reply = session.command(&rcpt).await?;
            if !reply.is_positive_completion() {
                return Err(reject(session, rcpt, reply).await);
            }
        }

        let reply = session.command("DATA").await?;
        if !reply.is_positive_intermediate() {
            return Err(reject(session, "DATA".to_string(), reply).await);
        }

        let payload = dot_stuff(message.as_bytes());
        session.write("message content", &payload).await?;
        let reply = session.read_reply("end of data").await?;
        if !reply.is_positive_completion() {
            return Err(TransportError::rejected("end of data", reply));
        }
        Ok(reply)
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        match self.session.take() {
            Some(session) => session.quit().await,
            None => Ok(()),
        }
    }
}

/// Encode le message pour `DATA`: fins de ligne CRLF, points de tête
/// doublés, terminé par `CRLF.CRLF`.
pub fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 64);
    let body = message.strip_suffix(b"\n").unwrap_or(message);
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    if !message.is_empty() {
        for line in body.split(|byte| *byte == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(b".\r\n");
    out
}

/// Fabrique de [`SmtpTransport`] partageant une configuration TLS.
#[derive(Clone)]
pub struct SmtpTransportFactory {
    options: Arc<TransportOptions>,
    tls: TlsConnector,
}

impl SmtpTransportFactory {
    /// Charge une fois les certificats racine du système.
    pub fn new(options: TransportOptions) -> Result<Self, TransportError> {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for cert in native.certs {
            if let Err(err) = roots.add(cert) {
                warn!("skipping unusable root certificate: {err}");
            }
        }
        if !native.errors.is_empty() {
            warn!(errors = ?native.errors, "some root certificates could not be loaded");
        }
        if roots.is_empty() {
            return Err(TransportError::protocol("no TLS root certificates available"));
        }
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self::with_tls(options, TlsConnector::from(Arc::new(config))))
    }

    pub fn with_tls(options: TransportOptions, tls: TlsConnector) -> Self {
        Self {
            options: Arc::new(options),
            tls,
        }
    }
}

impl TransportFactory for SmtpTransportFactory {
    fn create(&self) -> Box<dyn Transport> {
        Box::new(SmtpTransport::new(
            Arc::clone(&self.options),
            self.tls.clone(),
        ))
    }
}
