use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tracing::trace;

use super::TransportError;
use super::reply::{ReplyBuilder, SmtpReply};

/// Au-delà, la réponse est traitée comme une violation du protocole.
const MAX_LINE_LEN: usize = 8 * 1024;

enum StreamState {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Invalid,
}

struct SmtpStream {
    state: StreamState,
    buffer: Vec<u8>,
}

impl SmtpStream {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match &mut self.state {
            StreamState::Plain(stream) => write_flush(stream, data).await,
            StreamState::Tls(stream) => write_flush(stream.as_mut(), data).await,
            StreamState::Invalid => Err(TransportError::protocol("invalid stream state")),
        }
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return String::from_utf8(line)
                    .map_err(|err| TransportError::protocol(format!("utf8 error: {err}")));
            }
            if self.buffer.len() > MAX_LINE_LEN {
                return Err(TransportError::protocol("reply line too long"));
            }

            let mut buf = [0u8; 1024];
            let read = match &mut self.state {
                StreamState::Plain(stream) => stream.read(&mut buf).await,
                StreamState::Tls(stream) => stream.read(&mut buf).await,
                StreamState::Invalid => {
                    return Err(TransportError::protocol("invalid stream state"));
                }
            };
            let read = read.map_err(TransportError::io)?;
            if read == 0 {
                return Err(TransportError::io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
            self.buffer.extend_from_slice(&buf[..read]);
        }
    }

    async fn read_reply(&mut self) -> Result<SmtpReply, TransportError> {
        let mut builder = ReplyBuilder::default();
        loop {
            let line = self.read_line().await?;
            if let Some(reply) = builder.push(&line)? {
                return Ok(reply);
            }
        }
    }

    async fn upgrade_tls(
        &mut self,
        host: &str,
        connector: &TlsConnector,
    ) -> Result<(), TransportError> {
        let plain = match std::mem::replace(&mut self.state, StreamState::Invalid) {
            StreamState::Plain(stream) => stream,
            other => {
                self.state = other;
                return Err(TransportError::protocol("connection is not plain TCP"));
            }
        };
        if !self.buffer.is_empty() {
            // Des octets reçus avant la poignée de main seraient injectés
            // dans la session TLS.
            return Err(TransportError::protocol("unexpected data before TLS handshake"));
        }
        let server_name = ServerName::try_from(host.to_string()).map_err(|_| {
            TransportError::InvalidServerName {
                host: host.to_string(),
            }
        })?;
        let tls = connector
            .connect(server_name, plain)
            .await
            .map_err(|source| TransportError::Tls {
                host: host.to_string(),
                source,
            })?;
        self.state = StreamState::Tls(Box::new(tls));
        Ok(())
    }

    async fn shutdown(&mut self) {
        let _ = match &mut self.state {
            StreamState::Plain(stream) => stream.shutdown().await,
            StreamState::Tls(stream) => stream.shutdown().await,
            StreamState::Invalid => Ok(()),
        };
        self.state = StreamState::Invalid;
    }
}

async fn write_flush<S>(stream: &mut S, data: &[u8]) -> Result<(), TransportError>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    stream.write_all(data).await.map_err(TransportError::io)?;
    stream.flush().await.map_err(TransportError::io)
}

/// Une conversation SMTP avec un hôte distant. Chaque échange est borné
/// par le timeout de commande.
pub(crate) struct SmtpSession {
    host: String,
    stream: SmtpStream,
    command_timeout: Duration,
}

impl SmtpSession {
    pub(crate) async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let tcp = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                host: format!("{host}:{port}"),
            })?
            .map_err(|source| TransportError::Connect {
                host: format!("{host}:{port}"),
                source,
            })?;
        Ok(Self {
            host: host.to_string(),
            stream: SmtpStream {
                state: StreamState::Plain(tcp),
                buffer: Vec::new(),
            },
            command_timeout,
        })
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    pub(crate) async fn read_reply(&mut self, command: &str) -> Result<SmtpReply, TransportError> {
        let reply = timeout(self.command_timeout, self.stream.read_reply())
            .await
            .map_err(|_| TransportError::Timeout {
                command: command.to_string(),
            })??;
        trace!(host = %self.host, "S: {reply}");
        Ok(reply)
    }

    pub(crate) async fn write(&mut self, command: &str, data: &[u8]) -> Result<(), TransportError> {
        timeout(self.command_timeout, self.stream.write_all(data))
            .await
            .map_err(|_| TransportError::Timeout {
                command: command.to_string(),
            })?
    }

    /// Envoie une commande et attend sa réponse.
    pub(crate) async fn command(&mut self, command: &str) -> Result<SmtpReply, TransportError> {
        trace!(host = %self.host, "C: {command}");
        let mut line = command.as_bytes().to_vec();
        line.extend_from_slice(b"\r\n");
        self.write(command, &line).await?;
        self.read_reply(command).await
    }

    /// Envoie `STARTTLS` et bascule le flux en TLS si la réponse est positive.
    pub(crate) async fn starttls(
        &mut self,
        connector: &TlsConnector,
    ) -> Result<SmtpReply, TransportError> {
        let reply = self.command("STARTTLS").await?;
        if !reply.is_positive_completion() {
            return Ok(reply);
        }
        let host = self.host.clone();
        timeout(self.command_timeout, self.stream.upgrade_tls(&host, connector))
            .await
            .map_err(|_| TransportError::Timeout {
                command: "TLS handshake".to_string(),
            })??;
        Ok(reply)
    }

    /// `QUIT`, puis ferme le flux quelle que soit la réponse.
    pub(crate) async fn quit(mut self) -> Result<(), TransportError> {
        let result = self.command("QUIT").await.map(|_| ());
        self.stream.shutdown().await;
        result
    }
}
