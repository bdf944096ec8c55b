use std::fmt::Display;
use std::io;
use std::sync::Arc;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::ServerOptions;
use super::command::Command;
use crate::forward::Forwarder;
use crate::recipients::InboundTransaction;
use crate::validator::{Mailbox, ValidationMode};

/// Longest accepted command line, CRLF included.
const MAX_COMMAND_LEN: u64 = 512;
/// Read size used while skipping the rest of an oversized message.
const DISCARD_LINE_LEN: u64 = 1000;
const MAX_RECIPIENTS: usize = 100;

/// Mail transaction collected between `MAIL` and the end of `DATA`.
#[derive(Debug, Default)]
struct Envelope {
    sender: Option<String>,
    recipients: Vec<String>,
}

enum Line {
    Complete(Vec<u8>),
    TooLong,
    Eof,
}

/// One inbound SMTP conversation.
pub struct Session<S> {
    stream: BufReader<S>,
    forwarder: Arc<Forwarder>,
    options: Arc<ServerOptions>,
    shutdown: broadcast::Receiver<()>,
    peer: String,
    helo: Option<String>,
    envelope: Envelope,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        forwarder: Arc<Forwarder>,
        options: Arc<ServerOptions>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            stream: BufReader::new(stream),
            forwarder,
            options,
            shutdown,
            peer: peer.into(),
            helo: None,
            envelope: Envelope::default(),
        }
    }

    /// Runs until `QUIT`, end of stream or shutdown.
    pub async fn run(mut self) -> io::Result<()> {
        let greeting = format!("220 {} ESMTP", self.options.server_name);
        self.reply(greeting).await?;

        loop {
            let line = tokio::select! {
                line = read_line(&mut self.stream, MAX_COMMAND_LEN) => line?,
                () = shutdown_requested(&mut self.shutdown) => {
                    let bye = format!("421 4.3.2 {} Service shutting down", self.options.server_name);
                    self.reply(bye).await?;
                    break;
                }
            };
            let line = match line {
                Line::Complete(bytes) => bytes,
                Line::TooLong => {
                    self.reply("500 5.5.2 Line too long").await?;
                    continue;
                }
                Line::Eof => break,
            };
            let line = String::from_utf8_lossy(&line).into_owned();
            trace!(peer = %self.peer, "C: {}", line.trim_end());

            let command = match Command::parse(&line) {
                Ok(command) => command,
                Err(err) => {
                    self.reply(format!("501 5.5.4 Syntax error: {err}")).await?;
                    continue;
                }
            };
            if !self.handle(command).await? {
                break;
            }
        }

        self.stream.get_mut().shutdown().await.ok();
        Ok(())
    }

    /// Returns `false` once the conversation is over.
    async fn handle(&mut self, command: Command) -> io::Result<bool> {
        match command {
            Command::Helo { extended, domain } => {
                self.envelope = Envelope::default();
                self.helo = Some(domain);
                if extended {
                    let name = &self.options.server_name;
                    let max = self.options.max_message_size;
                    self.reply(format!("250-{name}\r\n250-SIZE {max}\r\n250 8BITMIME"))
                        .await?;
                } else {
                    self.reply(format!("250 {}", self.options.server_name)).await?;
                }
            }
            Command::Mail { sender, size } => self.mail(sender, size).await?,
            Command::Rcpt { recipient } => self.rcpt(recipient).await?,
            Command::Data => return self.data().await,
            Command::Rset => {
                self.envelope = Envelope::default();
                self.reply("250 2.0.0 Ok").await?;
            }
            Command::Noop => self.reply("250 2.0.0 Ok").await?,
            Command::Quit => {
                self.reply("221 2.0.0 Bye").await?;
                return Ok(false);
            }
            Command::Unknown(verb) => {
                debug!(peer = %self.peer, %verb, "unrecognized command");
                self.reply("502 5.5.2 Command not recognized").await?;
            }
        }
        Ok(true)
    }

    async fn mail(&mut self, sender: String, size: Option<usize>) -> io::Result<()> {
        if self.helo.is_none() || self.envelope.sender.is_some() {
            return self.reply("503 5.5.1 Bad sequence of commands").await;
        }
        if !sender.is_empty() && Mailbox::parse(&sender, ValidationMode::Relaxed).is_err() {
            return self.reply("501 5.1.7 Bad sender address syntax").await;
        }
        if size.is_some_and(|size| size > self.options.max_message_size) {
            return self.reply("552 5.3.4 Message size exceeds fixed limit").await;
        }
        self.envelope.sender = Some(sender);
        self.reply("250 2.1.0 Ok").await
    }

    async fn rcpt(&mut self, recipient: String) -> io::Result<()> {
        if self.envelope.sender.is_none() {
            return self.reply("503 5.5.1 Bad sequence of commands").await;
        }
        if Mailbox::parse(&recipient, ValidationMode::Relaxed).is_err() {
            return self.reply("501 5.1.3 Bad recipient address syntax").await;
        }
        if !self.forwarder.rules().is_match(&recipient) {
            debug!(peer = %self.peer, %recipient, "recipient refused, no matching rule");
            return self.reply("550 5.7.1 Mailbox name not allowed").await;
        }
        if self.envelope.recipients.len() >= MAX_RECIPIENTS {
            return self.reply("452 4.5.3 Too many recipients").await;
        }
        self.envelope.recipients.push(recipient);
        self.reply("250 2.1.5 Ok").await
    }

    /// Returns `false` when shutdown interrupted the delivery.
    async fn data(&mut self) -> io::Result<bool> {
        if self.envelope.sender.is_none() || self.envelope.recipients.is_empty() {
            self.reply("503 5.5.1 Bad sequence of commands").await?;
            return Ok(true);
        }
        self.reply("354 End data with <CR><LF>.<CR><LF>").await?;

        let Some(message) = self.read_message().await? else {
            self.envelope = Envelope::default();
            self.reply("552 5.3.4 Message size exceeds fixed limit").await?;
            return Ok(true);
        };

        let envelope = std::mem::take(&mut self.envelope);
        let transaction = InboundTransaction::new(
            envelope.sender.unwrap_or_default(),
            envelope.recipients,
            message,
        );

        let forwarder = Arc::clone(&self.forwarder);
        let shutdown = &mut self.shutdown;
        let mut interrupted = false;
        let cancel = async {
            shutdown_requested(shutdown).await;
            interrupted = true;
        };
        let outcome = forwarder.forward_with_cancel(&transaction, cancel).await;
        self.reply(outcome.response()).await?;
        if interrupted {
            let bye = format!("421 4.3.2 {} Service shutting down", self.options.server_name);
            self.reply(bye).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Reads the message up to the lone dot, undoing dot-stuffing. Returns
    /// `None` when the size limit was exceeded; the rest is still consumed.
    async fn read_message(&mut self) -> io::Result<Option<Vec<u8>>> {
        let limit = self.options.max_message_size;
        let mut message = Vec::new();
        let mut oversized = false;

        loop {
            // Room for the terminator even when the budget is spent.
            let budget = if oversized {
                DISCARD_LINE_LEN
            } else {
                (limit - message.len()) as u64 + 3
            };
            let line = match read_line(&mut self.stream, budget).await? {
                Line::Complete(line) => line,
                Line::TooLong => {
                    oversized = true;
                    continue;
                }
                Line::Eof => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed during DATA",
                    ));
                }
            };
            if line == b".\r\n" || line == b".\n" {
                break;
            }
            if oversized {
                continue;
            }
            let line = line.strip_prefix(b".").unwrap_or(&line);
            if message.len() + line.len() > limit {
                oversized = true;
                continue;
            }
            message.extend_from_slice(line);
        }

        Ok((!oversized).then_some(message))
    }

    async fn reply(&mut self, reply: impl Display) -> io::Result<()> {
        let reply = reply.to_string();
        trace!(peer = %self.peer, "S: {reply}");
        let stream = self.stream.get_mut();
        stream.write_all(reply.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await
    }
}

/// Completes when shutdown is signalled. A dropped sender never signals.
pub(crate) async fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) {
    if let Err(broadcast::error::RecvError::Closed) = shutdown.recv().await {
        std::future::pending::<()>().await;
    }
}

async fn read_line<R>(reader: &mut R, limit: u64) -> io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader).take(limit).read_until(b'\n', &mut line).await?;
    if read == 0 {
        return Ok(Line::Eof);
    }
    if line.last() == Some(&b'\n') {
        return Ok(Line::Complete(line));
    }
    if (read as u64) < limit {
        // Stream ended without a line terminator.
        return Ok(Line::Eof);
    }
    // Skip the rest of the overlong line.
    let mut discard = Vec::new();
    loop {
        discard.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', &mut discard).await?;
        if read == 0 || discard.last() == Some(&b'\n') {
            return Ok(Line::TooLong);
        }
    }
}
