use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mailforward_lib::{
    ForwardMessage, ForwardOptions, Forwarder, Listener, MxError, MxLookup, MxRecord, RuleSet,
    SecurityMode, ServerOptions, Session, SmtpReply, Transport, TransportError, TransportFactory,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;

struct OneHost;

#[async_trait]
impl MxLookup for OneHost {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, MxError> {
        if domain == "unreachable.com" {
            return Err(MxError::other(domain, "SERVFAIL"));
        }
        Ok(vec![MxRecord::new(10, format!("mx.{domain}"))])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Sent {
    host: String,
    sender: String,
    recipients: Vec<String>,
    body: Vec<u8>,
}

#[derive(Clone, Default)]
struct Outbox {
    sent: Arc<Mutex<Vec<Sent>>>,
    /// Signalled when a send to `mx.slow.com` starts; that send never ends.
    started: Arc<Notify>,
}

impl TransportFactory for Outbox {
    fn create(&self) -> Box<dyn Transport> {
        Box::new(OutboxTransport {
            outbox: self.clone(),
            host: String::new(),
        })
    }
}

struct OutboxTransport {
    outbox: Outbox,
    host: String,
}

#[async_trait]
impl Transport for OutboxTransport {
    async fn connect(
        &mut self,
        host: &str,
        _port: u16,
        _security: SecurityMode,
    ) -> Result<(), TransportError> {
        self.host = host.to_string();
        Ok(())
    }

    async fn send(
        &mut self,
        message: &ForwardMessage,
        sender: &str,
        recipients: &[String],
    ) -> Result<SmtpReply, TransportError> {
        if self.host == "mx.slow.com" {
            self.outbox.started.notify_one();
            return std::future::pending().await;
        }
        if self.host == "mx.full.com" {
            return Err(TransportError::rejected(
                "RCPT TO",
                SmtpReply::new(552, "5.2.2 Mailbox full"),
            ));
        }
        self.outbox.sent.lock().unwrap().push(Sent {
            host: self.host.clone(),
            sender: sender.to_string(),
            recipients: recipients.to_vec(),
            body: message.as_bytes().to_vec(),
        });
        Ok(SmtpReply::new(250, "2.0.0 queued"))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct Client {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Client {
    /// Reads one reply, multi-line replies joined with `\n`.
    async fn reply(&mut self) -> String {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            let line = line.trim_end().to_string();
            let last = line.as_bytes().get(3) != Some(&b'-');
            lines.push(line);
            if last {
                return lines.join("\n");
            }
        }
    }

    async fn send(&mut self, data: &str) {
        self.writer.write_all(data.as_bytes()).await.unwrap();
    }

    async fn command(&mut self, line: &str) -> String {
        self.send(&format!("{line}\r\n")).await;
        self.reply().await
    }
}

struct Harness {
    client: Client,
    outbox: Outbox,
    shutdown: broadcast::Sender<()>,
    session: JoinHandle<std::io::Result<()>>,
}

fn rules() -> RuleSet {
    RuleSet::from_pairs([
        ("someone.*@alias-domain.com", "target@target-domain.com"),
        ("full@alias-domain.com", "user@full.com"),
        ("lost@alias-domain.com", "user@unreachable.com"),
        ("slow@alias-domain.com", "user@slow.com"),
        ("*@catchall.com", "inbox@target-domain.com"),
    ])
    .unwrap()
}

fn forwarder(outbox: &Outbox) -> Arc<Forwarder> {
    Arc::new(Forwarder::new(
        rules(),
        Arc::new(OneHost),
        Arc::new(outbox.clone()),
        ForwardOptions::default(),
    ))
}

fn options(max_message_size: usize) -> Arc<ServerOptions> {
    Arc::new(ServerOptions {
        server_name: "mx.alias-domain.com".to_string(),
        max_message_size,
    })
}

fn start(max_message_size: usize) -> Harness {
    let outbox = Outbox::default();
    let (shutdown, receiver) = broadcast::channel(1);
    let (client, server) = tokio::io::duplex(64 * 1024);
    let session = Session::new(
        server,
        "test-peer",
        forwarder(&outbox),
        options(max_message_size),
        receiver,
    );
    let session = tokio::spawn(session.run());
    let (read, writer) = tokio::io::split(client);
    Harness {
        client: Client {
            reader: BufReader::new(read),
            writer,
        },
        outbox,
        shutdown,
        session,
    }
}

async fn open_transaction(client: &mut Client) {
    assert_eq!(client.reply().await, "220 mx.alias-domain.com ESMTP");
    client.command("EHLO client.test").await;
    assert!(client.command("MAIL FROM:<sender@origin.org>").await.starts_with("250"));
}

#[tokio::test]
async fn forwards_matching_message() {
    let Harness {
        mut client, outbox, ..
    } = start(1024 * 1024);
    open_transaction(&mut client).await;

    let rcpt = client.command("RCPT TO:<someone.awesome@alias-domain.com>").await;
    assert_eq!(rcpt, "250 2.1.5 Ok");
    assert!(client.command("DATA").await.starts_with("354"));
    client
        .send("Subject: hello\r\n\r\n..leading dot\r\nbody\r\n.\r\n")
        .await;
    assert_eq!(client.reply().await, "250 2.0.0 Message forwarded");
    assert_eq!(client.command("QUIT").await, "221 2.0.0 Bye");

    let sent = outbox.sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        [Sent {
            host: "mx.target-domain.com".to_string(),
            sender: "sender@origin.org".to_string(),
            recipients: vec!["target@target-domain.com".to_string()],
            body: b"Subject: hello\r\n\r\n.leading dot\r\nbody\r\n".to_vec(),
        }]
    );
}

#[tokio::test]
async fn ehlo_advertises_size() {
    let Harness { mut client, .. } = start(4096);
    client.reply().await;
    insta::assert_snapshot!(client.command("EHLO client.test").await, @r"
    250-mx.alias-domain.com
    250-SIZE 4096
    250 8BITMIME
    ");
}

#[tokio::test]
async fn unknown_mailbox_is_refused() {
    let Harness { mut client, .. } = start(1024);
    open_transaction(&mut client).await;

    let rcpt = client.command("RCPT TO:<noone@alias-domain.com>").await;

    assert_eq!(rcpt, "550 5.7.1 Mailbox name not allowed");
    assert_eq!(client.command("DATA").await, "503 5.5.1 Bad sequence of commands");
}

#[tokio::test]
async fn duplicate_aliases_are_sent_once() {
    let Harness {
        mut client, outbox, ..
    } = start(1024 * 1024);
    open_transaction(&mut client).await;

    for rcpt in ["a@catchall.com", "b@catchall.com", "A@CATCHALL.com"] {
        assert!(client.command(&format!("RCPT TO:<{rcpt}>")).await.starts_with("250"));
    }
    client.command("DATA").await;
    client.send("Subject: x\r\n\r\nhi\r\n.\r\n").await;
    assert!(client.reply().await.starts_with("250"));

    let sent = outbox.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, ["inbox@target-domain.com"]);
}

#[tokio::test]
async fn permanent_rejection_is_554() {
    let Harness { mut client, .. } = start(1024 * 1024);
    open_transaction(&mut client).await;
    client.command("RCPT TO:<full@alias-domain.com>").await;
    client.command("DATA").await;
    client.send("Subject: x\r\n\r\nhi\r\n.\r\n").await;

    assert_eq!(client.reply().await, "554 5.0.0 Forwarding failed");
}

#[tokio::test]
async fn missing_mail_server_is_transient() {
    let Harness { mut client, .. } = start(1024 * 1024);
    open_transaction(&mut client).await;
    client.command("RCPT TO:<lost@alias-domain.com>").await;
    client.command("DATA").await;
    client.send("Subject: x\r\n\r\nhi\r\n.\r\n").await;

    assert_eq!(client.reply().await, "451 4.4.0 Forwarding failed, try again later");
}

#[tokio::test]
async fn partial_failure_still_accepts() {
    let Harness {
        mut client, outbox, ..
    } = start(1024 * 1024);
    open_transaction(&mut client).await;
    client.command("RCPT TO:<full@alias-domain.com>").await;
    client.command("RCPT TO:<someone.y@alias-domain.com>").await;
    client.command("DATA").await;
    client.send("Subject: x\r\n\r\nhi\r\n.\r\n").await;

    assert_eq!(client.reply().await, "250 2.0.0 Message forwarded");
    assert_eq!(outbox.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn oversized_message_is_refused() {
    let Harness {
        mut client, outbox, ..
    } = start(32);
    open_transaction(&mut client).await;
    client.command("RCPT TO:<someone.z@alias-domain.com>").await;
    client.command("DATA").await;
    client
        .send("Subject: a rather long subject line\r\n\r\nand a body\r\n.\r\n")
        .await;

    assert_eq!(
        client.reply().await,
        "552 5.3.4 Message size exceeds fixed limit"
    );
    assert!(outbox.sent.lock().unwrap().is_empty());
    // The session is still usable.
    assert_eq!(client.command("NOOP").await, "250 2.0.0 Ok");
}

#[tokio::test]
async fn declared_size_over_limit_is_refused() {
    let Harness { mut client, .. } = start(100);
    client.reply().await;
    client.command("EHLO client.test").await;

    let reply = client.command("MAIL FROM:<s@origin.org> SIZE=5000").await;

    assert_eq!(reply, "552 5.3.4 Message size exceeds fixed limit");
}

#[tokio::test]
async fn sequence_and_syntax_errors() {
    let Harness { mut client, .. } = start(1024);
    client.reply().await;

    assert_eq!(
        client.command("MAIL FROM:<s@origin.org>").await,
        "503 5.5.1 Bad sequence of commands"
    );
    assert!(client.command("EHLO").await.starts_with("501"));
    assert_eq!(client.command("VRFY root").await, "502 5.5.2 Command not recognized");
    client.command("HELO client.test").await;
    assert_eq!(
        client.command("RCPT TO:<a@b.com>").await,
        "503 5.5.1 Bad sequence of commands"
    );
    client.command("MAIL FROM:<s@origin.org>").await;
    assert!(client.command("RCPT TO:<not an address>").await.starts_with("501"));
}

#[tokio::test]
async fn rset_clears_transaction() {
    let Harness { mut client, .. } = start(1024);
    open_transaction(&mut client).await;
    client.command("RCPT TO:<someone.a@alias-domain.com>").await;

    assert_eq!(client.command("RSET").await, "250 2.0.0 Ok");
    assert_eq!(client.command("DATA").await, "503 5.5.1 Bad sequence of commands");
}

#[tokio::test]
async fn shutdown_closes_idle_session() {
    let Harness {
        mut client,
        shutdown,
        session,
        ..
    } = start(1024);
    client.reply().await;

    shutdown.send(()).unwrap();

    assert_eq!(
        client.reply().await,
        "421 4.3.2 mx.alias-domain.com Service shutting down"
    );
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_during_delivery_is_transient() {
    let Harness {
        mut client,
        outbox,
        shutdown,
        session,
    } = start(1024 * 1024);
    open_transaction(&mut client).await;
    client.command("RCPT TO:<slow@alias-domain.com>").await;
    client.command("DATA").await;
    client.send("Subject: x\r\n\r\nhi\r\n.\r\n").await;

    outbox.started.notified().await;
    shutdown.send(()).unwrap();

    assert_eq!(
        client.reply().await,
        "451 4.4.0 Forwarding failed, try again later"
    );
    assert_eq!(
        client.reply().await,
        "421 4.3.2 mx.alias-domain.com Service shutting down"
    );
    session.await.unwrap().unwrap();
}

#[tokio::test]
async fn listener_serves_until_shutdown() {
    let outbox = Outbox::default();
    let listener = Listener::bind("127.0.0.1:0", forwarder(&outbox), options(1024))
        .await
        .unwrap();
    let address = listener.local_addr().unwrap();
    let (shutdown, receiver) = broadcast::channel(1);
    let server = tokio::spawn(listener.serve(receiver));

    let stream = TcpStream::connect(address).await.unwrap();
    let mut reader = BufReader::new(stream);
    let mut greeting = String::new();
    reader.read_line(&mut greeting).await.unwrap();
    assert_eq!(greeting, "220 mx.alias-domain.com ESMTP\r\n");

    shutdown.send(()).unwrap();

    let mut bye = String::new();
    reader.read_line(&mut bye).await.unwrap();
    assert!(bye.starts_with("421 "));
    server.await.unwrap().unwrap();
}
