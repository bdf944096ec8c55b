//! Inbound SMTP server feeding the [`Forwarder`].

mod command;
mod session;

pub use session::Session;

use session::shutdown_requested;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};

use crate::config::DEFAULT_MAX_MESSAGE_SIZE;
use crate::forward::Forwarder;

/// Pause after a failed `accept`, e.g. when file descriptors run out.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Name used in the greeting and `EHLO` reply.
    pub server_name: String,
    pub max_message_size: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            server_name: "localhost".to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// Accepts connections on one socket and runs a [`Session`] for each.
pub struct Listener {
    listener: TcpListener,
    forwarder: Arc<Forwarder>,
    options: Arc<ServerOptions>,
}

impl Listener {
    pub async fn bind(
        address: impl ToSocketAddrs,
        forwarder: Arc<Forwarder>,
        options: Arc<ServerOptions>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            forwarder,
            options,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until `shutdown` fires, then waits for open sessions to end.
    /// Sessions see the same signal and close with a `421`.
    pub async fn serve(self, mut shutdown: broadcast::Receiver<()>) -> io::Result<()> {
        let local = self.local_addr()?;
        info!(%local, "listening for mail");
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                () = shutdown_requested(&mut shutdown) => {
                    info!(%local, open = sessions.len(), "shutdown received, finishing sessions");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            error!(%local, "accept failed: {err}");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    debug!(%peer, "connection accepted");
                    let session = Session::new(
                        stream,
                        peer.to_string(),
                        Arc::clone(&self.forwarder),
                        Arc::clone(&self.options),
                        shutdown.resubscribe(),
                    );
                    sessions.spawn(async move {
                        if let Err(err) = session.run().await {
                            debug!(%peer, "session ended with error: {err}");
                        }
                    });
                }
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            }
        }

        while sessions.join_next().await.is_some() {}
        Ok(())
    }
}

/// Serves every listener until `signal` completes or one of them stops on
/// its own, then shuts all of them down. A listener stopping early is an
/// error; the first error seen is returned once every listener is done.
pub async fn run_listeners<F>(listeners: Vec<Listener>, signal: F) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    let (shutdown, _) = broadcast::channel(1);
    let mut tasks = JoinSet::new();
    for listener in listeners {
        tasks.spawn(listener.serve(shutdown.subscribe()));
    }
    supervise(tasks, &shutdown, signal).await
}

async fn supervise<F>(
    mut tasks: JoinSet<io::Result<()>>,
    shutdown: &broadcast::Sender<()>,
    signal: F,
) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    let mut failure = None;
    tokio::select! {
        () = signal => info!("shutting down"),
        Some(joined) = tasks.join_next() => {
            let err = match listener_result(joined) {
                Ok(()) => io::Error::other("listener stopped unexpectedly"),
                Err(err) => err,
            };
            error!("listener failed, shutting down: {err}");
            failure = Some(err);
        }
    }
    // No receivers left means every listener already stopped.
    let _ = shutdown.send(());

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = listener_result(joined) {
            error!("listener failed: {err}");
            failure.get_or_insert(err);
        }
    }
    info!("stopped");
    failure.map_or(Ok(()), Err)
}

fn listener_result(joined: Result<io::Result<()>, JoinError>) -> io::Result<()> {
    joined.map_err(io::Error::other)?
}
