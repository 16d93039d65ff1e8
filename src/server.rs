//! TCP listener loop.
//!
//! Accepts connections and spawns one task per connection. Connection tasks
//! share only read-only settings; each owns its own `TextGenerator`.

use crate::config::Config;
use crate::connection::{handle_connection, ConnectionSettings, Outcome};
use crate::generator::TextGenerator;
use std::future::Future;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

/// Pause after a failed accept so a persistent failure does not spin
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Source of accepted connections.
pub trait Accept {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>>;
}

impl Accept for TcpListener {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> {
        TcpListener::accept(self)
    }
}

/// Server instance
pub struct Server {
    config: Config,
    settings: Arc<ConnectionSettings>,
    accept_backoff: Duration,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let settings = Arc::new(ConnectionSettings::from(&config));
        Server {
            config,
            settings,
            accept_backoff: ACCEPT_ERROR_BACKOFF,
        }
    }

    /// Create the listening socket.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(&self) -> io::Result<TcpListener> {
        let addr = self
            .config
            .listen_addr()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("could not resolve {}", self.config.listen_addr()),
                )
            })?;

        let socket = socket2::Socket::new(
            socket2::Domain::for_address(addr),
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )?;

        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(self.config.backlog.min(i32::MAX as u32) as i32)?;

        TcpListener::from_std(socket.into())
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Accept errors are logged and never end the loop. Connection tasks
    /// still running when the loop returns are left to the runtime.
    pub async fn run<A, F>(&self, acceptor: A, shutdown: F)
    where
        A: Accept,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = acceptor.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");

                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(self.accept_backoff) => {}
                    }
                }
            }
        }

        info!("Shutdown requested, no longer accepting connections");
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let settings = Arc::clone(&self.settings);

        tokio::spawn(async move {
            info!(peer = %peer, "Client connected");

            let mut generator = TextGenerator::from_entropy();
            let outcome = handle_connection(stream, &settings, &mut generator).await;

            match outcome {
                Outcome::Completed { items } => {
                    info!(peer = %peer, items, "Connection closed");
                }
                Outcome::Rejected(ref reason) => {
                    warn!(peer = %peer, reason = %reason, "Request rejected, connection closed");
                }
                Outcome::Aborted { items, ref error } => {
                    warn!(peer = %peer, items, error = %error, "Stream aborted, connection closed");
                }
            }
        });
    }
}
