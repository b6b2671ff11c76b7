//! Control-plane listener
//!
//! Accepts TLS connections on a unix socket or loopback TCP port and spawns
//! a handler for each client.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use eco_core::netaddr::{NetAddr, Network};

use crate::error::Result;
use crate::orchestrator::Eco;
use crate::server::handler;

/// A connected client stream of either socket type
trait Conn: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Conn for T {}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(tokio::net::UnixListener, PathBuf),
}

impl Listener {
    async fn bind(addr: &NetAddr) -> io::Result<Self> {
        match addr.network {
            Network::Tcp => Ok(Self::Tcp(TcpListener::bind(&addr.address).await?)),
            #[cfg(unix)]
            Network::Unix => {
                let path = PathBuf::from(&addr.address);
                if path.exists() {
                    tracing::debug!("Removing stale socket {:?}", path);
                    std::fs::remove_file(&path)?;
                }
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let listener = tokio::net::UnixListener::bind(&path)?;
                Ok(Self::Unix(listener, path))
            }
            #[cfg(not(unix))]
            Network::Unix => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not supported on this platform",
            )),
        }
    }

    /// The address clients should dial
    fn local_addr(&self) -> io::Result<NetAddr> {
        match self {
            Self::Tcp(listener) => Ok(NetAddr::tcp(listener.local_addr()?.to_string())),
            #[cfg(unix)]
            Self::Unix(_, path) => Ok(NetAddr::unix(path)),
        }
    }

    async fn accept(&self) -> io::Result<(Box<dyn Conn>, String)> {
        match self {
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok((Box::new(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Self::Unix(listener, path) => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), format!("{}", path.display())))
            }
        }
    }

    fn cleanup(&self) {
        #[cfg(unix)]
        if let Self::Unix(_, path) = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// TLS control-plane server
pub struct ControlServer {
    eco: Arc<Eco>,
    acceptor: TlsAcceptor,
    cancel: CancellationToken,
}

impl ControlServer {
    pub fn new(eco: Arc<Eco>, tls: Arc<ServerConfig>, cancel: CancellationToken) -> Self {
        Self {
            eco,
            acceptor: TlsAcceptor::from(tls),
            cancel,
        }
    }

    /// Listen on `addr`, advertise it in `addr_file`, and serve until
    /// cancelled
    pub async fn run(&self, addr: &NetAddr, addr_file: &Path) -> Result<()> {
        let listener = Listener::bind(addr).await?;
        let local = listener.local_addr()?;
        local.write_to(addr_file)?;
        tracing::info!("Control server listening on {}", local);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Control server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.handle_connection(stream, peer),
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        listener.cleanup();
        Ok(())
    }

    fn handle_connection(&self, stream: Box<dyn Conn>, peer: String) {
        tracing::debug!("New connection from {}", peer);

        let eco = Arc::clone(&self.eco);
        let acceptor = self.acceptor.clone();
        let cancel = self.cancel.clone();
        let timeout = eco.config().request_timeout;

        tokio::spawn(async move {
            let tls = match tokio::time::timeout(timeout, acceptor.accept(stream)).await {
                Ok(Ok(tls)) => tls,
                Ok(Err(e)) => {
                    tracing::warn!("TLS handshake with {} failed: {}", peer, e);
                    return;
                }
                Err(_) => {
                    tracing::warn!("TLS handshake with {} timed out", peer);
                    return;
                }
            };

            match handler::serve(eco, tls, timeout, cancel).await {
                Ok(()) => tracing::debug!("Connection from {} closed", peer),
                Err(e) => tracing::warn!("Connection from {} closed with error: {}", peer, e),
            }
        });
    }
}
