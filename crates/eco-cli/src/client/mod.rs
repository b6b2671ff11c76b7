//! Client for the eco daemon's control socket
//!
//! Every request opens a fresh TLS connection, sends one route frame and
//! reads the reply packets. Connection details come from the address file
//! the daemon writes at startup and the CA certificate it generated.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;

use eco_core::netaddr::{NetAddr, Network};
use eco_core::tls;
use eco_protocol::{
    decode, encode, CtlRequest, CtlResponse, ErrorReply, FeedEvent, FeedMessage, InitRequest,
    MetaState, NodeState, PacketCodec, Progress, RequestCodec, RequestFrame, Route, StateRequest,
    StateResponse, SyncMode,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A socket of either network type
trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

type Packets = Framed<TlsStream<Box<dyn Io>>, PacketCodec>;

/// Applications the daemon can open on request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum App {
    /// The GUI wallet
    Decrediton,
    /// The exchange client, opened in a browser window
    Dexc,
}

impl App {
    fn route(self) -> Route {
        match self {
            Self::Decrediton => Route::StartDecrediton,
            Self::Dexc => Route::StartDex,
        }
    }
}

impl std::str::FromStr for App {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "decrediton" => Ok(Self::Decrediton),
            "dexc" | "dex" => Ok(Self::Dexc),
            other => Err(format!("unknown app: {}", other)),
        }
    }
}

/// Handle for talking to a running daemon
#[derive(Clone)]
pub struct EcoClient {
    addr: NetAddr,
    connector: TlsConnector,
}

impl EcoClient {
    /// Client for the daemon at `addr`, trusting the CA at `ca_cert`
    pub fn connect(addr: NetAddr, ca_cert: &Path) -> Result<Self> {
        let config = tls::client_config(ca_cert)
            .with_context(|| format!("Failed to load CA certificate {:?}", ca_cert))?;
        Ok(Self {
            addr,
            connector: TlsConnector::from(config),
        })
    }

    /// Client for the daemon advertised in `addr_file`
    pub fn from_addr_file(addr_file: &Path, ca_cert: &Path) -> Result<Self> {
        let addr = NetAddr::read_from(addr_file).with_context(|| {
            format!(
                "Failed to read daemon address from {:?}. Is ecod running?",
                addr_file
            )
        })?;
        Self::connect(addr, ca_cert)
    }

    /// Address requests are sent to
    pub fn addr(&self) -> &NetAddr {
        &self.addr
    }

    async fn dial(&self) -> Result<TlsStream<Box<dyn Io>>> {
        tracing::debug!("Connecting to {}", self.addr);

        let socket: Box<dyn Io> = match self.addr.network {
            Network::Tcp => Box::new(tokio::net::TcpStream::connect(&self.addr.address).await?),
            #[cfg(unix)]
            Network::Unix => Box::new(tokio::net::UnixStream::connect(&self.addr.address).await?),
            #[cfg(not(unix))]
            Network::Unix => bail!("unix sockets are not supported on this platform"),
        };

        let name = ServerName::try_from(tls::SERVER_NAME)
            .map_err(|e| anyhow!("Invalid server name: {}", e))?;
        Ok(self.connector.connect(name, socket).await?)
    }

    /// Open a connection and send the request frame for `route`
    async fn request(&self, route: Route, payload: Bytes) -> Result<Packets> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, self.dial())
            .await
            .map_err(|_| anyhow!("Timed out connecting to {}", self.addr))?
            .with_context(|| format!("Failed to connect to daemon at {}", self.addr))?;

        let mut framed = Framed::new(stream, RequestCodec::new());
        framed.send(RequestFrame::new(route.as_str(), payload)).await?;
        Ok(framed.map_codec(|_| PacketCodec::new()))
    }

    async fn reply(packets: &mut Packets) -> Result<Bytes> {
        match packets.next().await {
            Some(packet) => Ok(packet?),
            None => bail!("Daemon closed the connection without replying"),
        }
    }

    async fn fetch_state(&self, service: &str) -> Result<Vec<u8>> {
        let payload = encode(&StateRequest {
            service: service.to_string(),
        })?;
        let mut packets = self.request(Route::ServiceStatus, payload).await?;
        let response: StateResponse = decode(&Self::reply(&mut packets).await?)?;
        Ok(response.state)
    }

    /// Installation state and service statuses
    pub async fn state(&self) -> Result<MetaState> {
        let state = self.fetch_state("eco").await?;
        Ok(decode(&state)?)
    }

    /// Node settings and RPC credentials, if the daemon has them
    pub async fn node_state(&self) -> Result<Option<NodeState>> {
        let state = self.fetch_state("dcrd").await?;
        if state.is_empty() {
            return Ok(None);
        }
        Ok(Some(decode(&state)?))
    }

    /// Start initialization and receive its progress
    ///
    /// The receiver closes after a report that is complete or carries an
    /// error, or when the connection drops.
    pub async fn init(
        &self,
        mode: SyncMode,
        passphrase: &[u8],
    ) -> Result<mpsc::Receiver<Result<Progress>>> {
        let payload = encode(&InitRequest {
            sync_mode: mode.as_u8(),
            passphrase: passphrase.to_vec(),
        })?;
        let mut packets = self.request(Route::Init, payload).await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            while let Some(packet) = packets.next().await {
                let progress = packet
                    .map_err(anyhow::Error::from)
                    .and_then(|p| decode::<Progress>(&p).map_err(Into::into));
                let done = match &progress {
                    Ok(p) => p.is_terminal(),
                    Err(_) => true,
                };
                if tx.send(progress).await.is_err() || done {
                    break;
                }
            }
        });
        Ok(rx)
    }

    /// Subscribe to sync updates and service status changes
    pub async fn feed(&self) -> Result<BoxStream<'static, Result<FeedEvent>>> {
        let packets = self.request(Route::Sync, Bytes::new()).await?;
        Ok(packets
            .filter_map(|packet| async move {
                let message = packet
                    .map_err(anyhow::Error::from)
                    .and_then(|p| decode::<FeedMessage>(&p).map_err(Into::into));
                match message.and_then(|m| m.event().map_err(Into::into)) {
                    Ok(Some(event)) => Some(Ok(event)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed())
    }

    /// Ask the daemon to open an application
    pub async fn start_app(&self, app: App) -> Result<()> {
        let mut packets = self.request(app.route(), Bytes::new()).await?;
        let reply = Self::reply(&mut packets).await?;
        if reply.is_empty() {
            return Ok(());
        }
        let error: ErrorReply = decode(&reply)?;
        bail!("{}", error.message)
    }

    /// Run a control command against the wallet or node
    pub async fn ctl(&self, cmd: &str) -> Result<String> {
        let payload = encode(&CtlRequest {
            cmd: cmd.to_string(),
        })?;
        let mut packets = self.request(Route::Ctl, payload).await?;
        let response: CtlResponse = decode(&Self::reply(&mut packets).await?)?;
        if !response.err.is_empty() {
            bail!("{}", response.err);
        }
        Ok(response.body)
    }
}
