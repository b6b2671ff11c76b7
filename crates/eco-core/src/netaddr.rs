//! Listener address and its discovery file
//!
//! After binding, the daemon advertises where it listens by writing a one
//! line file of the form `"<network> <address>"`, e.g.
//! `unix /home/me/.local/share/eco/decred.sock` or `tcp4 127.0.0.1:45219`.
//! Clients read the file to find the socket.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default unix socket file name
pub const UNIX_SOCKET_FILENAME: &str = "decred.sock";

/// Default loopback TCP address on platforms without unix sockets
pub const TCP_SOCKET_ADDRESS: &str = "127.0.0.1:45219";

/// Name of the address discovery file
pub const LISTENER_FILENAME: &str = "addr.txt";

/// Socket network type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    #[serde(rename = "unix")]
    Unix,
    #[serde(rename = "tcp4")]
    Tcp,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unix => "unix",
            Self::Tcp => "tcp4",
        }
    }
}

/// A listen or dial address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetAddr {
    pub network: Network,
    pub address: String,
}

impl NetAddr {
    /// A unix socket at `path`
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Self {
            network: Network::Unix,
            address: path.as_ref().to_string_lossy().into_owned(),
        }
    }

    /// A TCP socket at `addr`
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self {
            network: Network::Tcp,
            address: addr.into(),
        }
    }

    /// Platform default listen address for an app directory
    pub fn default_for(app_dir: &Path) -> Self {
        if cfg!(unix) {
            Self::unix(app_dir.join(UNIX_SOCKET_FILENAME))
        } else {
            Self::tcp(TCP_SOCKET_ADDRESS)
        }
    }

    /// Write the discovery file
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_string())
    }

    /// Read a discovery file
    pub fn read_from(path: &Path) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        contents
            .parse()
            .map_err(|e: String| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Socket path for a unix address
    pub fn unix_path(&self) -> Option<PathBuf> {
        match self.network {
            Network::Unix => Some(PathBuf::from(&self.address)),
            Network::Tcp => None,
        }
    }
}

impl fmt::Display for NetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.network.as_str(), self.address)
    }
}

impl FromStr for NetAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (network, address) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| format!("malformed listener address: {:?}", s))?;

        let network = match network {
            "unix" => Network::Unix,
            "tcp" | "tcp4" => Network::Tcp,
            other => return Err(format!("unknown network type: {}", other)),
        };

        // Socket paths may contain spaces
        let address = address.trim();
        if address.is_empty() {
            return Err("empty listener address".to_string());
        }

        Ok(Self {
            network,
            address: address.to_string(),
        })
    }
}
