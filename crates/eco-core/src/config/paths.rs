//! Filesystem layout under the app directory

use std::path::{Path, PathBuf};

use eco_protocol::ServiceId;

use crate::netaddr::LISTENER_FILENAME;
use crate::tls::TlsPaths;

/// Subdirectory of an installed version holding the program bundle
pub const PROGRAM_SUBDIR: &str = "decred";

/// Every path the daemon reads or writes, derived from one root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Durable store directory
    pub fn db_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    /// Listener discovery file
    pub fn addr_file(&self) -> PathBuf {
        self.root.join(LISTENER_FILENAME)
    }

    /// Control-plane TLS files
    pub fn tls(&self) -> TlsPaths {
        TlsPaths {
            ca_cert: self.root.join("decred-eco-ca.cert"),
            cert: self.root.join("decred-eco.cert"),
            key: self.root.join("decred-eco.key"),
        }
    }

    /// Root of one installed release
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    /// Program bundle (node, wallet, ctl tool) of a release
    pub fn program_dir(&self, version: &str) -> PathBuf {
        self.version_dir(version).join(PROGRAM_SUBDIR)
    }

    /// Directory holding a service's executable for a release
    pub fn bundle_dir(&self, version: &str, svc: ServiceId) -> PathBuf {
        match svc {
            ServiceId::Dcrd | ServiceId::Dcrwallet => self.program_dir(version),
            ServiceId::Decrediton => self.version_dir(version).join("decrediton"),
            ServiceId::Dexc => self.version_dir(version).join("dexc"),
        }
    }

    /// Data directory a service is pointed at with `--appdata`
    pub fn service_data_dir(&self, svc: ServiceId) -> PathBuf {
        self.root.join(svc.as_str())
    }

    /// Node RPC certificate, written by the node on first start
    pub fn node_rpc_cert(&self) -> PathBuf {
        self.service_data_dir(ServiceId::Dcrd).join("rpc.cert")
    }

    /// Wallet RPC certificate
    pub fn wallet_rpc_cert(&self) -> PathBuf {
        self.service_data_dir(ServiceId::Dcrwallet).join("rpc.cert")
    }

    /// Wallet RPC key
    pub fn wallet_rpc_key(&self) -> PathBuf {
        self.service_data_dir(ServiceId::Dcrwallet).join("rpc.key")
    }

    /// Wallet database; its presence means a wallet exists
    pub fn wallet_db(&self) -> PathBuf {
        self.service_data_dir(ServiceId::Dcrwallet)
            .join("mainnet")
            .join("wallet.db")
    }

    /// Installed browser, when one had to be downloaded
    pub fn browser_dir(&self) -> PathBuf {
        self.root.join("chromium")
    }

    /// Browser profile used for the exchange window
    pub fn browser_profile_dir(&self) -> PathBuf {
        self.root.join("chromium-profile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = AppPaths::new("/data/eco");
        assert_eq!(
            paths.bundle_dir("1.6.0", ServiceId::Dcrwallet),
            PathBuf::from("/data/eco/1.6.0/decred")
        );
        assert_eq!(
            paths.bundle_dir("1.6.0", ServiceId::Dexc),
            PathBuf::from("/data/eco/1.6.0/dexc")
        );
        assert_eq!(
            paths.node_rpc_cert(),
            PathBuf::from("/data/eco/dcrd/rpc.cert")
        );
    }
}
