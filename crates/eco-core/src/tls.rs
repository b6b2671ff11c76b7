//! TLS material for the control-plane socket
//!
//! On first start the daemon creates a local CA and a `localhost` leaf
//! certificate signed by it. Clients trust only the CA file.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::error::TlsError;

/// Server name clients verify against
pub const SERVER_NAME: &str = "localhost";

/// Locations of the TLS files
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub ca_cert: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Generate the CA and leaf pair unless it already exists
///
/// Returns true if new material was written. Finding only one half of the
/// leaf pair is an error rather than a reason to overwrite it.
pub fn ensure_certificates(paths: &TlsPaths) -> Result<bool, TlsError> {
    match (paths.cert.exists(), paths.key.exists()) {
        (true, true) => return Ok(false),
        (true, false) => {
            return Err(TlsError::PartialPair {
                present: paths.cert.clone(),
                missing: paths.key.clone(),
            })
        }
        (false, true) => {
            return Err(TlsError::PartialPair {
                present: paths.key.clone(),
                missing: paths.cert.clone(),
            })
        }
        (false, false) => {}
    }

    tracing::info!("Generating TLS certificates at {:?}", paths.cert);

    let mut ca_params = CertificateParams::new(Vec::<String>::new())?;
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "eco local CA");
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    let ca_keypair = KeyPair::generate()?;
    let ca_cert = ca_params.self_signed(&ca_keypair)?;

    let mut params = CertificateParams::new(vec![
        SERVER_NAME.to_string(),
        "127.0.0.1".to_string(),
    ])?;
    params.distinguished_name.push(DnType::CommonName, "eco");
    let keypair = KeyPair::generate()?;
    let cert = params.signed_by(&keypair, &ca_cert, &ca_keypair)?;

    for path in [&paths.ca_cert, &paths.cert, &paths.key] {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
    }

    fs::write(&paths.ca_cert, ca_cert.pem())?;
    fs::write(&paths.cert, cert.pem())?;
    fs::write(&paths.key, keypair.serialize_pem())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&paths.key, fs::Permissions::from_mode(0o600))?;
    }

    Ok(true)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = BufReader::new(File::open(path)?);
    Ok(rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| TlsError::MissingKey(path.to_path_buf()))
}

/// Server configuration for the control-plane listener
pub fn server_config(paths: &TlsPaths) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = load_certs(&paths.cert)?;
    let key = load_key(&paths.key)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(Arc::new(config))
}

/// Client configuration trusting only the given CA
pub fn client_config(ca_cert: &Path) -> Result<Arc<ClientConfig>, TlsError> {
    let mut roots = RootCertStore::empty();
    roots.add_parsable_certificates(load_certs(ca_cert)?);

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}
