//! Platform services
//!
//! Everything that differs between target systems sits behind the
//! [`Platform`] trait: release asset naming, executable suffixes, where the
//! GUI wallet keeps its config, and where a browser might be installed.
//! [`current`] picks the implementation for the running system; tests can
//! inject either one.

mod unix;
mod windows;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

pub use unix::UnixPlatform;
pub use windows::WindowsPlatform;

/// Release asset name patterns for one platform
///
/// Each bundle pattern captures the version in group 1.
#[derive(Debug, Clone)]
pub struct AssetPatterns {
    pub program: Regex,
    pub gui: Regex,
    pub exchange: Regex,
    pub manifest: Regex,
}

impl AssetPatterns {
    /// Compile the patterns for an os/arch pair and bundle extensions
    pub(crate) fn build(
        os: &str,
        arch: &str,
        bundle_ext: &str,
        gui_ext: &str,
    ) -> Result<Self, regex::Error> {
        let os = regex::escape(os);
        let arch = regex::escape(arch);
        let bundle_ext = regex::escape(bundle_ext);
        let gui_ext = regex::escape(gui_ext);

        Ok(Self {
            program: Regex::new(&format!(r"^decred-{os}-{arch}-v(.*){bundle_ext}$"))?,
            gui: Regex::new(&format!(r"^decrediton-v(.*){gui_ext}$"))?,
            exchange: Regex::new(&format!(r"^dexc-{os}-{arch}-v(.*){bundle_ext}$"))?,
            manifest: Regex::new(r"^.*-manifest\.txt$")?,
        })
    }
}

/// Per-OS behaviour used by the installer and orchestrator
pub trait Platform: Send + Sync {
    /// OS name as used in release asset names
    fn os(&self) -> &str;

    /// Architecture name as used in release asset names
    fn arch(&self) -> &str;

    /// Asset name patterns for this platform
    fn asset_patterns(&self) -> &AssetPatterns;

    /// File name of an executable
    fn exe_name(&self, base: &str) -> String;

    /// Location of the GUI wallet's config file
    fn gui_config_path(&self) -> Option<PathBuf>;

    /// Browser executables worth probing, most preferred first
    fn browser_candidates(&self) -> Vec<PathBuf>;

    /// Browser executable inside an unpacked browser archive
    fn browser_in(&self, dir: &Path) -> PathBuf;
}

/// Map a Rust architecture name to the release naming
pub fn release_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "arm" => "arm",
        other => other,
    }
}

/// Map a Rust OS name to the release naming
pub fn release_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

/// Platform services for the running system
pub fn current() -> Result<Arc<dyn Platform>, regex::Error> {
    let os = release_os(std::env::consts::OS);
    let arch = release_arch(std::env::consts::ARCH);

    if cfg!(windows) {
        Ok(Arc::new(WindowsPlatform::new(arch)?))
    } else {
        Ok(Arc::new(UnixPlatform::new(os, arch)?))
    }
}

/// Executables named `names` found on `PATH`
pub(crate) fn search_path(names: &[&str]) -> Vec<PathBuf> {
    let Some(path) = std::env::var_os("PATH") else {
        return Vec::new();
    };

    let dirs: Vec<PathBuf> = std::env::split_paths(&path).collect();
    names
        .iter()
        .flat_map(|name| dirs.iter().map(move |dir| dir.join(name)))
        .filter(|candidate| candidate.is_file())
        .collect()
}
