//! Linux and macOS

use std::path::{Path, PathBuf};

use super::{search_path, AssetPatterns, Platform};

const BROWSER_NAMES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "brave-browser",
];

const MAC_BROWSERS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

/// Unix-like systems: tarball bundles, no executable suffix
pub struct UnixPlatform {
    os: String,
    arch: String,
    patterns: AssetPatterns,
}

impl UnixPlatform {
    pub fn new(os: &str, arch: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            os: os.to_string(),
            arch: arch.to_string(),
            patterns: AssetPatterns::build(os, arch, ".tar.gz", ".tar.gz")?,
        })
    }

    fn is_mac(&self) -> bool {
        self.os == "darwin"
    }
}

impl Platform for UnixPlatform {
    fn os(&self) -> &str {
        &self.os
    }

    fn arch(&self) -> &str {
        &self.arch
    }

    fn asset_patterns(&self) -> &AssetPatterns {
        &self.patterns
    }

    fn exe_name(&self, base: &str) -> String {
        base.to_string()
    }

    fn gui_config_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("decrediton").join("config.json"))
    }

    fn browser_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if self.is_mac() {
            candidates.extend(
                MAC_BROWSERS
                    .iter()
                    .map(PathBuf::from)
                    .filter(|p| p.is_file()),
            );
        }
        candidates.extend(search_path(BROWSER_NAMES));
        candidates
    }

    fn browser_in(&self, dir: &Path) -> PathBuf {
        if self.is_mac() {
            dir.join("Chromium.app")
                .join("Contents")
                .join("MacOS")
                .join("Chromium")
        } else {
            dir.join("chrome")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_patterns() {
        let platform = UnixPlatform::new("linux", "amd64").unwrap();
        let patterns = platform.asset_patterns();

        assert!(patterns.program.is_match("decred-linux-amd64-v1.6.0.tar.gz"));
        assert!(!patterns.program.is_match("decred-linux-arm64-v1.6.0.tar.gz"));
        assert!(!patterns.program.is_match("decred-windows-amd64-v1.6.0.zip"));
        assert!(patterns.gui.is_match("decrediton-v1.6.0-rc3.tar.gz"));
        assert!(!patterns.gui.is_match("decrediton-v1.6.0-rc3.dmg"));
        assert_eq!(
            &patterns
                .exchange
                .captures("dexc-linux-amd64-v0.1.2.tar.gz")
                .unwrap()[1],
            "0.1.2"
        );
        assert!(patterns.manifest.is_match("decred-v1.6.0-rc3-manifest.txt"));
        assert!(!patterns.manifest.is_match("decred-v1.6.0-rc3-manifest.txt.asc"));
    }

    #[test]
    fn test_browser_in_archive() {
        let linux = UnixPlatform::new("linux", "amd64").unwrap();
        assert_eq!(
            linux.browser_in(Path::new("/eco/chromium")),
            PathBuf::from("/eco/chromium/chrome")
        );
        assert_eq!(linux.exe_name("dcrd"), "dcrd");
    }
}
