//! Windows

use std::path::{Path, PathBuf};

use super::{search_path, AssetPatterns, Platform};

/// Windows: zip bundles, the GUI wallet ships as a bare installer
pub struct WindowsPlatform {
    arch: String,
    patterns: AssetPatterns,
}

impl WindowsPlatform {
    pub fn new(arch: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            arch: arch.to_string(),
            patterns: AssetPatterns::build("windows", arch, ".zip", ".exe")?,
        })
    }
}

impl Platform for WindowsPlatform {
    fn os(&self) -> &str {
        "windows"
    }

    fn arch(&self) -> &str {
        &self.arch
    }

    fn asset_patterns(&self) -> &AssetPatterns {
        &self.patterns
    }

    fn exe_name(&self, base: &str) -> String {
        format!("{}.exe", base)
    }

    fn gui_config_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("Decrediton").join("config.json"))
    }

    fn browser_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        for var in ["ProgramFiles", "ProgramFiles(x86)", "LOCALAPPDATA"] {
            if let Some(root) = std::env::var_os(var).map(PathBuf::from) {
                for rel in [
                    "Google\\Chrome\\Application\\chrome.exe",
                    "Chromium\\Application\\chrome.exe",
                    "BraveSoftware\\Brave-Browser\\Application\\brave.exe",
                ] {
                    let path = root.join(rel);
                    if path.is_file() {
                        candidates.push(path);
                    }
                }
            }
        }
        candidates.extend(search_path(&["chrome.exe", "chromium.exe"]));
        candidates
    }

    fn browser_in(&self, dir: &Path) -> PathBuf {
        dir.join("chrome.exe")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_patterns() {
        let platform = WindowsPlatform::new("amd64").unwrap();
        let patterns = platform.asset_patterns();

        assert!(patterns.program.is_match("decred-windows-amd64-v1.6.0-rc3.zip"));
        assert!(!patterns.program.is_match("decred-windows-386-v1.6.0-rc3.zip"));
        assert!(patterns.gui.is_match("decrediton-v1.6.0-rc3.exe"));
        assert!(patterns.exchange.is_match("dexc-windows-amd64-v0.1.2.zip"));
        assert_eq!(platform.exe_name("dcrctl"), "dcrctl.exe");
    }
}
