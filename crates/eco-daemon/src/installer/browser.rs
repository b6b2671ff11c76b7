//! Browser discovery for the exchange window

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;

use crate::platform::Platform;

/// Oldest browser major version that renders the exchange UI
pub const MIN_BROWSER_MAJOR: u32 = 76;

const VERSION_PATTERN: &str = r"^[^\d]*(\d+)\.(\d+)\.(\d+)";

/// Parse `major.minor.patch` out of a `--version` banner
pub fn parse_version(banner: &str) -> Option<(u32, u32, u32)> {
    let re = Regex::new(VERSION_PATTERN).ok()?;
    let caps = re.captures(banner.trim())?;
    Some((
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

/// Ask a browser executable for its version
pub async fn browser_version(path: &Path) -> Option<(u32, u32, u32)> {
    let output = tokio::time::timeout(
        Duration::from_secs(10),
        Command::new(path).arg("--version").kill_on_drop(true).output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }
    parse_version(&String::from_utf8_lossy(&output.stdout))
}

/// First compatible browser, preferring one installed under `installed_dir`
pub async fn find_browser(platform: &dyn Platform, installed_dir: &Path) -> Option<PathBuf> {
    let installed = platform.browser_in(installed_dir);
    if installed.is_file() {
        return Some(installed);
    }

    for candidate in platform.browser_candidates() {
        match browser_version(&candidate).await {
            Some((major, minor, patch)) if major >= MIN_BROWSER_MAJOR => {
                tracing::info!(
                    "Using browser {:?} ({}.{}.{})",
                    candidate,
                    major,
                    minor,
                    patch
                );
                return Some(candidate);
            }
            Some((major, ..)) => {
                tracing::debug!("Browser {:?} too old (major {})", candidate, major);
            }
            None => tracing::debug!("Could not determine version of {:?}", candidate),
        }
    }
    None
}
