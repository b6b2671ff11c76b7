//! Unpacking bundles into the install tree
//!
//! These are blocking filesystem operations; async callers run them on the
//! blocking pool.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::error::{DaemonError, Result};

/// Container format of a downloaded asset, from its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Zip,
    /// Shipped as-is, copied without unpacking
    Raw,
}

impl ArchiveKind {
    pub fn from_name(name: &str) -> Self {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else if name.ends_with(".zip") {
            Self::Zip
        } else {
            Self::Raw
        }
    }
}

/// Unpack `archive` (named `name`) and move its contents into `dest`
///
/// A single top-level directory in the archive is stripped.
pub fn install_archive(archive: &Path, name: &str, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;

    let scratch = tempfile::tempdir()?;
    match ArchiveKind::from_name(name) {
        ArchiveKind::TarGz => unpack_tar_gz(archive, scratch.path())?,
        ArchiveKind::Zip => unpack_zip(archive, scratch.path())?,
        ArchiveKind::Raw => {
            let target = dest.join(name);
            fs::copy(archive, &target)?;
            set_executable(&target)?;
            return Ok(());
        }
    }

    let root = content_root(scratch.path())?;
    tracing::debug!("Moving {} from {:?} to {:?}", name, root, dest);
    move_contents(&root, dest)
}

fn unpack_tar_gz(archive: &Path, dir: &Path) -> Result<()> {
    let decoder = GzDecoder::new(File::open(archive)?);
    let mut tar = tar::Archive::new(decoder);
    tar.set_preserve_permissions(true);
    tar.unpack(dir)
        .map_err(|e| DaemonError::Archive(format!("tar.gz extraction failed: {}", e)))
}

fn unpack_zip(archive: &Path, dir: &Path) -> Result<()> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            return Err(DaemonError::Archive(format!(
                "zip entry {:?} escapes the extraction directory",
                entry.name()
            )));
        };
        let out = dir.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

/// The directory whose contents get installed
fn content_root(dir: &Path) -> Result<PathBuf> {
    let entries: Vec<_> = fs::read_dir(dir)?.collect::<io::Result<_>>()?;
    match entries.as_slice() {
        [only] if only.file_type()?.is_dir() => Ok(only.path()),
        _ => Ok(dir.to_path_buf()),
    }
}

/// Move the tree under `from` into `to`, merging directories
///
/// Sample `.conf` files are skipped. Falls back to copy and delete when a
/// rename crosses filesystems.
pub fn move_contents(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;

    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let src = entry.path();
        let dst = to.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            move_contents(&src, &dst)?;
            continue;
        }

        if src.extension().is_some_and(|ext| ext == "conf") {
            tracing::debug!("Skipping sample config file {:?}", src);
            continue;
        }

        if fs::rename(&src, &dst).is_err() {
            fs::copy(&src, &dst)?;
            fs::remove_file(&src)?;
        }
    }
    Ok(())
}

fn set_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
