// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rename-on-completion writes.
//!
//! Artifacts are built under a `.partial` sibling and moved into place only
//! once complete, so a reader sees either a finished artifact or nothing.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sibling staging path `<target>.partial`.
#[must_use]
pub fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map_or_else(OsString::new, std::ffi::OsStr::to_os_string);
    name.push(".partial");
    target.with_file_name(name)
}

/// Build a file at `target` through `fill`, publishing it only on success.
///
/// # Errors
///
/// Returns the first I/O error; the staging file is removed and `target`
/// is left untouched.
pub fn write_file<F>(target: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut fs::File) -> io::Result<()>,
{
    let staging = staging_path(target);
    let result = (|| {
        let mut file = fs::File::create(&staging)?;
        fill(&mut file)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&staging, target)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

/// Build a directory tree at `target` through `fill`, publishing it only on success.
///
/// Any previous tree at `target` is removed immediately before the staged
/// tree is renamed into place.
///
/// # Errors
///
/// Returns the first I/O error; the staging tree is removed.
pub fn write_dir<F>(target: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let staging = staging_path(target);
    let result = (|| {
        remove_any(&staging)?;
        fs::create_dir_all(&staging)?;
        fill(&staging)?;
        remove_any(target)?;
        fs::rename(&staging, target)
    })();
    if result.is_err() {
        let _ = remove_any(&staging);
    }
    result
}

/// Remove a file or directory tree; absent paths are not an error.
///
/// # Errors
///
/// Returns any removal error other than [`io::ErrorKind::NotFound`].
pub fn remove_any(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
