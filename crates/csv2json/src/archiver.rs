//! Terminal archiving: every input ends up in exactly one category
//! directory.
//!
//! Moves try an atomic rename first and fall back to copy-then-delete for
//! cross-device targets (bind-mounted volumes). Failed files get a
//! best-effort `.error` sidecar with the failure reason.

use crate::error::{IngestError, Result};
use chrono::{Local, SecondsFormat};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Terminal category for a processed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Processed,
    Ignored,
    Failed,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Processed => "processed",
            Category::Ignored => "ignored",
            Category::Failed => "failed",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Archiver {
    processed: PathBuf,
    ignored: PathBuf,
    failed: PathBuf,
    add_timestamp: bool,
}

impl Archiver {
    pub fn new(processed: PathBuf, ignored: PathBuf, failed: PathBuf, add_timestamp: bool) -> Self {
        Self {
            processed,
            ignored,
            failed,
            add_timestamp,
        }
    }

    fn dir_for(&self, category: Category) -> &Path {
        match category {
            Category::Processed => &self.processed,
            Category::Ignored => &self.ignored,
            Category::Failed => &self.failed,
        }
    }

    /// Move `file_path` under the category directory and return the archived
    /// path. A `reason` writes an `.error` sidecar next to the archived file;
    /// sidecar failures are logged, not fatal. When the move itself fails the
    /// input stays in place and the error is returned.
    pub fn archive(
        &self,
        file_path: &Path,
        category: Category,
        reason: Option<&str>,
    ) -> Result<PathBuf> {
        let dir = self.dir_for(category);
        fs::create_dir_all(dir).map_err(|e| {
            IngestError::Archive(format!(
                "failed to create archive directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                IngestError::Archive(format!("invalid file name: {}", file_path.display()))
            })?;
        let (stem, ext) = split_name(filename);
        let stamp = if self.add_timestamp {
            Some(Local::now().format("%Y%m%d_%H%M%S").to_string())
        } else {
            None
        };

        let mut target = dir.join(archive_name(stem, stamp.as_deref(), None, ext));
        let mut counter = 1u32;
        while target.exists() {
            target = dir.join(archive_name(stem, stamp.as_deref(), Some(counter), ext));
            counter += 1;
        }

        move_file(file_path, &target)?;

        if let Some(reason) = reason {
            if let Err(e) = write_sidecar(&target, reason) {
                warn!(
                    "failed to create error sidecar for {}: {}",
                    target.display(),
                    e
                );
            }
        }

        Ok(target)
    }
}

/// Split `data.csv` into `("data", ".csv")`; a lone leading dot counts as
/// the extension, matching `filepath.Ext` semantics.
fn split_name(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(idx) => filename.split_at(idx),
        None => (filename, ""),
    }
}

fn archive_name(stem: &str, stamp: Option<&str>, counter: Option<u32>, ext: &str) -> String {
    let mut name = stem.to_string();
    if let Some(stamp) = stamp {
        name.push('_');
        name.push_str(stamp);
    }
    if let Some(counter) = counter {
        name.push_str(&format!("_{}", counter));
    }
    name.push_str(ext);
    name
}

/// Rename, falling back to copy + fsync + delete on cross-device errors.
/// After success the source no longer exists.
fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    copy_then_delete(src, dst)
}

fn copy_then_delete(src: &Path, dst: &Path) -> Result<()> {
    copy_synced(src, dst)
        .map_err(|e| IngestError::Archive(format!("failed to copy file to archive: {}", e)))?;
    fs::remove_file(src).map_err(|e| {
        IngestError::Archive(format!("failed to remove original file after copy: {}", e))
    })?;
    Ok(())
}

fn copy_synced(src: &Path, dst: &Path) -> io::Result<()> {
    let mut source = File::open(src)?;
    let mut dest = File::create(dst)?;
    io::copy(&mut source, &mut dest)?;
    dest.sync_all()
}

fn write_sidecar(archived: &Path, reason: &str) -> io::Result<()> {
    let sidecar = PathBuf::from(format!("{}.error", archived.display()));
    let basename = archived
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let content = format!(
        "Timestamp: {}\nFile: {}\nError: {}\n",
        Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        basename,
        reason
    );
    fs::write(sidecar, content)
}
