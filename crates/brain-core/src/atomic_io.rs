use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Context, Result};

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Replaces `path` with `content` through a sibling temp file and a rename.
///
/// The temp file is flushed to disk before the rename, so a crash leaves
/// either the previous document or the new one. Temp names carry the process
/// id and a per-process sequence number; two writers in the same millisecond
/// never share one. A failed write removes its temp file.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let temp_path = temp_sibling(parent_dir, path);
    let written = write_synced(&temp_path, content).and_then(|()| {
        std::fs::rename(&temp_path, path).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                temp_path.display(),
                path.display()
            )
        })
    });
    if written.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    written
}

fn temp_sibling(parent_dir: &Path, path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("brain-document");
    let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    parent_dir.join(format!(
        ".{file_name}.tmp-{}-{sequence}",
        std::process::id()
    ))
}

fn write_synced(temp_path: &Path, content: &str) -> Result<()> {
    let mut file = File::create(temp_path)
        .with_context(|| format!("failed to create temporary file {}", temp_path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("failed to write temporary file {}", temp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to flush temporary file {}", temp_path.display()))
}
