use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use brain_core::filename_stamp;

use crate::capture_note::CapturedNote;

/// Writes captured notes under `<inbox_root>/<source>/`, one file per note.
#[derive(Debug, Clone)]
pub struct NoteStore {
    inbox_root: PathBuf,
}

impl NoteStore {
    pub fn new(inbox_root: impl Into<PathBuf>) -> Self {
        Self {
            inbox_root: inbox_root.into(),
        }
    }

    pub fn inbox_root(&self) -> &Path {
        self.inbox_root.as_path()
    }

    pub fn channel_dir(&self, source: &str) -> PathBuf {
        self.inbox_root.join(source)
    }

    /// Persists `note` as `<stamp>-<slug>.md` and returns its path.
    ///
    /// Existing notes are never overwritten: a name collision gets a numeric suffix.
    pub fn write(&self, note: &CapturedNote) -> Result<PathBuf> {
        let dir = self.channel_dir(&note.source);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create inbox directory {}", dir.display()))?;

        let stem = format!("{}-{}", filename_stamp(note.timestamp), note.slug());
        let content = note.render();
        let mut attempt = 0_u32;
        loop {
            let file_name = if attempt == 0 {
                format!("{stem}.md")
            } else {
                format!("{stem}-{attempt}.md")
            };
            let path = dir.join(file_name);
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(content.as_bytes())
                        .with_context(|| format!("failed to write note {}", path.display()))?;
                    return Ok(path);
                }
                Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => {
                    return Err(error)
                        .with_context(|| format!("failed to create note {}", path.display()));
                }
            }
        }
    }
}
