//! Upload-scoped scratch storage.
//!
//! Each upload gets `{scratch_root}/{upload_key}-{random}`. The directory
//! holds the source PDF until it is split and the per-student booklets
//! until they are persisted. It outlives the process that created it, so
//! the submitter and the ingest job can run in different workers.

use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;

/// File name of the uploaded source document inside a scratch directory.
pub const SOURCE_FILE: &str = "source.pdf";

const SUFFIX_LENGTH: usize = 12;

/// A scratch directory owned by one upload.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create a fresh directory for `upload_key` under `root`.
    pub async fn create(root: &Path, upload_key: &str) -> io::Result<Self> {
        let suffix: String = rand::rng()
            .sample_iter(&rand::distr::Alphanumeric)
            .take(SUFFIX_LENGTH)
            .map(char::from)
            .collect();
        let path = root.join(format!("{upload_key}-{suffix}"));
        tokio::fs::create_dir_all(&path).await?;
        tracing::debug!(path = %path.display(), "Scratch directory created");
        Ok(Self { path })
    }

    /// Take ownership of a directory created earlier.
    pub fn adopt(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source_path(&self) -> PathBuf {
        self.path.join(SOURCE_FILE)
    }

    /// Path of the booklet file for student `booklet_index`.
    pub fn booklet_path(&self, booklet_index: u32) -> PathBuf {
        self.path.join(format!("booklet-{booklet_index:05}.pdf"))
    }

    /// Remove the directory and everything in it.
    ///
    /// Releasing a directory that is already gone succeeds.
    pub async fn release(self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Scratch directory released");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Remove one scratch file, ignoring a file that is already gone.
pub async fn remove_file(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
