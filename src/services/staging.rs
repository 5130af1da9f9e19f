use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("failed to create scratch file: {0}")]
    Create(#[source] io::Error),

    #[error("failed to read upload body: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write scratch file: {0}")]
    Write(#[source] io::Error),
}

/// Drains inbound uploads into files under a scratch directory.
#[derive(Debug, Clone)]
pub struct ScratchStager {
    dir: PathBuf,
}

/// A staged upload on local disk.
///
/// The scratch file, and any rewritten copy adopted through
/// [`StagedUpload::adopt_rewrite`], is deleted when this value is dropped,
/// whichever way the pipeline exits.
#[derive(Debug)]
pub struct StagedUpload {
    original: TempPath,
    rewritten: Option<TempPath>,
    size_bytes: u64,
    declared_media_type: String,
}

impl ScratchStager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copies `reader` into a new scratch file, aborting once more than
    /// `limit` bytes arrive.
    pub async fn stage<R>(
        &self,
        mut reader: R,
        media_type: &str,
        ext: &str,
        limit: u64,
    ) -> Result<StagedUpload, StageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let file = tempfile::Builder::new()
            .prefix("tubely-upload-")
            .suffix(&format!(".{}", ext))
            .tempfile_in(&self.dir)
            .map_err(StageError::Create)?;
        let (file, path) = file.into_parts();
        let mut out = tokio::fs::File::from_std(file);

        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut written: u64 = 0;
        loop {
            let n = reader.read(&mut buffer).await.map_err(StageError::Read)?;
            if n == 0 {
                break;
            }
            written += n as u64;
            if written > limit {
                return Err(StageError::TooLarge { limit });
            }
            out.write_all(&buffer[..n]).await.map_err(StageError::Write)?;
        }
        out.flush().await.map_err(StageError::Write)?;
        drop(out);

        debug!(path = %path.display(), size = written, "Upload staged");

        Ok(StagedUpload {
            original: path,
            rewritten: None,
            size_bytes: written,
            declared_media_type: media_type.to_string(),
        })
    }
}

impl StagedUpload {
    /// Path of the current bytes: the rewritten file if one was adopted.
    pub fn path(&self) -> &Path {
        self.rewritten.as_deref().unwrap_or(&*self.original)
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn declared_media_type(&self) -> &str {
        &self.declared_media_type
    }

    /// Takes ownership of a file produced from this upload so it is released
    /// together with the original.
    pub fn adopt_rewrite(&mut self, path: TempPath) {
        if let Ok(meta) = std::fs::metadata(&path) {
            self.size_bytes = meta.len();
        }
        self.rewritten = Some(path);
    }

    /// Deletes the scratch files now and reports failures instead of
    /// swallowing them the way `Drop` has to.
    pub fn release(self) -> io::Result<()> {
        if let Some(rewritten) = self.rewritten {
            rewritten.close()?;
        }
        self.original.close()
    }
}
