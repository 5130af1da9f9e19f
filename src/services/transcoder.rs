use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempPath;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

/// Longest stderr excerpt kept on a failed run.
const STDERR_TAIL: usize = 2048;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("{binary} exited with {status}: {stderr}")]
    Failed {
        binary: String,
        status: String,
        stderr: String,
    },
}

/// Rewrites a staged video so playback can start before the download ends.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the rewritten file, deleted when the returned path is dropped.
    /// The input is left untouched.
    async fn rewrite(&self, path: &Path) -> Result<TempPath, TranscodeError>;
}

/// Remuxes with ffmpeg, copying streams and moving the `moov` atom to the front.
pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn output_path(input: &Path) -> PathBuf {
        let mut output = input.as_os_str().to_owned();
        output.push(".processing");
        PathBuf::from(output)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn rewrite(&self, path: &Path) -> Result<TempPath, TranscodeError> {
        // Owned before the spawn so a cancelled or failed run leaves nothing behind.
        let output_path = TempPath::from_path(Self::output_path(path));
        let binary = self.binary.display().to_string();

        info!(input = %path.display(), "Running fast-start remux");

        // kill_on_drop: a dropped request future must not leave ffmpeg running.
        let output = Command::new(&self.binary)
            .arg("-y")
            .arg("-v")
            .arg("error")
            .arg("-i")
            .arg(path)
            .arg("-c")
            .arg("copy")
            .arg("-movflags")
            .arg("faststart")
            .arg("-f")
            .arg("mp4")
            .arg(&output_path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TranscodeError::Spawn {
                binary: binary.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let tail = match stderr.char_indices().rev().nth(STDERR_TAIL) {
                Some((idx, _)) => &stderr[idx..],
                None => stderr,
            };
            error!(binary = %binary, status = %output.status, "ffmpeg failed: {}", tail);

            return Err(TranscodeError::Failed {
                binary,
                status: output.status.to_string(),
                stderr: tail.to_string(),
            });
        }

        Ok(output_path)
    }
}
