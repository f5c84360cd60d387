//! # Muxer
//!
//! Wraps an external `ffmpeg` binary that combines the reassembled video and
//! audio streams into one container with stream copy (no re-encode).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Default mux timeout: 10 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Error, Debug)]
pub enum MuxError {
    #[error("ffmpeg not found on PATH: {0}")]
    NotFound(#[from] which::Error),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct Muxer {
    program: PathBuf,
    timeout: Duration,
}

impl Muxer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Finds `ffmpeg` on `PATH`
    pub fn locate() -> Result<Self, MuxError> {
        let program = which::which("ffmpeg")?;
        debug!(path = %program.display(), "Located ffmpeg");
        Ok(Self::new(program))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for a stream-copy mux of `video` and optional `audio` into `output`
    pub fn args(video: &Path, audio: Option<&Path>, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-i".into(), video.as_os_str().into()];
        if let Some(audio) = audio {
            args.push("-i".into());
            args.push(audio.as_os_str().into());
        }
        args.extend(["-c:v", "copy", "-c:a", "copy"].map(OsString::from));
        args.push(output.as_os_str().into());
        args
    }

    pub async fn mux(
        &self,
        video: &Path,
        audio: Option<&Path>,
        output: &Path,
    ) -> Result<(), MuxError> {
        let program_name = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string());
        let args = Self::args(video, audio, output);
        info!(program = %program_name, output = %output.display(), "Muxing streams");
        debug!(?args, "Mux command line");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MuxError::Spawn {
                program: program_name.clone(),
                source,
            })?;

        let output_result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| MuxError::Timeout {
                program: program_name.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| MuxError::Spawn {
                program: program_name.clone(),
                source,
            })?;

        if !output_result.status.success() {
            return Err(MuxError::Failed {
                program: program_name,
                status: output_result.status,
                stderr: String::from_utf8_lossy(&output_result.stderr).trim().to_string(),
            });
        }

        info!(output = %output.display(), "Mux complete");
        Ok(())
    }
}
