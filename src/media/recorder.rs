//! Recorder adapter: one external process per recording segment.

use super::exec::spawn_error;
use crate::error::{DictapiError, Result};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tracing::debug;

/// Starts recording processes.
///
/// Implementations must be shareable so the transport can hold one behind an
/// `Arc` next to the other media tools.
pub trait Recorder: Send + Sync {
    /// Start writing a new recording to `path`.
    fn start(&self, path: &Path) -> Result<Box<dyn RecordingProcess>>;
}

/// A running recording.
pub trait RecordingProcess: Send {
    /// File the recording is written to.
    fn path(&self) -> &Path;

    /// Ask the recorder to finish the file and wait for it to exit.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Recorder running `<program> <path>`, e.g. SoX `rec`.
#[derive(Debug, Clone)]
pub struct SoxRecorder {
    program: String,
}

impl SoxRecorder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Recorder for SoxRecorder {
    fn start(&self, path: &Path) -> Result<Box<dyn RecordingProcess>> {
        let child = Command::new(&self.program)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(&self.program, e))?;
        debug!(pid = child.id(), path = %path.display(), "recorder started");
        Ok(Box::new(SoxRecording {
            child,
            path: path.to_path_buf(),
        }))
    }
}

struct SoxRecording {
    child: Child,
    path: PathBuf,
}

impl RecordingProcess for SoxRecording {
    fn path(&self) -> &Path {
        &self.path
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        if self.child.try_wait()?.is_some() {
            return Err(DictapiError::ProcessGone {
                message: format!("recorder for {} exited early", self.path.display()),
            });
        }

        let pid = libc::pid_t::try_from(self.child.id())
            .map_err(|_| DictapiError::Other(format!("pid {} out of range", self.child.id())))?;
        // SAFETY: pid belongs to our own unreaped child, so it cannot have been recycled
        let ret = unsafe { libc::kill(pid, libc::SIGINT) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        let status = self.child.wait()?;
        debug!(?status, path = %self.path.display(), "recorder exited");
        Ok(())
    }
}
