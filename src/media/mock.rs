//! In-memory media collaborators for tests and dry runs.
//!
//! Each mock is a cheap `Clone` handle over shared state, so a test can keep
//! one copy for inspection after handing another to the transport.

use super::player::{
    ExitWaiter, PlaybackRequest, PlayerControl, PlayerLauncher, PlayerSession, channel_exit,
};
use super::probe::{Encoder, Prober};
use super::recorder::{Recorder, RecordingProcess};
use crate::error::{DictapiError, Result};
use crate::timeline::Millis;
use crossbeam_channel::Sender;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Recorder that only touches the filesystem when asked to.
#[derive(Debug, Clone, Default)]
pub struct MockRecorder {
    state: Arc<Mutex<MockRecorderState>>,
}

#[derive(Debug, Default)]
struct MockRecorderState {
    started: Vec<PathBuf>,
    finished: Vec<PathBuf>,
    create_files: bool,
    fail_start: bool,
}

impl MockRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an empty file at the recording path on finish.
    pub fn with_files(self) -> Self {
        lock(&self.state).create_files = true;
        self
    }

    pub fn with_start_failure(self) -> Self {
        lock(&self.state).fail_start = true;
        self
    }

    pub fn started(&self) -> Vec<PathBuf> {
        lock(&self.state).started.clone()
    }

    pub fn finished(&self) -> Vec<PathBuf> {
        lock(&self.state).finished.clone()
    }
}

impl Recorder for MockRecorder {
    fn start(&self, path: &Path) -> Result<Box<dyn RecordingProcess>> {
        let mut state = lock(&self.state);
        if state.fail_start {
            return Err(DictapiError::ToolNotFound {
                tool: "mock-recorder".to_string(),
            });
        }
        state.started.push(path.to_path_buf());
        Ok(Box::new(MockRecording {
            path: path.to_path_buf(),
            state: self.state.clone(),
        }))
    }
}

struct MockRecording {
    path: PathBuf,
    state: Arc<Mutex<MockRecorderState>>,
}

impl RecordingProcess for MockRecording {
    fn path(&self) -> &Path {
        &self.path
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let mut state = lock(&self.state);
        if state.create_files {
            std::fs::write(&self.path, b"")?;
        }
        state.finished.push(self.path.clone());
        Ok(())
    }
}

/// Prober answering from a table, with a fallback duration.
#[derive(Debug, Clone)]
pub struct MockProber {
    durations: Arc<Mutex<HashMap<PathBuf, Millis>>>,
    fallback: Option<Millis>,
}

impl MockProber {
    /// Every unknown path reports `duration`.
    pub fn new(duration: Millis) -> Self {
        Self {
            durations: Arc::default(),
            fallback: Some(duration),
        }
    }

    /// Every unknown path fails to probe.
    pub fn failing() -> Self {
        Self {
            durations: Arc::default(),
            fallback: None,
        }
    }

    pub fn with_duration(self, path: impl Into<PathBuf>, duration: Millis) -> Self {
        self.set_duration(path, duration);
        self
    }

    pub fn set_duration(&self, path: impl Into<PathBuf>, duration: Millis) {
        lock(&self.durations).insert(path.into(), duration);
    }
}

impl Prober for MockProber {
    fn duration(&self, path: &Path) -> Result<Millis> {
        lock(&self.durations)
            .get(path)
            .copied()
            .or(self.fallback)
            .ok_or_else(|| DictapiError::Probe {
                path: path.display().to_string(),
                message: "mock prober has no duration".to_string(),
            })
    }
}

/// Encoder that records requested reversals.
#[derive(Debug, Clone, Default)]
pub struct MockEncoder {
    calls: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
    fail: bool,
}

impl MockEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        lock(&self.calls).clone()
    }
}

impl Encoder for MockEncoder {
    fn reverse(&self, src: &Path, dst: &Path) -> Result<()> {
        if self.fail {
            return Err(DictapiError::ToolFailed {
                message: "mock encoder failure".to_string(),
            });
        }
        lock(&self.calls).push((src.to_path_buf(), dst.to_path_buf()));
        Ok(())
    }
}

/// Player whose segments end only when the test says so.
#[derive(Clone, Default)]
pub struct MockPlayer {
    state: Arc<Mutex<MockPlayerState>>,
}

#[derive(Default)]
struct MockPlayerState {
    launches: Vec<PlaybackRequest>,
    commands: Vec<String>,
    time_position: Option<Millis>,
    current: Option<MockProcess>,
    fail_launch: bool,
}

struct MockProcess {
    exit: Sender<()>,
    exited: Arc<AtomicBool>,
}

impl MockProcess {
    fn end(self) {
        self.exited.store(true, Ordering::SeqCst);
        self.exit.send(()).ok();
    }
}

impl MockPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_launch_failure(self) -> Self {
        lock(&self.state).fail_launch = true;
        self
    }

    pub fn launches(&self) -> Vec<PlaybackRequest> {
        lock(&self.state).launches.clone()
    }

    pub fn last_launch(&self) -> Option<PlaybackRequest> {
        lock(&self.state).launches.last().cloned()
    }

    /// Commands received by all players so far.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.state).commands.clone()
    }

    /// Media time reported to the next position queries.
    pub fn set_time_position(&self, ms: Millis) {
        lock(&self.state).time_position = Some(ms);
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).current.is_some()
    }

    /// Ends the current player as if it reached its end position.
    pub fn finish_current(&self) -> bool {
        let current = lock(&self.state).current.take();
        match current {
            Some(process) => {
                process.end();
                true
            }
            None => false,
        }
    }
}

impl PlayerLauncher for MockPlayer {
    fn launch(&self, request: &PlaybackRequest) -> Result<PlayerSession> {
        let mut state = lock(&self.state);
        if state.fail_launch {
            return Err(DictapiError::ToolNotFound {
                tool: "mock-player".to_string(),
            });
        }
        if let Some(previous) = state.current.take() {
            previous.end();
        }
        state.launches.push(request.clone());

        let (exit_tx, exit): (_, Box<dyn ExitWaiter>) = channel_exit();
        let exited = Arc::new(AtomicBool::new(false));
        state.current = Some(MockProcess {
            exit: exit_tx,
            exited: exited.clone(),
        });

        Ok(PlayerSession {
            control: Box::new(MockControl {
                state: self.state.clone(),
                exited,
                replies: VecDeque::new(),
            }),
            exit,
        })
    }
}

struct MockControl {
    state: Arc<Mutex<MockPlayerState>>,
    exited: Arc<AtomicBool>,
    replies: VecDeque<String>,
}

impl PlayerControl for MockControl {
    fn send_command(&mut self, command: &str) -> Result<()> {
        if self.is_exited() {
            return Err(DictapiError::ProcessGone {
                message: format!("mock player exited before `{command}`"),
            });
        }
        let mut state = lock(&self.state);
        state.commands.push(command.to_string());

        if command.ends_with("get_time_pos")
            && let Some(ms) = state.time_position
        {
            self.replies.push_back(format!(
                "ANS_TIME_POSITION={}.{:03}",
                ms / 1000,
                ms % 1000
            ));
        } else if command == "quit"
            && let Some(process) = state.current.take()
        {
            process.end();
        }
        Ok(())
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<Option<String>> {
        Ok(self.replies.pop_front())
    }

    fn drain(&mut self) {
        self.replies.clear();
    }

    fn is_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}
