//! Player adapter speaking the mplayer slave protocol.
//!
//! A launch yields two halves: a [`PlayerControl`] used by the transport to
//! send commands and read replies, and an [`ExitWaiter`] that a watcher
//! thread blocks on until the process ends.

use super::exec::spawn_error;
use crate::error::{DictapiError, Result};
use crate::timeline::Millis;
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded, unbounded};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

const TIME_POSITION_REPLY: &str = "ANS_TIME_POSITION=";

/// One bounded stretch of an asset to play.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub asset: PathBuf,
    /// Start within the asset
    pub start: Millis,
    /// How much to play from `start`
    pub length: Millis,
    /// Rate magnitude; direction is chosen through the asset
    pub speed: f64,
}

/// Command side of a running player.
pub trait PlayerControl: Send {
    /// Write one slave-mode command line.
    fn send_command(&mut self, command: &str) -> Result<()>;

    /// Next output line, `Ok(None)` when nothing arrived within `timeout`.
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>>;

    /// Discard output already waiting, without blocking.
    fn drain(&mut self);

    fn is_exited(&self) -> bool;
}

/// Blocks until the player process has ended.
pub trait ExitWaiter: Send {
    fn wait(self: Box<Self>);
}

pub struct PlayerSession {
    pub control: Box<dyn PlayerControl>,
    pub exit: Box<dyn ExitWaiter>,
}

pub trait PlayerLauncher: Send + Sync {
    fn launch(&self, request: &PlaybackRequest) -> Result<PlayerSession>;
}

/// Formats milliseconds as the seconds value mplayer expects.
pub fn format_seconds(ms: Millis) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// Parses an `ANS_TIME_POSITION=<seconds>` reply into milliseconds.
pub fn parse_time_position(line: &str) -> Option<Millis> {
    let value = line.trim().strip_prefix(TIME_POSITION_REPLY)?;
    let seconds: f64 = value.trim().parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    Some((seconds.max(0.0) * 1000.0).round() as Millis)
}

/// Typed helpers over a [`PlayerControl`].
pub struct PlayerClient {
    control: Box<dyn PlayerControl>,
    reply_timeout: Duration,
}

impl PlayerClient {
    pub fn new(control: Box<dyn PlayerControl>, reply_timeout: Duration) -> Self {
        Self {
            control,
            reply_timeout,
        }
    }

    pub fn is_exited(&self) -> bool {
        self.control.is_exited()
    }

    /// Queries the media time and leaves the player paused.
    pub fn time_position(&mut self) -> Result<Millis> {
        // A reply that missed an earlier deadline must not answer this query.
        self.control.drain();
        self.control.send_command("pausing get_time_pos")?;
        loop {
            let Some(line) = self.control.read_line(self.reply_timeout)? else {
                return Err(DictapiError::ToolFailed {
                    message: format!(
                        "player did not report its position within {:?}",
                        self.reply_timeout
                    ),
                });
            };
            trace!(%line, "player output");
            if line.trim_start().starts_with(TIME_POSITION_REPLY) {
                return parse_time_position(&line)
                    .ok_or(DictapiError::PlayerProtocol { line });
            }
        }
    }

    /// Toggles pause.
    pub fn toggle_pause(&mut self) -> Result<()> {
        self.control.send_command("pause")
    }

    pub fn set_speed(&mut self, speed: f64, paused: bool) -> Result<()> {
        let command = if paused {
            format!("pausing_keep speed_set {speed}")
        } else {
            format!("speed_set {speed}")
        };
        self.control.send_command(&command)
    }

    /// Asks the player to exit; an already gone player is not an error.
    pub fn quit(&mut self) -> Result<()> {
        match self.control.send_command("quit") {
            Err(e) if e.is_process_gone() => Ok(()),
            other => other,
        }
    }
}

/// Launches `mplayer` in slave mode.
#[derive(Debug, Clone)]
pub struct MplayerLauncher {
    program: String,
    args: Vec<String>,
}

impl MplayerLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn command_args(&self, request: &PlaybackRequest) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend([
            "-ss".to_string(),
            format_seconds(request.start),
            "-endpos".to_string(),
            format_seconds(request.length),
            "-speed".to_string(),
            request.speed.abs().to_string(),
            request.asset.to_string_lossy().into_owned(),
        ]);
        args
    }
}

impl PlayerLauncher for MplayerLauncher {
    fn launch(&self, request: &PlaybackRequest) -> Result<PlayerSession> {
        let mut child = Command::new(&self.program)
            .args(self.command_args(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(&self.program, e))?;
        debug!(pid = child.id(), ?request, "player started");

        let stdin = child.stdin.take().ok_or_else(|| DictapiError::ToolFailed {
            message: "player stdin not captured".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| DictapiError::ToolFailed {
            message: "player stdout not captured".to_string(),
        })?;

        let (line_tx, line_rx) = unbounded();
        thread::Builder::new()
            .name("player-stdout".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
            })?;

        let exited = Arc::new(AtomicBool::new(false));
        Ok(PlayerSession {
            control: Box::new(MplayerControl {
                stdin,
                lines: line_rx,
                exited: exited.clone(),
            }),
            exit: Box::new(MplayerExit { child, exited }),
        })
    }
}

struct MplayerControl {
    stdin: ChildStdin,
    lines: Receiver<String>,
    exited: Arc<AtomicBool>,
}

impl PlayerControl for MplayerControl {
    fn send_command(&mut self, command: &str) -> Result<()> {
        if self.is_exited() {
            return Err(DictapiError::ProcessGone {
                message: format!("player exited before `{command}`"),
            });
        }
        trace!(command, "player command");
        writeln!(self.stdin, "{command}")
            .and_then(|_| self.stdin.flush())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::BrokenPipe => DictapiError::ProcessGone {
                    message: format!("player closed its input: {e}"),
                },
                _ => e.into(),
            })
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => Ok(Some(line)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(DictapiError::ProcessGone {
                message: "player output closed".to_string(),
            }),
        }
    }

    fn drain(&mut self) {
        for line in self.lines.try_iter() {
            trace!(%line, "discarding player output");
        }
    }

    fn is_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

struct MplayerExit {
    child: Child,
    exited: Arc<AtomicBool>,
}

impl ExitWaiter for MplayerExit {
    fn wait(mut self: Box<Self>) {
        let status = self.child.wait();
        self.exited.store(true, Ordering::SeqCst);
        debug!(?status, "player exited");
    }
}

/// Exit waiter for players that have no process behind them.
pub fn channel_exit() -> (crossbeam_channel::Sender<()>, Box<dyn ExitWaiter>) {
    let (tx, rx) = bounded(1);
    (tx, Box::new(ChannelExit(rx)))
}

struct ChannelExit(Receiver<()>);

impl ExitWaiter for ChannelExit {
    fn wait(self: Box<Self>) {
        // Either a message or all senders dropped means "exited"
        self.0.recv().ok();
    }
}
