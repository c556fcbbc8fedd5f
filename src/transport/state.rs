//! Transport states.
//!
//! Each state is a unit struct implementing [`StateOps`]. Transport
//! operations default to "invalid in this state"; the editing and navigation
//! operations default to the behaviour shared by every non-initial state.

use super::context::TransportContext;
use super::{SeekTarget, SpeedChange};
use crate::error::{DictapiError, Result};
use crate::timeline::Millis;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StateKind {
    Initial,
    Stopped,
    Playing,
    PlayingPaused,
    Recording,
    RecordingPaused,
}

impl StateKind {
    pub fn name(self) -> &'static str {
        match self {
            StateKind::Initial => "Initial",
            StateKind::Stopped => "Stopped",
            StateKind::Playing => "Playing",
            StateKind::PlayingPaused => "PlayingPaused",
            StateKind::Recording => "Recording",
            StateKind::RecordingPaused => "RecordingPaused",
        }
    }

    pub fn ops(self) -> &'static dyn StateOps {
        match self {
            StateKind::Initial => &Initial,
            StateKind::Stopped => &Stopped,
            StateKind::Playing => &Playing,
            StateKind::PlayingPaused => &PlayingPaused,
            StateKind::Recording => &Recording,
            StateKind::RecordingPaused => &RecordingPaused,
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Keeps a compound operation whose first half already happened in the
/// state that half reached.
fn settle(result: Result<StateKind>, reached: StateKind, operation: &str) -> Result<StateKind> {
    result.or_else(|e| {
        warn!(operation, state = reached.name(), "{e}");
        Ok(reached)
    })
}

pub trait StateOps: Sync {
    fn kind(&self) -> StateKind;

    fn invalid(&self, operation: &'static str) -> Result<StateKind> {
        Err(DictapiError::InvalidOperation {
            operation,
            state: self.kind().name(),
        })
    }

    fn play(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        self.invalid("play")
    }

    fn record(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        self.invalid("record")
    }

    fn pause(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        self.invalid("pause")
    }

    fn resume(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        self.invalid("resume")
    }

    fn stop(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        self.invalid("stop")
    }

    fn load(&self, _ctx: &mut TransportContext, _path: &Path) -> Result<StateKind> {
        self.invalid("load")
    }

    fn open(&self, _ctx: &mut TransportContext, _script: &Path) -> Result<StateKind> {
        self.invalid("open")
    }

    fn speed(&self, ctx: &mut TransportContext, change: SpeedChange) -> Result<StateKind> {
        ctx.change_speed(change)?;
        Ok(self.kind())
    }

    /// Ends whatever runs, then repositions.
    fn seek(&self, ctx: &mut TransportContext, target: SeekTarget) -> Result<StateKind> {
        let next = self.stop(ctx)?;
        let timecode = ctx.resolve_seek(target);
        ctx.seek_to(timecode);
        Ok(next)
    }

    fn seek_marker(&self, ctx: &mut TransportContext, count: i32) -> Result<StateKind> {
        let timecode = ctx.marker_target(count)?;
        let next = self.stop(ctx)?;
        ctx.seek_to(timecode);
        Ok(next)
    }

    fn set_marker(&self, ctx: &mut TransportContext, label: Option<String>) -> Result<StateKind> {
        ctx.set_marker(label)?;
        Ok(self.kind())
    }

    fn remove_marker(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        ctx.remove_marker()?;
        Ok(self.kind())
    }

    fn delete(
        &self,
        ctx: &mut TransportContext,
        range: Option<(Millis, Millis)>,
    ) -> Result<StateKind> {
        let pending = ctx.prepare_delete(range)?;
        let next = self.stop(ctx)?;
        ctx.commit_delete(pending);
        Ok(next)
    }

    fn reset(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        ctx.reset();
        Ok(StateKind::Initial)
    }
}

/// Nothing loaded or recorded yet.
pub struct Initial;

impl StateOps for Initial {
    fn kind(&self) -> StateKind {
        StateKind::Initial
    }

    fn record(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        ctx.run_recorder()?;
        Ok(StateKind::Recording)
    }

    fn load(&self, ctx: &mut TransportContext, path: &Path) -> Result<StateKind> {
        ctx.load(path)?;
        Ok(StateKind::Stopped)
    }

    fn open(&self, ctx: &mut TransportContext, script: &Path) -> Result<StateKind> {
        ctx.replay(script)?;
        if ctx.timeline().is_empty() {
            Ok(StateKind::Initial)
        } else {
            Ok(StateKind::Stopped)
        }
    }

    fn speed(&self, _ctx: &mut TransportContext, _change: SpeedChange) -> Result<StateKind> {
        self.invalid("speed")
    }

    fn seek(&self, _ctx: &mut TransportContext, _target: SeekTarget) -> Result<StateKind> {
        self.invalid("seek")
    }

    fn seek_marker(&self, _ctx: &mut TransportContext, _count: i32) -> Result<StateKind> {
        self.invalid("seek_marker")
    }

    fn set_marker(&self, _ctx: &mut TransportContext, _label: Option<String>) -> Result<StateKind> {
        self.invalid("set_marker")
    }

    fn remove_marker(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        self.invalid("remove_marker")
    }

    fn delete(
        &self,
        _ctx: &mut TransportContext,
        _range: Option<(Millis, Millis)>,
    ) -> Result<StateKind> {
        self.invalid("delete")
    }
}

pub struct Stopped;

impl StateOps for Stopped {
    fn kind(&self) -> StateKind {
        StateKind::Stopped
    }

    fn play(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        ctx.run_player()?;
        Ok(StateKind::Playing)
    }

    fn record(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        ctx.run_recorder()?;
        Ok(StateKind::Recording)
    }

    fn stop(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        Ok(StateKind::Stopped)
    }

    fn load(&self, ctx: &mut TransportContext, path: &Path) -> Result<StateKind> {
        ctx.load(path)?;
        Ok(StateKind::Stopped)
    }
}

pub struct Playing;

impl Playing {
    /// Runs `edit` with the player paused at a reconciled position, then
    /// carries on playing from wherever the cursor ended up.
    fn paused_edit(
        &self,
        ctx: &mut TransportContext,
        edit: impl FnOnce(&mut TransportContext) -> Result<()>,
    ) -> Result<StateKind> {
        ctx.pause_player()?;
        let edited = edit(ctx);
        if let Err(e) = ctx.resume_player() {
            warn!("could not resume playback: {e}");
            ctx.stop_player(false);
            edited?;
            return Ok(StateKind::Stopped);
        }
        edited?;
        Ok(StateKind::Playing)
    }

    /// Stops, repositions and starts a fresh player.
    fn restart_at(&self, ctx: &mut TransportContext, timecode: Millis) -> Result<StateKind> {
        ctx.stop_player(false);
        ctx.seek_to(timecode);
        settle(
            ctx.run_player().map(|_| StateKind::Playing),
            StateKind::Stopped,
            "play",
        )
    }
}

impl StateOps for Playing {
    fn kind(&self) -> StateKind {
        StateKind::Playing
    }

    fn play(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        Ok(StateKind::Playing)
    }

    fn record(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        let stopped = self.stop(ctx)?;
        settle(stopped.ops().record(ctx), stopped, "record")
    }

    fn pause(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        ctx.pause_player()?;
        Ok(StateKind::PlayingPaused)
    }

    fn stop(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        ctx.stop_player(true);
        Ok(StateKind::Stopped)
    }

    fn speed(&self, ctx: &mut TransportContext, change: SpeedChange) -> Result<StateKind> {
        ctx.change_speed(change)?;
        if ctx.has_player() {
            Ok(StateKind::Playing)
        } else {
            Ok(StateKind::Stopped)
        }
    }

    fn seek(&self, ctx: &mut TransportContext, target: SeekTarget) -> Result<StateKind> {
        ctx.pause_player()?;
        let timecode = ctx.resolve_seek(target);
        self.restart_at(ctx, timecode)
    }

    fn seek_marker(&self, ctx: &mut TransportContext, count: i32) -> Result<StateKind> {
        ctx.pause_player()?;
        match ctx.marker_target(count) {
            Ok(timecode) => self.restart_at(ctx, timecode),
            Err(e) => {
                if let Err(resume) = ctx.resume_player() {
                    warn!("could not resume playback: {resume}");
                    ctx.stop_player(false);
                    return Ok(StateKind::Stopped);
                }
                Err(e)
            }
        }
    }

    fn set_marker(&self, ctx: &mut TransportContext, label: Option<String>) -> Result<StateKind> {
        self.paused_edit(ctx, |ctx| ctx.set_marker(label))
    }

    fn remove_marker(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        self.paused_edit(ctx, |ctx| ctx.remove_marker())
    }

    fn delete(
        &self,
        ctx: &mut TransportContext,
        range: Option<(Millis, Millis)>,
    ) -> Result<StateKind> {
        ctx.pause_player()?;
        match ctx.prepare_delete(range) {
            Ok(pending) => {
                ctx.stop_player(false);
                ctx.commit_delete(pending);
                Ok(StateKind::Stopped)
            }
            Err(e) => {
                if let Err(resume) = ctx.resume_player() {
                    warn!("could not resume playback: {resume}");
                    ctx.stop_player(false);
                    return Ok(StateKind::Stopped);
                }
                Err(e)
            }
        }
    }
}

pub struct PlayingPaused;

impl StateOps for PlayingPaused {
    fn kind(&self) -> StateKind {
        StateKind::PlayingPaused
    }

    fn play(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        self.resume(ctx)
    }

    fn record(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        let stopped = self.stop(ctx)?;
        settle(stopped.ops().record(ctx), stopped, "record")
    }

    fn pause(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        Ok(StateKind::PlayingPaused)
    }

    fn resume(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        ctx.resume_player()?;
        Ok(StateKind::Playing)
    }

    fn stop(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        ctx.stop_player(false);
        Ok(StateKind::Stopped)
    }
}

pub struct Recording;

impl StateOps for Recording {
    fn kind(&self) -> StateKind {
        StateKind::Recording
    }

    fn play(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        let stopped = self.stop(ctx)?;
        settle(stopped.ops().play(ctx), stopped, "play")
    }

    fn record(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        Ok(StateKind::Recording)
    }

    fn pause(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        ctx.stop_recorder();
        Ok(StateKind::RecordingPaused)
    }

    fn stop(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        ctx.stop_recorder();
        Ok(StateKind::Stopped)
    }

    /// The finished segment changes every timecode after the cursor, so the
    /// target is looked up once recording has stopped.
    fn seek_marker(&self, ctx: &mut TransportContext, count: i32) -> Result<StateKind> {
        let stopped = self.stop(ctx)?;
        settle(stopped.ops().seek_marker(ctx, count), stopped, "seek_marker")
    }

    fn set_marker(&self, ctx: &mut TransportContext, label: Option<String>) -> Result<StateKind> {
        ctx.queue_marker(label)?;
        Ok(StateKind::Recording)
    }

    fn remove_marker(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        Err(DictapiError::Unsupported {
            feature: "removing markers while recording".to_string(),
        })
    }

    fn delete(
        &self,
        _ctx: &mut TransportContext,
        _range: Option<(Millis, Millis)>,
    ) -> Result<StateKind> {
        Err(DictapiError::Unsupported {
            feature: "deleting while recording".to_string(),
        })
    }
}

pub struct RecordingPaused;

impl StateOps for RecordingPaused {
    fn kind(&self) -> StateKind {
        StateKind::RecordingPaused
    }

    fn play(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        Stopped.play(ctx)
    }

    fn record(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        ctx.run_recorder()?;
        Ok(StateKind::Recording)
    }

    fn pause(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        Ok(StateKind::RecordingPaused)
    }

    fn resume(&self, ctx: &mut TransportContext) -> Result<StateKind> {
        self.record(ctx)
    }

    fn stop(&self, _ctx: &mut TransportContext) -> Result<StateKind> {
        Ok(StateKind::Stopped)
    }

    fn delete(
        &self,
        _ctx: &mut TransportContext,
        _range: Option<(Millis, Millis)>,
    ) -> Result<StateKind> {
        Err(DictapiError::Unsupported {
            feature: "deleting during a paused recording session".to_string(),
        })
    }
}
