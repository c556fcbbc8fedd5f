use super::context::{Continuation, PlaybackEvent, TransportContext, TransportSettings};
use super::state::{StateKind, StateOps};
use super::transcript::CommandLog;
use super::{SeekTarget, SpeedChange};
use crate::command::Command;
use crate::config::Config;
use crate::error::Result;
use crate::media::MediaTools;
use crate::timeline::{Millis, Position, Timeline, TimelineSnapshot};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The transport: current state plus the context it operates on.
///
/// Every operation goes through the current state's [`StateOps`]. A failed
/// operation is logged and leaves the state as it was.
pub struct Session {
    state: StateKind,
    ctx: TransportContext,
}

/// Serializable summary for `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: StateKind,
    pub timecode: Millis,
    pub slice: Option<usize>,
    pub offset: Millis,
    pub total: Millis,
    pub speed: f64,
    pub player_running: bool,
    pub recording: Option<PathBuf>,
    pub markers: usize,
}

#[derive(Debug, Clone, Serialize)]
struct DumpSnapshot {
    status: StatusSnapshot,
    timeline: TimelineSnapshot,
}

impl Session {
    pub fn new(settings: TransportSettings, tools: MediaTools, log: Box<dyn CommandLog>) -> Self {
        Self {
            state: StateKind::Initial,
            ctx: TransportContext::new(settings, tools, log),
        }
    }

    pub fn from_config(config: &Config, tools: MediaTools, log: Box<dyn CommandLog>) -> Self {
        Self::new(TransportSettings::from_config(config), tools, log)
    }

    pub fn state(&self) -> StateKind {
        self.state
    }

    pub fn context(&self) -> &TransportContext {
        &self.ctx
    }

    pub fn timeline(&self) -> &Timeline {
        self.ctx.timeline()
    }

    pub fn position(&self) -> &Position {
        self.ctx.position()
    }

    /// Receiver of player exit notifications, to be fed to [`Session::handle_event`].
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.ctx.events()
    }

    fn dispatch(
        &mut self,
        operation: &'static str,
        op: impl FnOnce(&dyn StateOps, &mut TransportContext) -> Result<StateKind>,
    ) -> Result<()> {
        let from = self.state;
        match op(from.ops(), &mut self.ctx) {
            Ok(to) => {
                if to != from {
                    info!(operation, %from, %to, "transition");
                } else {
                    debug!(operation, state = %from, "handled");
                }
                self.state = to;
                Ok(())
            }
            Err(e) => {
                warn!(operation, state = %from, "{e}");
                Err(e)
            }
        }
    }

    /// Dispatches a transport operation and records it in the transcript.
    fn transport(
        &mut self,
        operation: &'static str,
        op: impl FnOnce(&dyn StateOps, &mut TransportContext) -> Result<StateKind>,
    ) -> Result<()> {
        self.dispatch(operation, op)?;
        self.ctx.log(operation, "");
        Ok(())
    }

    pub fn play(&mut self) -> Result<()> {
        self.transport("play", |s, ctx| s.play(ctx))
    }

    pub fn record(&mut self) -> Result<()> {
        self.transport("record", |s, ctx| s.record(ctx))
    }

    pub fn pause(&mut self) -> Result<()> {
        self.transport("pause", |s, ctx| s.pause(ctx))
    }

    pub fn resume(&mut self) -> Result<()> {
        self.transport("resume", |s, ctx| s.resume(ctx))
    }

    pub fn stop(&mut self) -> Result<()> {
        self.transport("stop", |s, ctx| s.stop(ctx))
    }

    pub fn reset(&mut self) -> Result<()> {
        self.transport("reset", |s, ctx| s.reset(ctx))
    }

    pub fn speed(&mut self, change: SpeedChange) -> Result<()> {
        self.dispatch("speed", |s, ctx| s.speed(ctx, change))?;
        let speed = self.ctx.speed();
        self.ctx.log("speed", &speed.to_string());
        Ok(())
    }

    pub fn seek(&mut self, target: SeekTarget) -> Result<()> {
        self.dispatch("seek", |s, ctx| s.seek(ctx, target))
    }

    pub fn seek_marker(&mut self, count: i32) -> Result<()> {
        self.dispatch("seek_marker", |s, ctx| s.seek_marker(ctx, count))
    }

    pub fn set_marker(&mut self, label: Option<String>) -> Result<()> {
        self.dispatch("set_marker", |s, ctx| s.set_marker(ctx, label))
    }

    pub fn remove_marker(&mut self) -> Result<()> {
        self.dispatch("remove_marker", |s, ctx| s.remove_marker(ctx))
    }

    /// Deletes `range`, or the marker-to-marker region around the cursor.
    pub fn delete(&mut self, range: Option<(Millis, Millis)>) -> Result<()> {
        self.dispatch("delete", |s, ctx| s.delete(ctx, range))
    }

    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.dispatch("load", |s, ctx| s.load(ctx, path))
    }

    pub fn open(&mut self, script: &Path) -> Result<()> {
        self.dispatch("open", |s, ctx| s.open(ctx, script))
    }

    /// Runs a parsed command; `dump`, `status` and `quit` are left to the caller.
    pub fn execute(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::Play => self.play(),
            Command::Record => self.record(),
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Stop => self.stop(),
            Command::Speed(change) => self.speed(*change),
            Command::Seek(target) => self.seek(*target),
            Command::SeekMarker(count) => self.seek_marker(*count),
            Command::SetMarker(label) => self.set_marker(label.clone()),
            Command::RemoveMarker => self.remove_marker(),
            Command::Delete(range) => self.delete(*range),
            Command::Reset => self.reset(),
            Command::Load(path) => self.load(path),
            Command::Open(path) => self.open(path),
            Command::Dump | Command::Status | Command::Quit => Ok(()),
        }
    }

    /// Applies a player exit notification.
    pub fn handle_event(&mut self, event: PlaybackEvent) {
        let PlaybackEvent::SegmentFinished { generation } = event;
        if !matches!(self.state, StateKind::Playing | StateKind::PlayingPaused) {
            debug!(generation, state = %self.state, "ignoring player exit");
            return;
        }
        match self.ctx.segment_finished(generation) {
            Continuation::Ignored => debug!(generation, "stale player exit"),
            Continuation::Continued | Continuation::Parked => {}
            Continuation::Ended => {
                info!(from = %self.state, to = %StateKind::Stopped, "transition");
                self.state = StateKind::Stopped;
            }
        }
    }

    /// Waits up to `timeout` for player events and handles them.
    ///
    /// Returns how many events were handled.
    pub fn process_events(&mut self, timeout: Duration) -> usize {
        let events = self.events();
        let deadline = Instant::now() + timeout;
        let mut handled = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(remaining) {
                Ok(event) => {
                    self.handle_event(event);
                    handled += 1;
                    if !events.is_empty() {
                        continue;
                    }
                    return handled;
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    return handled;
                }
            }
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        let position = self.ctx.position();
        let timeline = self.ctx.timeline();
        StatusSnapshot {
            state: self.state,
            timecode: position.timecode(),
            slice: position.slice().map(|id| id.index()),
            offset: position.offset(),
            total: timeline.total_duration(),
            speed: self.ctx.speed(),
            player_running: self.ctx.is_player_running(),
            recording: self.ctx.recording_path().map(Path::to_path_buf),
            markers: timeline.marker_timecodes().len(),
        }
    }

    /// Status plus the full slice chain.
    pub fn dump(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(DumpSnapshot {
            status: self.status(),
            timeline: self.ctx.timeline().snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DictapiError;
    use crate::media::mock::{MockEncoder, MockPlayer, MockProber, MockRecorder};
    use crate::transport::MemoryCommandLog;
    use std::sync::Arc;

    struct Harness {
        session: Session,
        player: MockPlayer,
        log: MemoryCommandLog,
    }

    fn harness() -> Harness {
        let player = MockPlayer::new();
        let log = MemoryCommandLog::new();
        let tools = MediaTools {
            recorder: Arc::new(MockRecorder::new()),
            player: Arc::new(player.clone()),
            prober: Arc::new(MockProber::new(4_000)),
            encoder: Arc::new(MockEncoder::new()),
        };
        let session = Session::new(TransportSettings::default(), tools, Box::new(log.clone()));
        Harness {
            session,
            player,
            log,
        }
    }

    #[test]
    fn test_initial_rejects_transport_operations() {
        let mut h = harness();

        for result in [
            h.session.play(),
            h.session.pause(),
            h.session.resume(),
            h.session.stop(),
            h.session.seek(SeekTarget::Absolute(0)),
            h.session.set_marker(None),
        ] {
            assert!(result.unwrap_err().is_invalid_operation());
        }
        assert_eq!(h.session.state(), StateKind::Initial);
        assert!(h.log.lines().is_empty());
    }

    #[test]
    fn test_load_then_play_pause_stop() {
        let mut h = harness();
        h.session.load(Path::new("a.mp3")).unwrap();
        assert_eq!(h.session.state(), StateKind::Stopped);

        h.session.play().unwrap();
        assert_eq!(h.session.state(), StateKind::Playing);
        let launch = h.player.last_launch().unwrap();
        assert_eq!((launch.start, launch.length), (0, 4_000));

        h.player.set_time_position(1_500);
        h.session.pause().unwrap();
        assert_eq!(h.session.state(), StateKind::PlayingPaused);
        assert_eq!(h.session.position().timecode(), 1_500);

        h.session.stop().unwrap();
        assert_eq!(h.session.state(), StateKind::Stopped);
        assert_eq!(h.session.position().timecode(), 1_500);
        assert!(!h.player.is_running());
        assert_eq!(
            h.log.lines(),
            vec!["load a.mp3", "play", "pause", "stop"]
        );
    }

    #[test]
    fn test_invalid_operation_leaves_state() {
        let mut h = harness();
        h.session.load(Path::new("a.mp3")).unwrap();

        let err = h.session.resume().unwrap_err();

        assert!(matches!(
            err,
            DictapiError::InvalidOperation {
                operation: "resume",
                state: "Stopped"
            }
        ));
        assert_eq!(h.session.state(), StateKind::Stopped);
    }

    #[test]
    fn test_speed_is_clamped_and_logged() {
        let mut h = harness();
        h.session.load(Path::new("a.mp3")).unwrap();

        h.session.speed(SpeedChange::Absolute(0.005)).unwrap();
        assert_eq!(h.session.context().speed(), 0.01);

        h.session.speed(SpeedChange::Absolute(-250.0)).unwrap();
        assert_eq!(h.session.context().speed(), -100.0);
        assert_eq!(h.session.state(), StateKind::Stopped);
        assert_eq!(
            h.log.lines(),
            vec!["load a.mp3", "speed 0.01", "speed -100"]
        );
    }

    #[test]
    fn test_play_on_empty_timeline_after_reset() {
        let mut h = harness();
        h.session.load(Path::new("a.mp3")).unwrap();
        h.session.reset().unwrap();
        assert_eq!(h.session.state(), StateKind::Initial);
        assert!(h.session.timeline().is_empty());
    }

    #[test]
    fn test_status_and_dump_serialize() {
        let mut h = harness();
        h.session.load(Path::new("a.mp3")).unwrap();

        let status = serde_json::to_value(h.session.status()).unwrap();
        assert_eq!(status["state"], "Stopped");
        assert_eq!(status["total"], 4_000);

        let dump = h.session.dump().unwrap();
        assert_eq!(dump["timeline"]["slices"][0]["asset"], "a.mp3");
    }
}
