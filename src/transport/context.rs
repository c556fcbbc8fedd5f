//! Shared transport context and the low-level operations the states compose.
//!
//! Only the session owning the context mutates it. Player exits are reported
//! back through a channel as [`PlaybackEvent`]s and acted upon by the owner.

use super::transcript::CommandLog;
use super::{SeekTarget, SpeedChange};
use crate::command::{self, Command};
use crate::config::Config;
use crate::defaults;
use crate::error::{DictapiError, Result};
use crate::media::probe::reverse_path;
use crate::media::{ExitWaiter, MediaTools, PlaybackRequest, PlayerClient, RecordingProcess};
use crate::timeline::{Millis, Position, Slice, SliceId, Timeline};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Notification from a player watcher thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The player launched as `generation` exited on its own.
    SegmentFinished { generation: u64 },
}

/// Settings the transport takes from the configuration.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub audio_dir: PathBuf,
    pub file_format: String,
    pub latch_tolerance: Millis,
    pub player_reply_timeout: Duration,
    pub finalize_poll_interval: Duration,
    pub finalize_poll_limit: Option<u32>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl TransportSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            audio_dir: config.audio.dir.clone(),
            file_format: config.audio.format.clone(),
            latch_tolerance: config.timeline.latch_tolerance_ms,
            player_reply_timeout: config.tools.player_reply_timeout(),
            finalize_poll_interval: config.tools.finalize_poll_interval(),
            finalize_poll_limit: config.tools.finalize_poll_limit,
        }
    }
}

/// Cancellation flag shared between a player and its watcher thread.
#[derive(Debug, Clone)]
struct PlaybackToken(Arc<AtomicBool>);

impl PlaybackToken {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    fn is_live(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Where a launched player sits in the timeline; used to map media time back.
#[derive(Debug, Clone, Copy)]
struct Segment {
    slice: SliceId,
    asset_offset: Millis,
    /// Length of the whole asset, needed to mirror reverse media time
    asset_length: Millis,
    reverse: bool,
}

struct ActivePlayer {
    client: PlayerClient,
    token: PlaybackToken,
    generation: u64,
    segment: Segment,
    paused: bool,
}

impl Drop for ActivePlayer {
    fn drop(&mut self) {
        self.token.cancel();
        if !self.client.is_exited()
            && let Err(e) = self.client.quit()
        {
            debug!("player did not quit cleanly: {e}");
        }
    }
}

struct ActiveRecorder {
    process: Box<dyn RecordingProcess>,
    slice: SliceId,
    started: Instant,
    pending_markers: Vec<(Millis, Option<String>)>,
}

#[derive(Default)]
enum ActiveProcess {
    #[default]
    None,
    Player(ActivePlayer),
    Recorder(ActiveRecorder),
}

/// What happened after a player segment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Continuation {
    /// Stale event from a cancelled or replaced player
    Ignored,
    /// Next segment is playing
    Continued,
    /// Position advanced while paused; resume will start the next segment
    Parked,
    /// Reached an edge of the timeline
    Ended,
}

struct PlaybackPlan {
    position: Position,
    request: PlaybackRequest,
    segment: Segment,
}

/// Validated result of a deletion, applied only once the caller commits.
pub(super) struct PendingDelete {
    timeline: Timeline,
    from: Millis,
    to: Millis,
}

pub struct TransportContext {
    timeline: Timeline,
    position: Position,
    speed: f64,
    process: ActiveProcess,
    tools: MediaTools,
    settings: TransportSettings,
    log: Box<dyn CommandLog>,
    logged_timecode: Option<Millis>,
    generation: u64,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
}

impl TransportContext {
    pub fn new(settings: TransportSettings, tools: MediaTools, log: Box<dyn CommandLog>) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            timeline: Timeline::new(settings.latch_tolerance),
            position: Position::new(),
            speed: defaults::DEFAULT_SPEED,
            process: ActiveProcess::None,
            tools,
            settings,
            log,
            logged_timecode: Some(0),
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn is_player_running(&self) -> bool {
        matches!(&self.process, ActiveProcess::Player(p) if !p.client.is_exited())
    }

    pub fn has_player(&self) -> bool {
        matches!(self.process, ActiveProcess::Player(_))
    }

    pub fn recording_path(&self) -> Option<&Path> {
        match &self.process {
            ActiveProcess::Recorder(r) => Some(r.process.path()),
            _ => None,
        }
    }

    pub(super) fn events(&self) -> Receiver<PlaybackEvent> {
        self.events_rx.clone()
    }

    pub(super) fn log(&mut self, command: &str, args: &str) {
        self.log.record(command, args);
    }

    /// Writes a `seek` line if the transcript's idea of the cursor is stale.
    fn sync_transcript_position(&mut self) {
        let timecode = self.position.timecode();
        if self.logged_timecode != Some(timecode) {
            self.log.record("seek", &timecode.to_string());
            self.logged_timecode = Some(timecode);
        }
    }

    pub(super) fn resolve_seek(&self, target: SeekTarget) -> Millis {
        target.resolve(self.position.timecode(), self.timeline.total_duration())
    }

    pub(super) fn seek_to(&mut self, timecode: Millis) {
        self.position.seek(&self.timeline, timecode);
        debug!(timecode = self.position.timecode(), "seek");
        self.sync_transcript_position();
    }

    /// Timecode a `seek_marker count` lands on.
    pub(super) fn marker_target(&self, count: i32) -> Result<Millis> {
        let timecode = self.position.timecode();
        let total = self.timeline.total_duration();
        let markers = self.timeline.marker_timecodes();
        let window = self.timeline.marker_window();
        let accurate = markers
            .iter()
            .copied()
            .find(|&m| m.abs_diff(timecode) <= window);
        let pivot = accurate.unwrap_or(timecode);
        let steps = count.unsigned_abs() as usize;

        match count {
            0 => {
                if let Some(marker) = accurate {
                    return Ok(marker);
                }
                let previous = markers.iter().copied().rfind(|&m| m < timecode);
                let next = markers.iter().copied().find(|&m| m > timecode);
                match (previous, next) {
                    (Some(p), Some(n)) if timecode - p <= n - timecode => Ok(p),
                    (_, Some(n)) => Ok(n),
                    (Some(p), None) => Ok(p),
                    (None, None) => Err(DictapiError::NoMarker { offset: timecode }),
                }
            }
            c if c > 0 => Ok(markers
                .iter()
                .copied()
                .filter(|&m| m > pivot)
                .nth(steps - 1)
                .unwrap_or(total)),
            _ => Ok(markers
                .iter()
                .copied()
                .rev()
                .filter(|&m| m < pivot)
                .nth(steps - 1)
                .unwrap_or(0)),
        }
    }

    pub(super) fn set_marker(&mut self, label: Option<String>) -> Result<()> {
        let id = self.position.slice().ok_or(DictapiError::EmptyTimeline)?;
        let (slice, offset) = self
            .timeline
            .set_marker(id, self.position.offset(), label.clone())?;
        debug!(%slice, offset, ?label, "marker set");
        self.sync_transcript_position();
        self.log("set_marker", label.as_deref().unwrap_or(""));
        Ok(())
    }

    pub(super) fn remove_marker(&mut self) -> Result<()> {
        let id = self.position.slice().ok_or(DictapiError::EmptyTimeline)?;
        let marker = self.timeline.remove_marker(id, self.position.offset())?;
        debug!(offset = marker.offset, "marker removed");
        self.sync_transcript_position();
        self.log("rm_marker", "");
        Ok(())
    }

    /// Queues a marker for the segment being recorded.
    pub(super) fn queue_marker(&mut self, label: Option<String>) -> Result<()> {
        let ActiveProcess::Recorder(recorder) = &mut self.process else {
            return Err(DictapiError::Other("no recording in progress".to_string()));
        };
        let elapsed = millis_since(recorder.started);
        debug!(elapsed, ?label, "marker queued");
        recorder.pending_markers.push((elapsed, label));
        Ok(())
    }

    /// Validates a deletion of `range`, or of the marker-to-marker region
    /// around the cursor, against a scratch copy of the timeline.
    pub(super) fn prepare_delete(&self, range: Option<(Millis, Millis)>) -> Result<PendingDelete> {
        if self.timeline.is_empty() {
            return Err(DictapiError::EmptyTimeline);
        }
        let (from, to) = match range {
            Some(range) => range,
            None => self.marker_region(),
        };
        let mut timeline = self.timeline.clone();
        timeline.delete_range(from, to)?;
        Ok(PendingDelete { timeline, from, to })
    }

    pub(super) fn commit_delete(&mut self, pending: PendingDelete) {
        let PendingDelete { timeline, from, to } = pending;
        self.timeline = timeline;
        self.position.seek(&self.timeline, from);
        info!(from, to, "deleted region");
        self.log("delete", &format!("{from} {to}"));
        self.logged_timecode = Some(self.position.timecode());
    }

    pub(super) fn delete(&mut self, range: Option<(Millis, Millis)>) -> Result<()> {
        let pending = self.prepare_delete(range)?;
        self.commit_delete(pending);
        Ok(())
    }

    fn marker_region(&self) -> (Millis, Millis) {
        let timecode = self.position.timecode();
        let window = self.timeline.marker_window();
        let markers = self.timeline.marker_timecodes();
        let pivot = markers
            .iter()
            .copied()
            .find(|&m| m.abs_diff(timecode) <= window)
            .unwrap_or(timecode);
        let from = markers.iter().copied().rfind(|&m| m <= pivot).unwrap_or(0);
        let to = markers
            .iter()
            .copied()
            .find(|&m| m > pivot)
            .unwrap_or_else(|| self.timeline.total_duration());
        (from, to)
    }

    /// Probes an existing asset and splices it in at the cursor.
    pub(super) fn load(&mut self, path: &Path) -> Result<()> {
        let duration = self.tools.prober.duration(path)?;
        if duration == 0 {
            return Err(DictapiError::Probe {
                path: path.display().to_string(),
                message: "asset is empty".to_string(),
            });
        }
        self.timeline.register_asset(path, duration);
        self.ensure_reverse(path);

        self.sync_transcript_position();
        let id = self
            .position
            .splice(&mut self.timeline, Slice::new(path, 0, duration))?;
        info!(slice = %id, path = %path.display(), duration, "loaded asset");
        self.log("load", &path.display().to_string());
        self.logged_timecode = Some(self.position.timecode());
        Ok(())
    }

    fn ensure_reverse(&mut self, asset: &Path) {
        let reverse = reverse_path(asset);
        if reverse.exists() {
            self.timeline.set_reverse(asset, reverse);
            return;
        }
        match self.tools.encoder.reverse(asset, &reverse) {
            Ok(()) => self.timeline.set_reverse(asset, reverse),
            Err(e) => warn!(
                asset = %asset.display(),
                "reverse encoding failed, reverse playback unavailable: {e}"
            ),
        }
    }

    /// Replays the replayable lines of a transcript.
    ///
    /// A failing `load` aborts the replay and clears the timeline; other
    /// failing lines are logged and skipped.
    pub(super) fn replay(&mut self, script: &Path) -> Result<()> {
        let text = std::fs::read_to_string(script)?;
        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let command = match command::parse_line(line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    warn!(line = line_no, "{e}");
                    continue;
                }
            };
            let result = match command {
                Command::Load(path) => {
                    if let Err(e) = self.load(&path) {
                        warn!(line = line_no, "replay aborted: {e}");
                        self.reset();
                        return Err(e);
                    }
                    Ok(())
                }
                Command::Seek(target) => {
                    let timecode = self.resolve_seek(target);
                    self.seek_to(timecode);
                    Ok(())
                }
                Command::SetMarker(label) => self.set_marker(label),
                Command::RemoveMarker => self.remove_marker(),
                Command::Delete(range) => self.delete(range),
                other => {
                    debug!(line = line_no, ?other, "not replayed");
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!(line = line_no, "{e}");
            }
        }
        info!(
            script = %script.display(),
            total = self.timeline.total_duration(),
            "replayed transcript"
        );
        Ok(())
    }

    pub(super) fn change_speed(&mut self, change: SpeedChange) -> Result<()> {
        let speed = change.apply(self.speed);
        let flipped = (speed < 0.0) != (self.speed < 0.0);

        let paused = match &mut self.process {
            ActiveProcess::Player(player) if !flipped => {
                player.client.set_speed(speed.abs(), player.paused)?;
                None
            }
            ActiveProcess::Player(player) => Some(player.paused),
            _ => None,
        };

        match paused {
            Some(true) => {
                // A paused player cannot change direction; resume starts anew
                self.stop_player(false);
                self.speed = speed;
            }
            Some(false) => {
                self.pause_player()?;
                let previous = std::mem::replace(&mut self.speed, speed);
                if let Err(e) = self.plan_playback() {
                    self.speed = previous;
                    self.resume_player()?;
                    return Err(e);
                }
                self.stop_player(false);
                if let Err(e) = self.run_player() {
                    warn!("could not restart player after direction change: {e}");
                }
            }
            None => self.speed = speed,
        }
        debug!(speed = self.speed, "speed changed");
        Ok(())
    }

    fn plan_playback(&self) -> Result<PlaybackPlan> {
        if self.timeline.is_empty() {
            return Err(DictapiError::EmptyTimeline);
        }
        let mut position = self.position;
        if !position
            .slice()
            .is_some_and(|id| self.timeline.contains(id))
        {
            position.resync(&self.timeline);
        }
        let reverse = self.speed < 0.0;
        let edge = DictapiError::TimelineEdge {
            timecode: position.timecode(),
        };
        let Some(id) = position.slice() else {
            return Err(DictapiError::EmptyTimeline);
        };

        if !reverse && position.offset() >= self.timeline.slice(id).len() {
            if !position.go_next_slice(&self.timeline) {
                return Err(edge);
            }
        } else if reverse && position.offset() == 0 {
            if !position.go_prev_slice(&self.timeline) {
                return Err(edge);
            }
            position.go_slice_end(&self.timeline);
        }

        let Some(id) = position.slice() else {
            return Err(DictapiError::EmptyTimeline);
        };
        let slice = self.timeline.slice(id);
        let duration = slice.duration().ok_or(DictapiError::OpenSlice)?;
        let offset = position.offset();
        let asset_length = self
            .timeline
            .asset_info(slice.asset())
            .and_then(|info| info.length)
            .unwrap_or(slice.asset_offset() + duration);

        let request = if reverse {
            let reverse_asset = self
                .timeline
                .asset_info(slice.asset())
                .and_then(|info| info.reverse.clone())
                .ok_or_else(|| DictapiError::ReverseUnavailable {
                    asset: slice.asset().display().to_string(),
                })?;
            PlaybackRequest {
                asset: reverse_asset,
                start: asset_length.saturating_sub(slice.asset_offset() + offset),
                length: offset,
                speed: self.speed.abs(),
            }
        } else {
            PlaybackRequest {
                asset: slice.asset().to_path_buf(),
                start: slice.asset_offset() + offset,
                length: duration - offset,
                speed: self.speed.abs(),
            }
        };

        Ok(PlaybackPlan {
            position,
            request,
            segment: Segment {
                slice: id,
                asset_offset: slice.asset_offset(),
                asset_length,
                reverse,
            },
        })
    }

    /// Launches a player for the segment under the cursor.
    pub(super) fn run_player(&mut self) -> Result<()> {
        let plan = self.plan_playback()?;
        let session = self.tools.player.launch(&plan.request)?;
        let mut client = PlayerClient::new(session.control, self.settings.player_reply_timeout);

        let generation = self.generation + 1;
        let token = PlaybackToken::new();
        if let Err(e) = spawn_exit_watcher(
            session.exit,
            token.clone(),
            generation,
            self.events_tx.clone(),
        ) {
            if let Err(quit) = client.quit() {
                debug!("player did not quit cleanly: {quit}");
            }
            return Err(e);
        }

        self.generation = generation;
        self.position = plan.position;
        debug!(generation, request = ?plan.request, "player running");
        self.process = ActiveProcess::Player(ActivePlayer {
            client,
            token,
            generation,
            segment: plan.segment,
            paused: false,
        });
        Ok(())
    }

    /// Maps the player's media time onto the cursor.
    fn reconcile(&mut self, segment: Segment, media_ms: Millis) {
        if self.position.slice() != Some(segment.slice) {
            return;
        }
        let offset = if segment.reverse {
            segment
                .asset_length
                .saturating_sub(media_ms)
                .saturating_sub(segment.asset_offset)
        } else {
            media_ms.saturating_sub(segment.asset_offset)
        };
        let latched = self.timeline.latch(segment.slice, offset);
        self.position.go_slice_offset(&self.timeline, latched);
        debug!(
            media_ms,
            offset = latched,
            timecode = self.position.timecode(),
            "position reconciled"
        );
    }

    /// Pauses the player and reconciles the cursor with its media time.
    pub(super) fn pause_player(&mut self) -> Result<()> {
        let ActiveProcess::Player(player) = &mut self.process else {
            return Err(DictapiError::ProcessGone {
                message: "no player running".to_string(),
            });
        };
        if player.paused {
            return Ok(());
        }
        let segment = player.segment;
        let media_ms = match player.client.time_position() {
            Ok(ms) => Some(ms),
            Err(e) if e.is_process_gone() || player.client.is_exited() => {
                debug!("player ended before pause: {e}");
                None
            }
            Err(e) => return Err(e),
        };
        player.paused = true;
        if let Some(ms) = media_ms {
            self.reconcile(segment, ms);
        }
        Ok(())
    }

    /// Continues a paused player, or starts a new one at the cursor.
    pub(super) fn resume_player(&mut self) -> Result<()> {
        if let ActiveProcess::Player(player) = &mut self.process
            && player.paused
            && !player.client.is_exited()
        {
            match player.client.toggle_pause() {
                Ok(()) => {
                    player.paused = false;
                    return Ok(());
                }
                Err(e) if e.is_process_gone() => debug!("paused player is gone: {e}"),
                Err(e) => return Err(e),
            }
        }
        self.process = ActiveProcess::None;
        self.run_player()
    }

    /// Terminates the player; with `reconcile` the cursor first moves to
    /// where playback was. A player that is already gone leaves the cursor
    /// where it is.
    pub(super) fn stop_player(&mut self, reconcile: bool) {
        let mut player = match std::mem::take(&mut self.process) {
            ActiveProcess::Player(player) => player,
            other => {
                self.process = other;
                return;
            }
        };
        player.token.cancel();
        if reconcile && !player.paused {
            match player.client.time_position() {
                Ok(ms) => self.reconcile(player.segment, ms),
                Err(e) => warn!("player gone while stopping, position not updated: {e}"),
            }
        }
        if let Err(e) = player.client.quit() {
            warn!("failed to quit player: {e}");
        }
    }

    /// Handles the natural end of player `generation`.
    pub(super) fn segment_finished(&mut self, generation: u64) -> Continuation {
        let (reverse, paused) = match &self.process {
            ActiveProcess::Player(p) if p.generation == generation && p.token.is_live() => {
                (p.segment.reverse, p.paused)
            }
            _ => return Continuation::Ignored,
        };
        self.process = ActiveProcess::None;

        let moved = if reverse {
            self.position.go_slice_begin();
            let moved = self.position.go_prev_slice(&self.timeline);
            if moved {
                self.position.go_slice_end(&self.timeline);
            }
            moved
        } else {
            self.position.go_slice_end(&self.timeline);
            self.position.go_next_slice(&self.timeline)
        };

        if !moved {
            info!(timecode = self.position.timecode(), "playback reached the edge of the timeline");
            return Continuation::Ended;
        }
        if paused {
            return Continuation::Parked;
        }
        match self.run_player() {
            Ok(()) => Continuation::Continued,
            Err(e) => {
                warn!("could not continue playback: {e}");
                Continuation::Ended
            }
        }
    }

    fn next_recording_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S_%3f_%z");
        self.settings
            .audio_dir
            .join(format!("{stamp}.{}", self.settings.file_format))
    }

    /// Starts a recorder and splices its open slice in at the cursor.
    pub(super) fn run_recorder(&mut self) -> Result<()> {
        let path = self.next_recording_path();
        let process = self.tools.recorder.start(&path)?;
        let slice = match self
            .position
            .splice(&mut self.timeline, Slice::open(&path))
        {
            Ok(slice) => slice,
            Err(e) => {
                if let Err(finish) = process.finish() {
                    warn!("failed to stop recorder: {finish}");
                }
                return Err(e);
            }
        };
        info!(slice = %slice, path = %path.display(), "recording");
        self.process = ActiveProcess::Recorder(ActiveRecorder {
            process,
            slice,
            started: Instant::now(),
            pending_markers: Vec::new(),
        });
        Ok(())
    }

    fn wait_for_file(&self, path: &Path) -> bool {
        let mut attempts = 0u32;
        loop {
            if path.exists() {
                return true;
            }
            if self
                .settings
                .finalize_poll_limit
                .is_some_and(|limit| attempts >= limit)
            {
                return false;
            }
            attempts += 1;
            thread::sleep(self.settings.finalize_poll_interval);
        }
    }

    fn discard_slice(&mut self, slice: SliceId) {
        self.timeline.remove(slice);
        self.position.resync(&self.timeline);
    }

    /// Ends the recording segment and turns its open slice into a closed one.
    ///
    /// Failures are logged; the slice is dropped when no usable file
    /// appeared.
    pub(super) fn stop_recorder(&mut self) {
        let recorder = match std::mem::take(&mut self.process) {
            ActiveProcess::Recorder(recorder) => recorder,
            other => {
                self.process = other;
                return;
            }
        };
        let ActiveRecorder {
            process,
            slice,
            started,
            pending_markers,
        } = recorder;
        let path = process.path().to_path_buf();
        let measured = millis_since(started);

        if let Err(e) = process.finish() {
            warn!(path = %path.display(), "recorder did not finish cleanly: {e}");
        }
        if !self.wait_for_file(&path) {
            warn!(path = %path.display(), "recording file never appeared, discarding segment");
            self.discard_slice(slice);
            return;
        }

        let duration = match self.tools.prober.duration(&path) {
            Ok(duration) => duration,
            Err(e) => {
                warn!("{e}; using measured length of {measured}ms");
                measured
            }
        };
        if duration == 0 {
            warn!(path = %path.display(), "recording is empty, discarding segment");
            self.discard_slice(slice);
            return;
        }

        self.timeline.register_asset(&path, duration);
        self.ensure_reverse(&path);
        if let Err(e) = self.timeline.finalize(slice, duration) {
            warn!("{e}");
            return;
        }
        let begin = self.timeline.slice_begin(slice);
        info!(slice = %slice, duration, "recording finalized");

        self.position.seek(&self.timeline, begin);
        self.sync_transcript_position();
        self.log("load", &path.display().to_string());
        for (elapsed, label) in pending_markers {
            self.position
                .seek(&self.timeline, begin + elapsed.min(duration));
            if let Err(e) = self.set_marker(label) {
                warn!("could not place queued marker: {e}");
            }
        }

        self.position.seek(&self.timeline, begin);
        self.position.go_slice_end(&self.timeline);
        self.sync_transcript_position();
    }

    /// Stops any external process without touching the timeline.
    pub(super) fn shutdown(&mut self) {
        if self.has_player() {
            self.stop_player(false);
        } else if let ActiveProcess::Recorder(recorder) = std::mem::take(&mut self.process)
            && let Err(e) = recorder.process.finish()
        {
            warn!("failed to stop recorder: {e}");
        }
    }

    /// Back to an empty timeline at normal speed.
    pub(super) fn reset(&mut self) {
        self.shutdown();
        self.timeline = Timeline::new(self.settings.latch_tolerance);
        self.position = Position::new();
        self.speed = defaults::DEFAULT_SPEED;
        self.logged_timecode = Some(0);
    }
}

impl Drop for TransportContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn millis_since(start: Instant) -> Millis {
    Millis::try_from(start.elapsed().as_millis()).unwrap_or(Millis::MAX)
}

fn spawn_exit_watcher(
    exit: Box<dyn ExitWaiter>,
    token: PlaybackToken,
    generation: u64,
    events: Sender<PlaybackEvent>,
) -> Result<()> {
    thread::Builder::new()
        .name(format!("player-exit-{generation}"))
        .spawn(move || {
            exit.wait();
            if token.is_live()
                && events
                    .send(PlaybackEvent::SegmentFinished { generation })
                    .is_err()
            {
                debug!(generation, "session gone before player exit");
            }
        })?;
    Ok(())
}
