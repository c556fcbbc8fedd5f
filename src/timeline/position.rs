use super::{Millis, Slice, SliceId, Timeline};
use crate::error::Result;
use serde::Serialize;

/// Cursor into the timeline.
///
/// `timecode` is always `slice_begin(slice) + offset`; every move keeps the
/// two in step without re-walking the chain where it can.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    timecode: Millis,
    slice: Option<SliceId>,
    offset: Millis,
}

impl Position {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timecode(&self) -> Millis {
        self.timecode
    }

    pub fn slice(&self) -> Option<SliceId> {
        self.slice
    }

    pub fn offset(&self) -> Millis {
        self.offset
    }

    /// Moves to `target`, clamped to `[0, total]`.
    ///
    /// A target on a slice boundary lands at the start of the later slice,
    /// except at the very end where it stays at the end of the tail.
    pub fn seek(&mut self, timeline: &Timeline, target: Millis) {
        let total = timeline.total_duration();
        let target = target.min(total);
        let mut begin = 0;
        let mut last = None;
        for (id, slice) in timeline.iter() {
            let end = begin + slice.len();
            if target < end {
                *self = Self {
                    timecode: target,
                    slice: Some(id),
                    offset: target - begin,
                };
                return;
            }
            last = Some((id, begin));
            begin = end;
        }

        *self = match last {
            Some((id, begin)) => Self {
                timecode: total,
                slice: Some(id),
                offset: total - begin,
            },
            None => Self::default(),
        };
    }

    /// Moves to `back` milliseconds before the end of the timeline.
    pub fn seek_end(&mut self, timeline: &Timeline, back: Millis) {
        let total = timeline.total_duration();
        self.seek(timeline, total.saturating_sub(back));
    }

    /// Re-derives the cursor from its timecode after the chain was edited.
    pub fn resync(&mut self, timeline: &Timeline) {
        let timecode = self.timecode;
        self.seek(timeline, timecode);
    }

    pub fn go_slice_begin(&mut self) {
        self.timecode -= self.offset;
        self.offset = 0;
    }

    pub fn go_slice_end(&mut self, timeline: &Timeline) {
        if let Some(id) = self.slice {
            let len = timeline.slice(id).len();
            self.timecode = self.timecode - self.offset + len;
            self.offset = len;
        }
    }

    /// Moves to `offset` within the current slice, clamped to its length.
    pub fn go_slice_offset(&mut self, timeline: &Timeline, offset: Millis) {
        if let Some(id) = self.slice {
            let offset = offset.min(timeline.slice(id).len());
            self.timecode = self.timecode - self.offset + offset;
            self.offset = offset;
        }
    }

    /// Moves to the beginning of the successor; false at the tail.
    pub fn go_next_slice(&mut self, timeline: &Timeline) -> bool {
        let Some(id) = self.slice else {
            return false;
        };
        let current = timeline.slice(id);
        let Some(next) = current.successor() else {
            return false;
        };
        self.timecode = self.timecode - self.offset + current.len();
        self.slice = Some(next);
        self.offset = 0;
        true
    }

    /// Moves to the beginning of the predecessor; false at the head.
    pub fn go_prev_slice(&mut self, timeline: &Timeline) -> bool {
        let Some(id) = self.slice else {
            return false;
        };
        let Some(prev) = timeline.slice(id).predecessor() else {
            return false;
        };
        self.timecode = self.timecode - self.offset - timeline.slice(prev).len();
        self.slice = Some(prev);
        self.offset = 0;
        true
    }

    pub fn at_start(&self) -> bool {
        self.timecode == 0
    }

    pub fn at_end(&self, timeline: &Timeline) -> bool {
        self.timecode >= timeline.total_duration()
    }

    /// Inserts `slice` into the chain at the cursor and moves to its start.
    pub fn splice(&mut self, timeline: &mut Timeline, slice: Slice) -> Result<SliceId> {
        if timeline.is_empty() {
            let id = timeline.add(slice);
            timeline.attach_first(id)?;
            *self = Self {
                timecode: 0,
                slice: Some(id),
                offset: 0,
            };
            return Ok(id);
        }

        if !self.slice.is_some_and(|id| timeline.contains(id)) {
            self.resync(timeline);
        }
        let Some(current) = self.slice else {
            return Err(crate::error::DictapiError::EmptyTimeline);
        };

        let id = timeline.add(slice);
        let latched = timeline.insert(current, self.offset, id)?;
        self.timecode = self.timecode - self.offset + latched;
        self.slice = Some(id);
        self.offset = 0;
        Ok(id)
    }
}
