//! Spliced recording timeline.
//!
//! The timeline is a chain of [`Slice`]s kept in an arena and linked by
//! [`SliceId`]s. Geometry operations (insert, split, delete, markers) snap to
//! slice edges within the latch tolerance so no sliver shorter than the
//! tolerance is ever created.
//!
//! Slices removed from the chain stay in the arena, unlinked and never
//! touched again, so stale ids remain safe to look up.

mod position;
mod slice;

pub use position::Position;
pub use slice::{Marker, MarkerMatch, Slice, SliceId};

use crate::defaults;
use crate::error::{DictapiError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Time unit of the model.
pub type Millis = u64;

/// What is known about an underlying asset file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetInfo {
    /// Probed length of the whole file
    pub length: Option<Millis>,
    /// Time-reversed rendition, when encoding it succeeded
    pub reverse: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Timeline {
    slices: Vec<Slice>,
    head: Option<SliceId>,
    tolerance: Millis,
    assets: BTreeMap<PathBuf, AssetInfo>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(defaults::LATCH_TOLERANCE_MS)
    }
}

impl Timeline {
    pub fn new(tolerance: Millis) -> Self {
        Self {
            slices: Vec::new(),
            head: None,
            tolerance,
            assets: BTreeMap::new(),
        }
    }

    pub fn tolerance(&self) -> Millis {
        self.tolerance
    }

    /// Capture window of marker searches: half the latch tolerance, so with
    /// markers kept more than one tolerance apart at most one can match.
    pub fn marker_window(&self) -> Millis {
        self.tolerance / 2
    }

    pub fn within_tolerance(&self, a: Millis, b: Millis) -> bool {
        a.abs_diff(b) <= self.tolerance
    }

    pub fn get(&self, id: SliceId) -> Option<&Slice> {
        self.slices.get(id.0)
    }

    /// Looks up a slice of this arena.
    ///
    /// Ids are only minted by [`Timeline::add`], so an id from another
    /// timeline is a programming error.
    pub fn slice(&self, id: SliceId) -> &Slice {
        &self.slices[id.0]
    }

    fn slice_mut(&mut self, id: SliceId) -> &mut Slice {
        &mut self.slices[id.0]
    }

    pub fn head(&self) -> Option<SliceId> {
        self.head
    }

    pub fn tail(&self) -> Option<SliceId> {
        self.iter().last().map(|(id, _)| id)
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Slices in timeline order.
    pub fn iter(&self) -> Chain<'_> {
        Chain {
            timeline: self,
            next: self.head,
        }
    }

    pub fn contains(&self, id: SliceId) -> bool {
        self.iter().any(|(other, _)| other == id)
    }

    pub fn total_duration(&self) -> Millis {
        self.iter().map(|(_, s)| s.len()).sum()
    }

    /// Timecode at which `id` starts.
    pub fn slice_begin(&self, id: SliceId) -> Millis {
        let mut begin = 0;
        let mut cur = self.slice(id).predecessor;
        while let Some(prev) = cur {
            let slice = self.slice(prev);
            begin += slice.len();
            cur = slice.predecessor;
        }
        begin
    }

    /// Moves a slice into the arena without linking it.
    pub fn add(&mut self, slice: Slice) -> SliceId {
        self.slices.push(slice);
        SliceId(self.slices.len() - 1)
    }

    /// Makes `id` the only slice of an empty timeline.
    pub fn attach_first(&mut self, id: SliceId) -> Result<()> {
        if self.head.is_some() {
            return Err(DictapiError::Other(
                "timeline already has a first slice".to_string(),
            ));
        }
        self.head = Some(id);
        Ok(())
    }

    fn is_detached(&self, id: SliceId) -> bool {
        let slice = self.slice(id);
        slice.predecessor.is_none() && slice.successor.is_none() && self.head != Some(id)
    }

    fn closed_duration(&self, id: SliceId) -> Result<Millis> {
        self.slice(id).duration.ok_or(DictapiError::OpenSlice)
    }

    fn link_before(&mut self, anchor: SliceId, id: SliceId) {
        let pred = self.slice(anchor).predecessor;
        match pred {
            Some(p) => self.slice_mut(p).successor = Some(id),
            None => self.head = Some(id),
        }
        let slice = self.slice_mut(id);
        slice.predecessor = pred;
        slice.successor = Some(anchor);
        self.slice_mut(anchor).predecessor = Some(id);
    }

    fn link_after(&mut self, anchor: SliceId, id: SliceId) {
        let succ = self.slice(anchor).successor;
        if let Some(s) = succ {
            self.slice_mut(s).predecessor = Some(id);
        }
        let slice = self.slice_mut(id);
        slice.predecessor = Some(anchor);
        slice.successor = succ;
        self.slice_mut(anchor).successor = Some(id);
    }

    fn unlink(&mut self, id: SliceId) {
        let (pred, succ) = {
            let slice = self.slice(id);
            (slice.predecessor, slice.successor)
        };
        match pred {
            Some(p) => self.slice_mut(p).successor = succ,
            None => self.head = succ,
        }
        if let Some(s) = succ {
            self.slice_mut(s).predecessor = pred;
        }
        let slice = self.slice_mut(id);
        slice.predecessor = None;
        slice.successor = None;
        debug!(slice = %id, "unlinked slice");
    }

    /// Takes `id` out of the chain whatever its extent, e.g. a recording
    /// that produced no file.
    pub fn remove(&mut self, id: SliceId) {
        if self.contains(id) {
            self.unlink(id);
        }
    }

    /// Links the detached slice `new` into the chain at `offset` within
    /// `target`, returning the offset actually used after latching.
    pub fn insert(&mut self, target: SliceId, offset: Millis, new: SliceId) -> Result<Millis> {
        let duration = self.closed_duration(target)?;
        if offset > duration {
            warn!(offset, duration, "insert offset outside slice");
            return Err(DictapiError::InvalidOffset { offset, duration });
        }
        if !self.is_detached(new) {
            return Err(DictapiError::Other(format!(
                "slice {new} is already part of the timeline"
            )));
        }

        if self.within_tolerance(offset, 0) {
            self.link_before(target, new);
            return Ok(0);
        }
        if self.within_tolerance(offset, duration) {
            self.link_after(target, new);
            return Ok(duration);
        }

        let tail = self.split(target, offset)?;
        self.link_before(tail, new);
        Ok(offset)
    }

    /// Cuts `id` in two at `offset`, returning the id of the new tail.
    pub fn split(&mut self, id: SliceId, offset: Millis) -> Result<SliceId> {
        let duration = self.closed_duration(id)?;
        if offset > duration {
            warn!(offset, duration, "split offset outside slice");
            return Err(DictapiError::InvalidOffset { offset, duration });
        }
        if self.within_tolerance(offset, 0) || self.within_tolerance(offset, duration) {
            warn!(offset, duration, "refusing degenerate split");
            return Err(DictapiError::DegenerateSplit { offset, duration });
        }

        let slice = self.slice_mut(id);
        let keep = slice.markers.partition_point(|m| m.offset < offset);
        let tail_markers = slice
            .markers
            .split_off(keep)
            .into_iter()
            .map(|m| Marker::with_label(m.offset - offset, m.label))
            .collect();
        let mut tail = Slice::new(
            slice.asset.clone(),
            slice.asset_offset + offset,
            duration - offset,
        );
        tail.markers = tail_markers;
        slice.duration = Some(offset);

        let tail_id = self.add(tail);
        self.link_after(id, tail_id);
        debug!(slice = %id, tail = %tail_id, offset, "split slice");
        Ok(tail_id)
    }

    /// Removes the half-open region `[from, to)` of slice `id`.
    pub fn delete(&mut self, id: SliceId, from: Millis, to: Millis) -> Result<()> {
        let duration = self.closed_duration(id)?;
        if from > to || to > duration {
            warn!(from, to, duration, "delete region outside slice");
            return Err(DictapiError::InvalidOffset {
                offset: if from > to { from } else { to },
                duration,
            });
        }

        let at_start = self.within_tolerance(from, 0);
        let at_end = self.within_tolerance(to, duration);
        match (at_start, at_end) {
            (true, true) => self.unlink(id),
            (true, false) => {
                let slice = self.slice_mut(id);
                slice.asset_offset += to;
                slice.duration = Some(duration - to);
                slice.markers.retain(|m| m.offset >= to);
                for marker in &mut slice.markers {
                    marker.offset -= to;
                }
            }
            (false, true) => {
                let slice = self.slice_mut(id);
                slice.duration = Some(from);
                slice.markers.retain(|m| m.offset < from);
            }
            (false, false) => {
                if to - from <= self.tolerance {
                    warn!(from, to, "refusing to cut out a region shorter than the tolerance");
                    return Err(DictapiError::DegenerateSplit {
                        offset: from,
                        duration: to,
                    });
                }
                self.split(id, to)?;
                let middle = self.split(id, from)?;
                self.unlink(middle);
            }
        }
        Ok(())
    }

    /// Removes the absolute span `[from, to)`, which may cover several slices.
    pub fn delete_range(&mut self, from: Millis, to: Millis) -> Result<()> {
        let total = self.total_duration();
        if from >= to || from >= total {
            return Err(DictapiError::InvalidOffset {
                offset: from,
                duration: total,
            });
        }

        let mut pieces = Vec::new();
        let mut begin = 0;
        for (id, slice) in self.iter() {
            if slice.is_open() {
                return Err(DictapiError::OpenSlice);
            }
            let end = begin + slice.len();
            if end > from && begin < to {
                pieces.push((id, from.max(begin) - begin, to.min(end) - begin));
            }
            if end >= to {
                break;
            }
            begin = end;
        }

        for (id, local_from, local_to) in pieces {
            self.delete(id, local_from, local_to)?;
        }
        Ok(())
    }

    pub fn find_marker(&self, id: SliceId, offset: Millis) -> MarkerMatch {
        self.slice(id).find_marker(offset, self.marker_window())
    }

    /// Places a marker near `offset` of slice `id`.
    ///
    /// Returns the slice and offset the marker ended up at. A marker already
    /// latched at that point is reused (and relabelled if a label is given).
    pub fn set_marker(
        &mut self,
        id: SliceId,
        offset: Millis,
        label: Option<String>,
    ) -> Result<(SliceId, Millis)> {
        let duration = self.closed_duration(id)?;
        if offset > duration {
            return Err(DictapiError::InvalidOffset { offset, duration });
        }

        let (target, offset) = if self.within_tolerance(offset, 0) {
            (id, 0)
        } else if self.within_tolerance(offset, duration) {
            match self.slice(id).successor {
                Some(next) => (next, 0),
                None => (id, duration),
            }
        } else {
            (id, offset)
        };
        self.closed_duration(target)?;

        let tolerance = self.tolerance;
        let slice = self.slice_mut(target);
        if let Some(existing) = slice
            .markers
            .iter_mut()
            .find(|m| m.offset.abs_diff(offset) <= tolerance)
        {
            if label.is_some() {
                existing.label = label;
            }
            return Ok((target, existing.offset));
        }
        slice.add_marker(Marker::with_label(offset, label));
        Ok((target, offset))
    }

    /// Removes the marker latched at `offset` of slice `id`.
    pub fn remove_marker(&mut self, id: SliceId, offset: Millis) -> Result<Marker> {
        let duration = self.closed_duration(id)?;

        let mut target = None;
        if let Some(found) = self.find_marker(id, offset).accurate {
            target = Some((id, found));
        } else if self.within_tolerance(offset, duration)
            && let Some(next) = self.slice(id).successor
            && let Some(found) = self.find_marker(next, 0).accurate
        {
            target = Some((next, found));
        }

        let Some((slice_id, marker_offset)) = target else {
            return Err(DictapiError::NoMarker { offset });
        };
        let slice = self.slice_mut(slice_id);
        let idx = slice
            .markers
            .iter()
            .position(|m| m.offset == marker_offset)
            .ok_or(DictapiError::NoMarker { offset })?;
        Ok(slice.markers.remove(idx))
    }

    /// Fixes the duration of a slice that was still being recorded.
    pub fn finalize(&mut self, id: SliceId, duration: Millis) -> Result<()> {
        let slice = self.slice_mut(id);
        if !slice.is_open() {
            return Err(DictapiError::Other(format!("slice {id} is already closed")));
        }
        slice.duration = Some(duration);
        Ok(())
    }

    /// Clamps `offset` into slice `id` and snaps it to an edge within tolerance.
    pub fn latch(&self, id: SliceId, offset: Millis) -> Millis {
        let len = self.slice(id).len();
        let offset = offset.min(len);
        if self.within_tolerance(offset, 0) {
            0
        } else if self.within_tolerance(offset, len) {
            len
        } else {
            offset
        }
    }

    /// Timecodes of all markers in timeline order, without duplicates.
    pub fn marker_timecodes(&self) -> Vec<Millis> {
        let mut timecodes = Vec::new();
        let mut begin = 0;
        for (_, slice) in self.iter() {
            timecodes.extend(slice.markers.iter().map(|m| begin + m.offset));
            begin += slice.len();
        }
        timecodes.dedup();
        timecodes
    }

    pub fn register_asset(&mut self, asset: &Path, length: Millis) {
        self.assets.entry(asset.to_path_buf()).or_default().length = Some(length);
    }

    pub fn set_reverse(&mut self, asset: &Path, reverse: PathBuf) {
        self.assets.entry(asset.to_path_buf()).or_default().reverse = Some(reverse);
    }

    pub fn asset_info(&self, asset: &Path) -> Option<&AssetInfo> {
        self.assets.get(asset)
    }

    /// Verifies link symmetry, acyclicity and marker bounds of the chain.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::new();
        let mut prev = None;
        let mut cur = self.head;
        while let Some(id) = cur {
            if !seen.insert(id) {
                return Err(format!("cycle through slice {id}"));
            }
            let slice = self.slice(id);
            if slice.predecessor != prev {
                return Err(format!(
                    "slice {id} points back to {:?}, expected {:?}",
                    slice.predecessor, prev
                ));
            }
            if slice.markers.windows(2).any(|w| w[0].offset > w[1].offset) {
                return Err(format!("markers of slice {id} are not sorted"));
            }
            if let Some(duration) = slice.duration
                && slice.markers.iter().any(|m| m.offset > duration)
            {
                return Err(format!("marker beyond the end of slice {id}"));
            }
            prev = Some(id);
            cur = slice.successor;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> TimelineSnapshot {
        let mut begin = 0;
        let slices = self
            .iter()
            .map(|(id, slice)| {
                let entry = SliceSnapshot {
                    id: id.index(),
                    begin,
                    asset: slice.asset.clone(),
                    asset_offset: slice.asset_offset,
                    duration: slice.duration,
                    markers: slice.markers.clone(),
                };
                begin += slice.len();
                entry
            })
            .collect();
        TimelineSnapshot {
            total: begin,
            slices,
        }
    }
}

/// Iterator over the chain, head to tail.
pub struct Chain<'a> {
    timeline: &'a Timeline,
    next: Option<SliceId>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = (SliceId, &'a Slice);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let slice = self.timeline.slice(id);
        self.next = slice.successor;
        Some((id, slice))
    }
}

/// Serializable view of the chain for `dump` and debug logging.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineSnapshot {
    pub total: Millis,
    pub slices: Vec<SliceSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SliceSnapshot {
    pub id: usize,
    pub begin: Millis,
    pub asset: PathBuf,
    pub asset_offset: Millis,
    pub duration: Option<Millis>,
    pub markers: Vec<Marker>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Timeline of closed slices with the given durations, all from distinct assets.
    fn chain(durations: &[Millis]) -> (Timeline, Vec<SliceId>) {
        let mut timeline = Timeline::default();
        let mut ids = Vec::new();
        for (i, &duration) in durations.iter().enumerate() {
            let id = timeline.add(Slice::new(format!("{i}.mp3"), 0, duration));
            match ids.last() {
                None => timeline.attach_first(id).unwrap(),
                Some(&last) => {
                    let end = timeline.slice(last).len();
                    timeline.insert(last, end, id).unwrap();
                }
            }
            ids.push(id);
        }
        (timeline, ids)
    }

    fn order(timeline: &Timeline) -> Vec<SliceId> {
        timeline.iter().map(|(id, _)| id).collect()
    }

    fn lengths(timeline: &Timeline) -> Vec<Millis> {
        timeline.iter().map(|(_, s)| s.len()).collect()
    }

    fn marker_offsets(timeline: &Timeline, id: SliceId) -> Vec<Millis> {
        timeline.slice(id).markers().iter().map(|m| m.offset).collect()
    }

    #[test]
    fn test_insert_near_start_links_before_without_split() {
        let (mut timeline, ids) = chain(&[5000]);
        let new = timeline.add(Slice::new("new.mp3", 0, 1000));

        let used = timeline.insert(ids[0], 150, new).unwrap();

        assert_eq!(used, 0);
        assert_eq!(order(&timeline), vec![new, ids[0]]);
        assert_eq!(lengths(&timeline), vec![1000, 5000]);
        assert_eq!(timeline.head(), Some(new));
    }

    #[test]
    fn test_insert_near_end_links_after() {
        let (mut timeline, ids) = chain(&[5000, 2000]);
        let new = timeline.add(Slice::new("new.mp3", 0, 1000));

        let used = timeline.insert(ids[0], 4900, new).unwrap();

        assert_eq!(used, 5000);
        assert_eq!(order(&timeline), vec![ids[0], new, ids[1]]);
        timeline.check_invariants().unwrap();
    }

    #[test]
    fn test_insert_in_middle_splits() {
        let (mut timeline, ids) = chain(&[5000]);
        let new = timeline.add(Slice::new("new.mp3", 0, 1000));

        let used = timeline.insert(ids[0], 2000, new).unwrap();

        assert_eq!(used, 2000);
        assert_eq!(lengths(&timeline), vec![2000, 1000, 3000]);
        let tail = timeline.slice(new).successor().unwrap();
        assert_eq!(timeline.slice(tail).asset_offset(), 2000);
        assert_eq!(timeline.slice(tail).asset(), Path::new("0.mp3"));
        timeline.check_invariants().unwrap();
    }

    #[test]
    fn test_insert_rejects_linked_slice_and_bad_offset() {
        let (mut timeline, ids) = chain(&[5000, 1000]);

        assert!(timeline.insert(ids[0], 2000, ids[1]).is_err());
        let new = timeline.add(Slice::new("new.mp3", 0, 1000));
        let err = timeline.insert(ids[0], 6000, new).unwrap_err();
        assert!(err.is_geometry());
        assert_eq!(lengths(&timeline), vec![5000, 1000]);
    }

    #[test]
    fn test_insert_into_open_slice_fails() {
        let mut timeline = Timeline::default();
        let open = timeline.add(Slice::open("rec.mp3"));
        timeline.attach_first(open).unwrap();
        let new = timeline.add(Slice::new("new.mp3", 0, 1000));

        let err = timeline.insert(open, 0, new).unwrap_err();
        assert!(matches!(err, DictapiError::OpenSlice));
    }

    #[test]
    fn test_split_partitions_and_rebases_markers() {
        let (mut timeline, ids) = chain(&[4000]);
        for offset in [500, 2000, 3500] {
            timeline.set_marker(ids[0], offset, None).unwrap();
        }

        let tail = timeline.split(ids[0], 2000).unwrap();

        assert_eq!(marker_offsets(&timeline, ids[0]), vec![500]);
        assert_eq!(marker_offsets(&timeline, tail), vec![0, 1500]);

        // Round trip: re-basing the tail markers gives back the markers of the unsplit slice
        let mut rejoined = marker_offsets(&timeline, ids[0]);
        rejoined.extend(marker_offsets(&timeline, tail).iter().map(|o| o + 2000));
        assert_eq!(rejoined, vec![500, 2000, 3500]);
    }

    #[test]
    fn test_split_keeps_labels() {
        let (mut timeline, ids) = chain(&[4000]);
        timeline
            .set_marker(ids[0], 3000, Some("chorus".to_string()))
            .unwrap();

        let tail = timeline.split(ids[0], 1000).unwrap();

        assert_eq!(
            timeline.slice(tail).markers()[0],
            Marker::with_label(2000, Some("chorus".to_string()))
        );
    }

    #[test]
    fn test_split_near_edges_is_rejected_and_leaves_structure() {
        let (mut timeline, ids) = chain(&[4000]);
        timeline.set_marker(ids[0], 1000, None).unwrap();

        for offset in [0, 200, 3800, 4000] {
            let err = timeline.split(ids[0], offset).unwrap_err();
            assert!(matches!(err, DictapiError::DegenerateSplit { .. }));
        }
        assert_eq!(lengths(&timeline), vec![4000]);
        assert_eq!(marker_offsets(&timeline, ids[0]), vec![1000]);
    }

    #[test]
    fn test_delete_full_slice_relinks_neighbours() {
        let (mut timeline, ids) = chain(&[1000, 2000, 3000]);

        timeline.delete(ids[1], 0, 2000).unwrap();

        assert_eq!(order(&timeline), vec![ids[0], ids[2]]);
        assert_eq!(timeline.slice(ids[0]).successor(), Some(ids[2]));
        assert_eq!(timeline.slice(ids[2]).predecessor(), Some(ids[0]));
        assert!(!timeline.contains(ids[1]));
        timeline.check_invariants().unwrap();
    }

    #[test]
    fn test_delete_head_slice_moves_head() {
        let (mut timeline, ids) = chain(&[1000, 2000]);

        timeline.delete(ids[0], 100, 950).unwrap();

        assert_eq!(timeline.head(), Some(ids[1]));
        assert_eq!(timeline.slice(ids[1]).predecessor(), None);
    }

    #[test]
    fn test_delete_from_start_shifts_slice() {
        let (mut timeline, ids) = chain(&[5000]);
        timeline.set_marker(ids[0], 1000, None).unwrap();
        timeline.set_marker(ids[0], 3000, None).unwrap();

        timeline.delete(ids[0], 0, 2000).unwrap();

        let slice = timeline.slice(ids[0]);
        assert_eq!(slice.asset_offset(), 2000);
        assert_eq!(slice.duration(), Some(3000));
        assert_eq!(marker_offsets(&timeline, ids[0]), vec![1000]);
    }

    #[test]
    fn test_delete_to_end_truncates() {
        let (mut timeline, ids) = chain(&[5000]);
        timeline.set_marker(ids[0], 1000, None).unwrap();
        timeline.set_marker(ids[0], 4000, None).unwrap();

        timeline.delete(ids[0], 3000, 4900).unwrap();

        assert_eq!(timeline.slice(ids[0]).duration(), Some(3000));
        assert_eq!(marker_offsets(&timeline, ids[0]), vec![1000]);
    }

    #[test]
    fn test_delete_middle_cuts_region_out() {
        let (mut timeline, ids) = chain(&[6000]);
        timeline.set_marker(ids[0], 2500, None).unwrap();
        timeline.set_marker(ids[0], 5000, None).unwrap();

        timeline.delete(ids[0], 2000, 4000).unwrap();

        assert_eq!(lengths(&timeline), vec![2000, 2000]);
        let tail = timeline.slice(ids[0]).successor().unwrap();
        assert_eq!(timeline.slice(tail).asset_offset(), 4000);
        assert_eq!(marker_offsets(&timeline, tail), vec![1000]);
        assert!(marker_offsets(&timeline, ids[0]).is_empty());
        timeline.check_invariants().unwrap();
    }

    #[test]
    fn test_delete_rejects_degenerate_and_inverted_regions() {
        let (mut timeline, ids) = chain(&[6000]);

        assert!(timeline.delete(ids[0], 3000, 3150).is_err());
        assert!(timeline.delete(ids[0], 4000, 3000).is_err());
        assert!(timeline.delete(ids[0], 1000, 7000).is_err());
        assert_eq!(lengths(&timeline), vec![6000]);
    }

    #[test]
    fn test_delete_range_spanning_slices() {
        let (mut timeline, ids) = chain(&[3000, 3000, 3000]);

        timeline.delete_range(2000, 7000).unwrap();

        assert_eq!(order(&timeline), vec![ids[0], ids[2]]);
        assert_eq!(lengths(&timeline), vec![2000, 2000]);
        assert_eq!(timeline.slice(ids[2]).asset_offset(), 1000);
        assert_eq!(timeline.total_duration(), 4000);
    }

    #[test]
    fn test_delete_range_outside_timeline_fails() {
        let (mut timeline, _) = chain(&[3000]);
        assert!(timeline.delete_range(3000, 4000).is_err());
        assert!(timeline.delete_range(1000, 1000).is_err());
    }

    #[test]
    fn test_find_marker_classification() {
        let (mut timeline, ids) = chain(&[1000]);
        for offset in [100, 500, 900] {
            timeline.slice_mut(ids[0]).add_marker(Marker::new(offset));
        }

        let near = timeline.find_marker(ids[0], 520);
        assert_eq!(near.accurate, Some(500));

        let between = timeline.find_marker(ids[0], 750);
        assert_eq!(between.accurate, None);
        assert_eq!(between.previous, Some(500));
        assert_eq!(between.next, Some(900));
    }

    #[test]
    fn test_set_marker_snaps_to_start() {
        let (mut timeline, ids) = chain(&[3000]);
        assert_eq!(timeline.set_marker(ids[0], 120, None).unwrap(), (ids[0], 0));
    }

    #[test]
    fn test_set_marker_near_end_goes_to_successor() {
        let (mut timeline, ids) = chain(&[3000, 2000]);
        assert_eq!(
            timeline.set_marker(ids[0], 2900, None).unwrap(),
            (ids[1], 0)
        );
        assert!(timeline.slice(ids[0]).markers().is_empty());
    }

    #[test]
    fn test_set_marker_near_end_of_tail_snaps_to_end() {
        let (mut timeline, ids) = chain(&[3000]);
        assert_eq!(
            timeline.set_marker(ids[0], 2900, None).unwrap(),
            (ids[0], 3000)
        );
    }

    #[test]
    fn test_set_marker_reuses_latched_marker() {
        let (mut timeline, ids) = chain(&[3000]);
        timeline.set_marker(ids[0], 1000, None).unwrap();

        let placed = timeline
            .set_marker(ids[0], 1150, Some("intro".to_string()))
            .unwrap();

        assert_eq!(placed, (ids[0], 1000));
        assert_eq!(timeline.slice(ids[0]).markers().len(), 1);
        assert_eq!(
            timeline.slice(ids[0]).markers()[0].label.as_deref(),
            Some("intro")
        );
    }

    #[test]
    fn test_remove_marker() {
        let (mut timeline, ids) = chain(&[3000, 2000]);
        timeline.set_marker(ids[0], 1000, None).unwrap();
        timeline.set_marker(ids[0], 3000, None).unwrap();

        assert_eq!(timeline.remove_marker(ids[0], 1040).unwrap().offset, 1000);
        assert_eq!(timeline.remove_marker(ids[0], 3000).unwrap().offset, 0);
        assert!(matches!(
            timeline.remove_marker(ids[0], 2000),
            Err(DictapiError::NoMarker { offset: 2000 })
        ));
    }

    #[test]
    fn test_latch_snaps_and_clamps() {
        let (timeline, ids) = chain(&[3000]);
        assert_eq!(timeline.latch(ids[0], 150), 0);
        assert_eq!(timeline.latch(ids[0], 1500), 1500);
        assert_eq!(timeline.latch(ids[0], 2850), 3000);
        assert_eq!(timeline.latch(ids[0], 9000), 3000);
    }

    #[test]
    fn test_marker_timecodes_are_absolute() {
        let (mut timeline, ids) = chain(&[3000, 2000]);
        timeline.set_marker(ids[0], 1000, None).unwrap();
        timeline.set_marker(ids[1], 1000, None).unwrap();
        timeline.set_marker(ids[0], 2950, None).unwrap();

        assert_eq!(timeline.marker_timecodes(), vec![1000, 3000, 4000]);
    }

    #[test]
    fn test_slice_begin_and_tail() {
        let (timeline, ids) = chain(&[1000, 2000, 3000]);
        assert_eq!(timeline.slice_begin(ids[2]), 3000);
        assert_eq!(timeline.tail(), Some(ids[2]));
        assert_eq!(timeline.total_duration(), 6000);
    }

    #[test]
    fn test_asset_registry() {
        let mut timeline = Timeline::default();
        let asset = Path::new("take.mp3");
        timeline.register_asset(asset, 4200);
        timeline.set_reverse(asset, PathBuf::from("take.reverse.mp3"));

        let info = timeline.asset_info(asset).unwrap();
        assert_eq!(info.length, Some(4200));
        assert_eq!(info.reverse, Some(PathBuf::from("take.reverse.mp3")));
    }

    #[test]
    fn test_snapshot_serializes_chain() {
        let (mut timeline, ids) = chain(&[1000, 2000]);
        timeline.set_marker(ids[1], 500, None).unwrap();

        let json = serde_json::to_value(timeline.snapshot()).unwrap();

        assert_eq!(json["total"], 3000);
        assert_eq!(json["slices"][1]["begin"], 1000);
        assert_eq!(json["slices"][1]["markers"][0]["offset"], 500);
    }

    #[test]
    fn test_random_edits_preserve_invariants() {
        let (mut timeline, _) = chain(&[10_000, 7_000, 12_000]);
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |bound: u64| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed % bound.max(1)
        };

        for round in 0..300 {
            let live: Vec<SliceId> = order(&timeline);
            if live.is_empty() {
                break;
            }
            let id = live[next(live.len() as u64) as usize];
            let len = timeline.slice(id).len();
            let a = next(len + 1);
            let b = next(len + 1);
            let (from, to) = (a.min(b), a.max(b));
            let total_before = timeline.total_duration();

            let outcome = match next(4) {
                0 => timeline.split(id, a).map(|_| ()),
                1 => {
                    let new = timeline.add(Slice::new(format!("ins{round}.mp3"), 0, 500 + a));
                    timeline.insert(id, a, new).map(|_| ())
                }
                2 => timeline.delete(id, from, to),
                _ => timeline.set_marker(id, a, None).map(|_| ()),
            };

            timeline.check_invariants().unwrap();
            if outcome.is_err() {
                assert_eq!(timeline.total_duration(), total_before);
            }
            for (_, slice) in timeline.iter() {
                assert!(slice.len() > 0, "empty slice left in chain");
            }
        }
    }
}
