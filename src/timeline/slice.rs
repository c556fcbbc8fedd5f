//! Slices and markers: the nodes of the timeline chain.

use super::Millis;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable handle of a slice inside a [`Timeline`](super::Timeline) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SliceId(pub(super) usize);

impl SliceId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SliceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A point in time within one slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    /// Milliseconds after the start of the owning slice
    pub offset: Millis,
    pub label: Option<String>,
}

impl Marker {
    pub fn new(offset: Millis) -> Self {
        Self {
            offset,
            label: None,
        }
    }

    pub fn with_label(offset: Millis, label: Option<String>) -> Self {
        Self { offset, label }
    }
}

/// Result of a marker search around an offset.
///
/// Values are marker offsets within the searched slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerMatch {
    /// Marker within the capture window of the searched offset
    pub accurate: Option<Millis>,
    /// Nearest marker before the match (or before the offset)
    pub previous: Option<Millis>,
    /// Nearest marker after the match (or after the offset)
    pub next: Option<Millis>,
}

impl MarkerMatch {
    pub fn is_empty(&self) -> bool {
        self.accurate.is_none() && self.previous.is_none() && self.next.is_none()
    }
}

/// A contiguous interval of one audio asset placed into the timeline.
#[derive(Debug, Clone, Serialize)]
pub struct Slice {
    pub(super) asset: PathBuf,
    pub(super) asset_offset: Millis,
    pub(super) duration: Option<Millis>,
    pub(super) markers: Vec<Marker>,
    pub(super) predecessor: Option<SliceId>,
    pub(super) successor: Option<SliceId>,
}

impl Slice {
    /// A slice with known extent.
    pub fn new(asset: impl Into<PathBuf>, asset_offset: Millis, duration: Millis) -> Self {
        Self {
            asset: asset.into(),
            asset_offset,
            duration: Some(duration),
            markers: Vec::new(),
            predecessor: None,
            successor: None,
        }
    }

    /// A slice that is still being recorded.
    pub fn open(asset: impl Into<PathBuf>) -> Self {
        Self {
            asset: asset.into(),
            asset_offset: 0,
            duration: None,
            markers: Vec::new(),
            predecessor: None,
            successor: None,
        }
    }

    pub fn asset(&self) -> &Path {
        &self.asset
    }

    pub fn asset_offset(&self) -> Millis {
        self.asset_offset
    }

    pub fn duration(&self) -> Option<Millis> {
        self.duration
    }

    /// Extent used for timecode arithmetic; an open slice counts as empty.
    pub fn len(&self) -> Millis {
        self.duration.unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_open(&self) -> bool {
        self.duration.is_none()
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn predecessor(&self) -> Option<SliceId> {
        self.predecessor
    }

    pub fn successor(&self) -> Option<SliceId> {
        self.successor
    }

    /// Inserts keeping ascending order; equal offsets keep insertion order.
    pub(super) fn add_marker(&mut self, marker: Marker) {
        let idx = self.markers.partition_point(|m| m.offset <= marker.offset);
        self.markers.insert(idx, marker);
    }

    /// Ordered search with a capture window of `window` milliseconds.
    ///
    /// The first marker at or after `offset - window` is the candidate; it is
    /// the accurate match when it lies within `offset + window`. Neighbours
    /// are reported relative to the match, or around `offset` otherwise.
    pub(super) fn find_marker(&self, offset: Millis, window: Millis) -> MarkerMatch {
        let mut result = MarkerMatch::default();
        if self.markers.is_empty() {
            return result;
        }

        let lower = offset.saturating_sub(window);
        let idx = self.markers.partition_point(|m| m.offset < lower);
        let at = |i: usize| self.markers.get(i).map(|m| m.offset);
        let before = |i: usize| i.checked_sub(1).and_then(at);

        match self.markers.get(idx) {
            Some(candidate) if candidate.offset <= offset.saturating_add(window) => {
                result.accurate = Some(candidate.offset);
                result.previous = before(idx);
                result.next = at(idx + 1);
            }
            Some(candidate) => {
                result.previous = before(idx);
                result.next = Some(candidate.offset);
            }
            None => {
                result.previous = self.markers.last().map(|m| m.offset);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice_with_markers(offsets: &[Millis]) -> Slice {
        let mut slice = Slice::new("a.mp3", 0, 1000);
        for &offset in offsets {
            slice.add_marker(Marker::new(offset));
        }
        slice
    }

    #[test]
    fn test_add_marker_keeps_order() {
        let slice = slice_with_markers(&[900, 100, 500]);
        let offsets: Vec<_> = slice.markers().iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![100, 500, 900]);
    }

    #[test]
    fn test_find_marker_on_empty_slice() {
        let slice = slice_with_markers(&[]);
        assert!(slice.find_marker(300, 100).is_empty());
    }

    #[test]
    fn test_find_marker_accurate_has_neighbours() {
        let slice = slice_with_markers(&[100, 500, 900]);
        let found = slice.find_marker(520, 100);
        assert_eq!(found.accurate, Some(500));
        assert_eq!(found.previous, Some(100));
        assert_eq!(found.next, Some(900));
    }

    #[test]
    fn test_find_marker_between_markers() {
        let slice = slice_with_markers(&[100, 500, 900]);
        let found = slice.find_marker(750, 100);
        assert_eq!(found.accurate, None);
        assert_eq!(found.previous, Some(500));
        assert_eq!(found.next, Some(900));
    }

    #[test]
    fn test_find_marker_after_last() {
        let slice = slice_with_markers(&[100, 500]);
        let found = slice.find_marker(950, 100);
        assert_eq!(found.accurate, None);
        assert_eq!(found.previous, Some(500));
        assert_eq!(found.next, None);
    }

    #[test]
    fn test_find_marker_before_first() {
        let slice = slice_with_markers(&[500, 900]);
        let found = slice.find_marker(50, 100);
        assert_eq!(found.accurate, None);
        assert_eq!(found.previous, None);
        assert_eq!(found.next, Some(500));
    }

    #[test]
    fn test_find_marker_window_near_zero_does_not_underflow() {
        let slice = slice_with_markers(&[0, 500]);
        let found = slice.find_marker(30, 100);
        assert_eq!(found.accurate, Some(0));
        assert_eq!(found.previous, None);
        assert_eq!(found.next, Some(500));
    }

    #[test]
    fn test_open_slice_has_zero_len() {
        let slice = Slice::open("rec.mp3");
        assert!(slice.is_open());
        assert_eq!(slice.len(), 0);
        assert_eq!(slice.duration(), None);
    }
}
