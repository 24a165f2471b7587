//! Format selection, per-format session state, and buffered-range bookkeeping.

use std::collections::HashMap;

use crate::proto::{BufferedRange, FormatId, TimeRange};

/// A caller's intent to receive one track.
///
/// A selector matches a server-advertised format if its `ids` list contains the advertised
/// `FormatId`, or if `ids` is empty and the advertised MIME type matches the selector's track
/// kind (`"audio/"` or `"video/"`).
#[derive(Debug, Clone)]
pub enum FormatSelector {
    Audio { ids: Vec<FormatId>, discard_media: bool },
    Video { ids: Vec<FormatId>, discard_media: bool },
}

impl FormatSelector {
    pub fn discard_media(&self) -> bool {
        match self {
            FormatSelector::Audio { discard_media, .. } => *discard_media,
            FormatSelector::Video { discard_media, .. } => *discard_media,
        }
    }

    fn ids(&self) -> &[FormatId] {
        match self {
            FormatSelector::Audio { ids, .. } => ids,
            FormatSelector::Video { ids, .. } => ids,
        }
    }

    fn mime_prefix(&self) -> &'static str {
        match self {
            FormatSelector::Audio { .. } => "audio/",
            FormatSelector::Video { .. } => "video/",
        }
    }

    pub fn matches(&self, format_id: &FormatId, mime_type: &str) -> bool {
        if !self.ids().is_empty() {
            return self.ids().contains(format_id);
        }
        mime_type.starts_with(self.mime_prefix())
    }
}

/// One unit of media delivered across a `MEDIA_HEADER`/`MEDIA`*/`MEDIA_END` triple.
#[derive(Debug, Clone)]
pub struct Segment {
    pub format_id: FormatId,
    pub is_init_segment: bool,
    pub sequence_number: Option<i64>,
    pub start_ms: i64,
    pub duration_ms: i64,
    pub duration_estimated: bool,
    pub content_length: Option<i64>,
    pub start_data_range: Option<i32>,
    pub discard: bool,
    pub data: Vec<u8>,
}

/// Maps a request-scoped one-byte header id to the [`Segment`] being assembled.
///
/// Entries are inserted on `MEDIA_HEADER`, appended to by `MEDIA`, and removed by `MEDIA_END`.
/// A non-empty table at the end of a request's dispatch is a warning, not a fatal error.
#[derive(Debug, Default)]
pub struct HeaderIdTable {
    segments: HashMap<u8, Segment>,
}

impl HeaderIdTable {
    pub fn insert(&mut self, header_id: u8, segment: Segment) {
        self.segments.insert(header_id, segment);
    }

    pub fn get_mut(&mut self, header_id: u8) -> Option<&mut Segment> {
        self.segments.get_mut(&header_id)
    }

    pub fn remove(&mut self, header_id: u8) -> Option<Segment> {
        self.segments.remove(&header_id)
    }

    pub fn contains(&self, header_id: u8) -> bool {
        self.segments.contains_key(&header_id)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }
}

/// Per-format session state, created on receipt of `FORMAT_INITIALIZATION_METADATA`.
#[derive(Debug, Clone)]
pub struct InitializedFormat {
    pub format_id: FormatId,
    pub mime_type: String,
    pub video_id: Option<String>,
    pub duration_ms: i64,
    pub end_time_ms: Option<i64>,
    pub total_sequences: Option<i64>,
    pub selector_index: usize,
    pub init_segment: Option<Segment>,
    pub current_segment: Option<Segment>,
    pub buffered_ranges: Vec<BufferedRange>,
    pub discard: bool,
}

impl InitializedFormat {
    pub fn new(format_id: FormatId, mime_type: String, selector_index: usize, discard: bool) -> Self {
        InitializedFormat {
            format_id,
            mime_type,
            video_id: None,
            duration_ms: 0,
            end_time_ms: None,
            total_sequences: None,
            selector_index,
            init_segment: None,
            current_segment: None,
            buffered_ranges: Vec::new(),
            discard,
        }
    }

    /// Pre-fills a single maximum-width buffered range, used to suppress further server
    /// transmission for a discarded track.
    pub fn suppress_with_max_range(&mut self) {
        self.buffered_ranges.push(BufferedRange {
            format_id: Some(self.format_id.clone()),
            start_time_ms: 0,
            duration_ms: 0,
            start_segment_index: 0,
            end_segment_index: i32::MAX,
            time_range: Some(TimeRange { start_ticks: Some(0), duration_ticks: Some(0), timescale: Some(1000) }),
        });
    }

    /// Returns the index of the buffered range containing `segment_index`, if any.
    pub fn range_containing_segment(&self, segment_index: i64) -> Option<usize> {
        self.buffered_ranges.iter().position(|r| {
            (r.start_segment_index as i64) <= segment_index && segment_index <= (r.end_segment_index as i64)
        })
    }

    /// Returns the index of the buffered range ending exactly at `segment_index`.
    pub fn range_ending_at(&self, segment_index: i64) -> Option<usize> {
        self.buffered_ranges.iter().position(|r| r.end_segment_index as i64 == segment_index)
    }

    /// Returns the index of the buffered range containing the given playback time, by
    /// `[start_time_ms, start_time_ms + duration_ms)`.
    pub fn range_containing_time(&self, time_ms: i64) -> Option<usize> {
        self.buffered_ranges
            .iter()
            .position(|r| r.start_time_ms <= time_ms && time_ms < r.start_time_ms + r.duration_ms)
    }

    /// Follows the contiguous chain (Glossary: "Chain") starting at `range_index` and returns
    /// the index of its tail (the last range in the chain).
    pub fn chain_tail(&self, range_index: usize) -> usize {
        let mut tail = range_index;
        loop {
            let end = self.buffered_ranges[tail].end_segment_index;
            match self
                .buffered_ranges
                .iter()
                .position(|r| r.start_segment_index == end + 1)
            {
                Some(next) if next != tail => tail = next,
                _ => break,
            }
        }
        tail
    }

    /// Length (number of ranges) of the chain starting at `range_index`.
    pub fn chain_len(&self, range_index: usize) -> usize {
        let mut len = 1;
        let mut cur = range_index;
        loop {
            let end = self.buffered_ranges[cur].end_segment_index;
            match self
                .buffered_ranges
                .iter()
                .position(|r| r.start_segment_index == end + 1)
            {
                Some(next) if next != cur => {
                    cur = next;
                    len += 1;
                }
                _ => break,
            }
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: i32, end: i32) -> BufferedRange {
        BufferedRange {
            format_id: None,
            start_time_ms: start as i64 * 1000,
            duration_ms: (end - start + 1) as i64 * 1000,
            start_segment_index: start,
            end_segment_index: end,
            time_range: None,
        }
    }

    #[test]
    fn selector_matches_by_explicit_id() {
        let sel = FormatSelector::Audio { ids: vec![FormatId { itag: Some(140), lmt: None, xtags: None }], discard_media: false };
        assert!(sel.matches(&FormatId { itag: Some(140), lmt: None, xtags: None }, "audio/mp4"));
        assert!(!sel.matches(&FormatId { itag: Some(141), lmt: None, xtags: None }, "audio/mp4"));
    }

    #[test]
    fn selector_matches_by_mime_when_no_ids_given() {
        let sel = FormatSelector::Video { ids: vec![], discard_media: false };
        assert!(sel.matches(&FormatId { itag: Some(137), lmt: None, xtags: None }, "video/mp4"));
        assert!(!sel.matches(&FormatId { itag: Some(137), lmt: None, xtags: None }, "audio/mp4"));
    }

    #[test]
    fn chain_tail_follows_contiguous_ranges() {
        let mut f = InitializedFormat::new(FormatId::default(), "video/mp4".to_string(), 0, false);
        f.buffered_ranges = vec![range(0, 4), range(5, 9), range(20, 25)];
        assert_eq!(f.chain_tail(0), 1);
        assert_eq!(f.chain_len(0), 2);
        assert_eq!(f.chain_tail(2), 2);
        assert_eq!(f.chain_len(2), 1);
    }

    #[test]
    fn range_containing_segment_finds_the_right_range() {
        let mut f = InitializedFormat::new(FormatId::default(), "video/mp4".to_string(), 0, false);
        f.buffered_ranges = vec![range(0, 4), range(30, 35)];
        assert_eq!(f.range_containing_segment(2), Some(0));
        assert_eq!(f.range_containing_segment(32), Some(1));
        assert_eq!(f.range_containing_segment(10), None);
    }
}
