//! The fixed SABR/UMP protobuf wire messages, field numbers preserved bit-exactly against the
//! reverse-engineered schema this protocol uses.
//!
//! Every message implements a minimal `encode`/`decode` pair by hand over
//! [`crate::proto::wire`] rather than being generated from a `.proto` file, since none exists
//! for this wire contract. Fields this crate never reads or writes (the schema has a long tail
//! of fields nobody has been able to name) are simply not modeled; unknown field numbers are
//! skipped transparently on decode.

use crate::error::{Result, SabrError};
use crate::proto::wire::*;

/// A triple identifying one server-advertised format: `(itag, lmt, xtags)`.
///
/// Equality is structural (all three fields), and [`FormatId::key`] is the stable string used
/// to index formats across messages, buffered ranges, and on-disk progress documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FormatId {
    pub itag: Option<i32>,
    pub lmt: Option<u64>,
    pub xtags: Option<String>,
}

impl FormatId {
    pub fn key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.itag.unwrap_or_default(),
            self.lmt.unwrap_or_default(),
            self.xtags.as_deref().unwrap_or("")
        )
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>, field: u32) {
        let mut body = Vec::new();
        if let Some(itag) = self.itag {
            put_i32_field(&mut body, 1, itag);
        }
        if let Some(lmt) = self.lmt {
            put_u64_field(&mut body, 2, lmt);
        }
        if let Some(xtags) = &self.xtags {
            put_string_field(&mut body, 3, xtags);
        }
        put_message_field(buf, field, &body);
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = FormatId::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => out.itag = value.as_i32(),
                2 => out.lmt = value.as_u64(),
                3 => out.xtags = value.as_str()?.map(str::to_string),
                _ => {}
            }
        }
        Ok(out)
    }
}

impl std::fmt::Display for FormatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A time interval expressed in server ticks at a given `timescale`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start_ticks: Option<i64>,
    pub duration_ticks: Option<i64>,
    pub timescale: Option<i32>,
}

impl TimeRange {
    pub fn get_start_ms(&self) -> Option<i64> {
        let (start, scale) = (self.start_ticks?, self.timescale?);
        if scale == 0 {
            return None;
        }
        Some(((start as f64 / scale as f64) * 1000.0).ceil() as i64)
    }

    pub fn get_duration_ms(&self) -> Option<i64> {
        let (dur, scale) = (self.duration_ticks?, self.timescale?);
        if scale == 0 {
            return None;
        }
        Some(((dur as f64 / scale as f64) * 1000.0).ceil() as i64)
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>, field: u32) {
        let mut body = Vec::new();
        if let Some(v) = self.start_ticks {
            put_i64_field(&mut body, 1, v);
        }
        if let Some(v) = self.duration_ticks {
            put_i64_field(&mut body, 2, v);
        }
        if let Some(v) = self.timescale {
            put_i32_field(&mut body, 3, v);
        }
        put_message_field(buf, field, &body);
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = TimeRange::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => out.start_ticks = value.as_i64(),
                2 => out.duration_ticks = value.as_i64(),
                3 => out.timescale = value.as_i32(),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// A contiguous span of downloaded segments for a single format (spec §3 "Buffered range").
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BufferedRange {
    pub format_id: Option<FormatId>,
    pub start_time_ms: i64,
    pub duration_ms: i64,
    pub start_segment_index: i32,
    pub end_segment_index: i32,
    pub time_range: Option<TimeRange>,
}

impl BufferedRange {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(fid) = &self.format_id {
            fid.encode_into(&mut body, 1);
        }
        put_i64_field(&mut body, 2, self.start_time_ms);
        put_i64_field(&mut body, 3, self.duration_ms);
        put_i32_field(&mut body, 4, self.start_segment_index);
        put_i32_field(&mut body, 5, self.end_segment_index);
        if let Some(tr) = &self.time_range {
            tr.encode_into(&mut body, 6);
        }
        body
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>, field: u32) {
        put_message_field(buf, field, &self.encode());
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = BufferedRange::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => out.format_id = Some(FormatId::decode(value.as_bytes().unwrap_or_default())?),
                2 => out.start_time_ms = value.as_i64().unwrap_or_default(),
                3 => out.duration_ms = value.as_i64().unwrap_or_default(),
                4 => out.start_segment_index = value.as_i32().unwrap_or_default(),
                5 => out.end_segment_index = value.as_i32().unwrap_or_default(),
                6 => out.time_range = Some(TimeRange::decode(value.as_bytes().unwrap_or_default())?),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Mutable client playback state threaded through every request (spec §3).
#[derive(Debug, Clone, Default)]
pub struct ClientAbrState {
    pub player_time_ms: i64,
    pub enabled_track_types_bitfield: i32,
    pub client_viewport_width: Option<i32>,
    pub client_viewport_height: Option<i32>,
    pub visibility: Option<i32>,
    pub playback_rate: Option<f32>,
    pub time_since_last_seek: Option<i64>,
}

impl ClientAbrState {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(v) = self.client_viewport_width {
            put_i32_field(&mut body, 18, v);
        }
        if let Some(v) = self.client_viewport_height {
            put_i32_field(&mut body, 19, v);
        }
        if let Some(v) = self.visibility {
            put_i32_field(&mut body, 34, v);
        }
        if let Some(v) = self.playback_rate {
            put_float_field(&mut body, 35, v);
        }
        if let Some(v) = self.time_since_last_seek {
            put_i64_field(&mut body, 29, v);
        }
        put_i64_field(&mut body, 28, self.player_time_ms);
        put_i32_field(&mut body, 40, self.enabled_track_types_bitfield);
        body
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub client_name: Option<i32>,
    pub client_version: Option<String>,
    pub user_agent: Option<String>,
    pub visitor_data: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
}

impl ClientInfo {
    pub fn encode_into(&self, buf: &mut Vec<u8>, field: u32) {
        let mut body = Vec::new();
        if let Some(v) = self.client_name {
            put_i32_field(&mut body, 16, v);
        }
        if let Some(v) = &self.client_version {
            put_string_field(&mut body, 17, v);
        }
        if let Some(v) = &self.user_agent {
            put_string_field(&mut body, 15, v);
        }
        if let Some(v) = &self.visitor_data {
            put_string_field(&mut body, 14, v);
        }
        if let Some(v) = &self.os_name {
            put_string_field(&mut body, 18, v);
        }
        if let Some(v) = &self.os_version {
            put_string_field(&mut body, 19, v);
        }
        put_message_field(buf, field, &body);
    }
}

/// One entry of a `SABR_CONTEXT_UPDATE` the server asked the client to echo back. The engine
/// never populates `sabr_contexts`/`unsent_sabr_contexts` itself (Open Question, see DESIGN.md):
/// this type exists so a caller that wants to honor `write_policy` can construct one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SabrContext {
    pub r#type: Option<i32>,
    pub value: Option<Vec<u8>>,
}

impl SabrContext {
    pub fn encode_into(&self, buf: &mut Vec<u8>, field: u32) {
        let mut body = Vec::new();
        if let Some(v) = self.r#type {
            put_i32_field(&mut body, 1, v);
        }
        if let Some(v) = &self.value {
            put_bytes_field(&mut body, 2, v);
        }
        put_message_field(buf, field, &body);
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamerContext {
    pub client_info: ClientInfo,
    pub po_token: Option<Vec<u8>>,
    pub playback_cookie: Option<Vec<u8>>,
    pub sabr_contexts: Vec<SabrContext>,
    pub unsent_sabr_contexts: Vec<i32>,
}

impl StreamerContext {
    pub fn encode_into(&self, buf: &mut Vec<u8>, field: u32) {
        let mut body = Vec::new();
        self.client_info.encode_into(&mut body, 1);
        if let Some(v) = &self.po_token {
            put_bytes_field(&mut body, 2, v);
        }
        if let Some(v) = &self.playback_cookie {
            put_bytes_field(&mut body, 3, v);
        }
        for ctx in &self.sabr_contexts {
            ctx.encode_into(&mut body, 5);
        }
        for t in &self.unsent_sabr_contexts {
            put_i32_field(&mut body, 6, *t);
        }
        put_message_field(buf, field, &body);
    }
}

/// The request sent for every poll: `VideoPlaybackAbrRequest` (spec §4.2).
#[derive(Debug, Clone, Default)]
pub struct VideoPlaybackAbrRequest {
    pub client_abr_state: ClientAbrState,
    pub initialized_format_ids: Vec<FormatId>,
    pub buffered_ranges: Vec<BufferedRange>,
    pub video_playback_ustreamer_config: Vec<u8>,
    pub selected_audio_format_ids: Vec<FormatId>,
    pub selected_video_format_ids: Vec<FormatId>,
    pub streamer_context: StreamerContext,
}

impl VideoPlaybackAbrRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_message_field(&mut buf, 1, &self.client_abr_state.encode());
        for fid in &self.initialized_format_ids {
            fid.encode_into(&mut buf, 2);
        }
        for br in &self.buffered_ranges {
            br.encode_into(&mut buf, 3);
        }
        if !self.video_playback_ustreamer_config.is_empty() {
            put_bytes_field(&mut buf, 5, &self.video_playback_ustreamer_config);
        }
        for fid in &self.selected_audio_format_ids {
            fid.encode_into(&mut buf, 16);
        }
        for fid in &self.selected_video_format_ids {
            fid.encode_into(&mut buf, 17);
        }
        self.streamer_context.encode_into(&mut buf, 19);
        buf
    }
}

/// Per-segment header, carried by `MEDIA_HEADER` parts (spec §4.5).
#[derive(Debug, Clone, Default)]
pub struct MediaHeader {
    pub header_id: Option<u32>,
    pub start_data_range: Option<i32>,
    pub compression: Option<i32>,
    pub is_init_segment: Option<bool>,
    pub sequence_number: Option<i64>,
    pub start_ms: Option<i32>,
    pub duration_ms: Option<i32>,
    pub format_id: Option<FormatId>,
    pub content_length: Option<i64>,
    pub time_range: Option<TimeRange>,
}

impl MediaHeader {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = MediaHeader::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => out.header_id = value.as_u64().map(|v| v as u32),
                6 => out.start_data_range = value.as_i32(),
                7 => out.compression = value.as_i32(),
                8 => out.is_init_segment = value.as_bool(),
                9 => out.sequence_number = value.as_i64(),
                11 => out.start_ms = value.as_i32(),
                12 => out.duration_ms = value.as_i32(),
                13 => out.format_id = Some(FormatId::decode(value.as_bytes().unwrap_or_default())?),
                14 => out.content_length = value.as_i64(),
                15 => out.time_range = Some(TimeRange::decode(value.as_bytes().unwrap_or_default())?),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Per-format session metadata, carried by `FORMAT_INITIALIZATION_METADATA` parts.
#[derive(Debug, Clone, Default)]
pub struct FormatInitializationMetadata {
    pub video_id: Option<String>,
    pub format_id: Option<FormatId>,
    pub end_time_ms: Option<i32>,
    pub total_segments: Option<i32>,
    pub mime_type: Option<String>,
    pub duration: Option<i32>,
    pub duration_timescale: Option<i32>,
}

impl FormatInitializationMetadata {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = FormatInitializationMetadata::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => out.video_id = value.as_str()?.map(str::to_string),
                2 => out.format_id = Some(FormatId::decode(value.as_bytes().unwrap_or_default())?),
                3 => out.end_time_ms = value.as_i32(),
                4 => out.total_segments = value.as_i32(),
                5 => out.mime_type = value.as_str()?.map(str::to_string),
                9 => out.duration = value.as_i32(),
                10 => out.duration_timescale = value.as_i32(),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Snapshot of the live server head, carried by `LIVE_METADATA` parts.
#[derive(Debug, Clone, Default)]
pub struct LiveMetadata {
    pub head_sequence_number: Option<i32>,
    pub head_sequence_time_ms: Option<i64>,
}

impl LiveMetadata {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = LiveMetadata::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                3 => out.head_sequence_number = value.as_i32(),
                4 => out.head_sequence_time_ms = value.as_i64(),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Server's advice for the next poll, carried by `NEXT_REQUEST_POLICY` parts.
#[derive(Debug, Clone, Default)]
pub struct NextRequestPolicy {
    pub backoff_time_ms: Option<i32>,
    pub playback_cookie: Option<Vec<u8>>,
}

impl NextRequestPolicy {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = NextRequestPolicy::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                4 => out.backoff_time_ms = value.as_i32(),
                7 => out.playback_cookie = value.as_bytes().map(|b| b.to_vec()),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// A server-initiated seek, carried by `SABR_SEEK` parts.
#[derive(Debug, Clone, Default)]
pub struct SabrSeek {
    pub seek_time_ticks: i32,
    pub timescale: i32,
}

impl SabrSeek {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = SabrSeek::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => out.seek_time_ticks = value.as_i32().unwrap_or_default(),
                2 => out.timescale = value.as_i32().unwrap_or_default(),
                _ => {}
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SabrError {
    pub error_type: Option<String>,
}

impl SabrError {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = SabrError::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            if field == 1 {
                out.error_type = value.as_str()?.map(str::to_string);
            }
        }
        Ok(out)
    }
}

/// The server's protection-status signal, carried by `STREAM_PROTECTION_STATUS` parts.
///
/// The wire values below follow ordinary protobuf enum numbering (declaration order, no
/// explicit zero reassignment): `OK = 1`, `ATTESTATION_PENDING = 2`, `ATTESTATION_REQUIRED = 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionStatus {
    Ok,
    AttestationPending,
    AttestationRequired,
    Unknown(i32),
}

impl From<i32> for ProtectionStatus {
    fn from(value: i32) -> Self {
        match value {
            1 => ProtectionStatus::Ok,
            2 => ProtectionStatus::AttestationPending,
            3 => ProtectionStatus::AttestationRequired,
            other => ProtectionStatus::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StreamProtectionStatus {
    pub status: i32,
    pub max_retries: Option<i32>,
}

impl StreamProtectionStatus {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = StreamProtectionStatus::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => out.status = value.as_i32().unwrap_or_default(),
                2 => out.max_retries = value.as_i32(),
                _ => {}
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SabrRedirect {
    pub redirect_url: Option<String>,
}

impl SabrRedirect {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = SabrRedirect::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            if field == 1 {
                out.redirect_url = value.as_str()?.map(str::to_string);
            }
        }
        Ok(out)
    }
}

/// The on-disk record of the init segment for a resumable format (spec §3, §4.6). Not part of
/// the reverse-engineered wire contract; field numbers are this crate's own, since there is no
/// server schema for a file this crate alone reads and writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressInitSegment {
    pub filename: String,
    pub content_length: i64,
}

impl ProgressInitSegment {
    pub fn encode_into(&self, buf: &mut Vec<u8>, field: u32) {
        let mut body = Vec::new();
        put_string_field(&mut body, 1, &self.filename);
        put_i64_field(&mut body, 2, self.content_length);
        put_message_field(buf, field, &body);
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = ProgressInitSegment::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => out.filename = value.as_str()?.unwrap_or_default().to_string(),
                2 => out.content_length = value.as_i64().unwrap_or_default(),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// One entry of a [`ProgressSequence`]'s segment list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSegmentEntry {
    pub sequence_number: i64,
    pub content_length: i64,
}

impl ProgressSegmentEntry {
    pub fn encode_into(&self, buf: &mut Vec<u8>, field: u32) {
        let mut body = Vec::new();
        put_i64_field(&mut body, 1, self.sequence_number);
        put_i64_field(&mut body, 2, self.content_length);
        put_message_field(buf, field, &body);
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = ProgressSegmentEntry::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => out.sequence_number = value.as_i64().unwrap_or_default(),
                2 => out.content_length = value.as_i64().unwrap_or_default(),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// A sequence group: a contiguous run of sequence numbers stored in one on-disk part file
/// (Glossary: "Sequence group").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSequence {
    pub sequence_start_number: i64,
    pub sequence_filename: String,
    pub segments: Vec<ProgressSegmentEntry>,
}

impl ProgressSequence {
    pub fn encode_into(&self, buf: &mut Vec<u8>, field: u32) {
        let mut body = Vec::new();
        put_i64_field(&mut body, 1, self.sequence_start_number);
        put_string_field(&mut body, 2, &self.sequence_filename);
        for seg in &self.segments {
            seg.encode_into(&mut body, 3);
        }
        put_message_field(buf, field, &body);
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = ProgressSequence::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => out.sequence_start_number = value.as_i64().unwrap_or_default(),
                2 => out.sequence_filename = value.as_str()?.unwrap_or_default().to_string(),
                3 => out.segments.push(ProgressSegmentEntry::decode(value.as_bytes().unwrap_or_default())?),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Per-format persisted record enabling resume (spec §3 "ProgressDocument", §4.6): serialized to
/// `{final}.sabr.binpb` and rewritten atomically on every segment delivery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressDocument {
    pub format_id: Option<FormatId>,
    pub buffered_ranges: Vec<BufferedRange>,
    pub init_segment: Option<ProgressInitSegment>,
    pub sequences: Vec<ProgressSequence>,
}

impl ProgressDocument {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(fid) = &self.format_id {
            fid.encode_into(&mut buf, 1);
        }
        for br in &self.buffered_ranges {
            br.encode_into(&mut buf, 2);
        }
        if let Some(init) = &self.init_segment {
            init.encode_into(&mut buf, 3);
        }
        for seq in &self.sequences {
            seq.encode_into(&mut buf, 4);
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut out = ProgressDocument::default();
        let mut r = Reader::new(data);
        while let Some((field, value)) = r.next_field()? {
            match field {
                1 => out.format_id = Some(FormatId::decode(value.as_bytes().unwrap_or_default())?),
                2 => out.buffered_ranges.push(BufferedRange::decode(value.as_bytes().unwrap_or_default())?),
                3 => out.init_segment = Some(ProgressInitSegment::decode(value.as_bytes().unwrap_or_default())?),
                4 => out.sequences.push(ProgressSequence::decode(value.as_bytes().unwrap_or_default())?),
                _ => {}
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_id_round_trips_through_the_wire() {
        let fid = FormatId { itag: Some(140), lmt: Some(1_700_000_000), xtags: None };
        let mut buf = Vec::new();
        fid.encode_into(&mut buf, 2);
        let mut r = Reader::new(&buf);
        let (field, value) = r.next_field().unwrap().unwrap();
        assert_eq!(field, 2);
        let decoded = FormatId::decode(value.as_bytes().unwrap()).unwrap();
        assert_eq!(decoded, fid);
    }

    #[test]
    fn buffered_range_round_trips() {
        let br = BufferedRange {
            format_id: Some(FormatId { itag: Some(137), lmt: Some(1), xtags: None }),
            start_time_ms: 1000,
            duration_ms: 2000,
            start_segment_index: 0,
            end_segment_index: 4,
            time_range: Some(TimeRange { start_ticks: Some(1000), duration_ticks: Some(2000), timescale: Some(1000) }),
        };
        let mut buf = Vec::new();
        br.encode_into(&mut buf, 3);
        let mut r = Reader::new(&buf);
        let (_, value) = r.next_field().unwrap().unwrap();
        let decoded = BufferedRange::decode(value.as_bytes().unwrap()).unwrap();
        assert_eq!(decoded, br);
    }

    #[test]
    fn video_playback_abr_request_encodes_without_panicking() {
        let req = VideoPlaybackAbrRequest {
            client_abr_state: ClientAbrState { player_time_ms: 5000, enabled_track_types_bitfield: 0, ..Default::default() },
            selected_audio_format_ids: vec![FormatId { itag: Some(140), lmt: None, xtags: None }],
            ..Default::default()
        };
        let bytes = req.encode();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn progress_document_round_trips_through_the_wire() {
        let doc = ProgressDocument {
            format_id: Some(FormatId { itag: Some(140), lmt: Some(1), xtags: None }),
            buffered_ranges: vec![BufferedRange {
                format_id: Some(FormatId { itag: Some(140), lmt: Some(1), xtags: None }),
                start_time_ms: 0,
                duration_ms: 8000,
                start_segment_index: 0,
                end_segment_index: 7,
                time_range: Some(TimeRange { start_ticks: Some(0), duration_ticks: Some(8000), timescale: Some(1000) }),
            }],
            init_segment: Some(ProgressInitSegment { filename: "out.seqinit.sabr.part".to_string(), content_length: 512 }),
            sequences: vec![ProgressSequence {
                sequence_start_number: 0,
                sequence_filename: "out.seq0.sabr.part".to_string(),
                segments: vec![
                    ProgressSegmentEntry { sequence_number: 0, content_length: 100 },
                    ProgressSegmentEntry { sequence_number: 1, content_length: 120 },
                ],
            }],
        };
        let bytes = doc.encode();
        let decoded = ProgressDocument::decode(&bytes).unwrap();
        assert_eq!(decoded, doc);
    }
}
