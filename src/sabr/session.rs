//! The session engine: owns playback state and produces a lazy sequence of [`Event`]s.

use std::time::Instant;

use tracing::{trace, warn};

use crate::error::{Result, SabrError};
use crate::proto::{FormatId, LiveMetadata, NextRequestPolicy};
use crate::sabr::config::SabrSessionConfig;
use crate::sabr::format::{FormatSelector, HeaderIdTable, InitializedFormat};
use crate::sabr::handlers;
use crate::sabr::request::build_request;
use crate::sabr::transport::SabrUrl;

#[cfg(feature = "fetch")]
use crate::sabr::transport::SabrTransport;

/// Why a [`Event::MediaSeek`] was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekReason {
    ServerSeek,
    BufferSeek,
}

/// A classified PO token acceptance status, derived from `STREAM_PROTECTION_STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoTokenStatusKind {
    Ok,
    Missing,
    Invalid,
    Pending,
    NotRequired,
    PendingMissing,
}

/// Why a [`Event::RefreshPlayerResponse`] was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    SabrUrlExpiry,
    Unknown,
}

/// One unit of output from the session engine's event stream.
#[derive(Debug, Clone)]
pub enum Event {
    MediaSegment {
        selector_index: usize,
        format_id: FormatId,
        player_time_ms: i64,
        fragment_index: i64,
        fragment_count: Option<i64>,
        is_init_segment: bool,
        start_bytes: Option<i32>,
        start_ms: i64,
        duration_ms: i64,
        data: Vec<u8>,
    },
    MediaSeek {
        reason: SeekReason,
        format_id: FormatId,
        selector_index: usize,
    },
    PoTokenStatus {
        status: PoTokenStatusKind,
    },
    RefreshPlayerResponse {
        reason: RefreshReason,
    },
}

/// Mutable engine state threaded through request building and message dispatch.
pub struct SessionState {
    pub audio_selector: Option<FormatSelector>,
    pub video_selector: Option<FormatSelector>,
    pub initialized_formats: Vec<InitializedFormat>,
    pub header_table: HeaderIdTable,
    pub player_time_ms: i64,
    pub total_duration_ms: i64,
    pub is_live: bool,
    pub live_metadata: Option<LiveMetadata>,
    pub next_request_policy: Option<NextRequestPolicy>,
    pub playback_cookie: Option<Vec<u8>>,
    pub redirected: bool,
    pub is_retry: bool,
    pub request_had_data: bool,
    pub requests_no_data: u32,
    pub timestamp_no_data: Option<Instant>,
    pub sps_retry_count: u32,
    pub sps_max_retries: u32,
    pub po_token_present: bool,
    pub live_segment_target_duration_sec: u64,
    pub max_empty_requests: u32,
    pub live_end_wait_sec: u64,
    pub pending_events: Vec<Event>,
    pub pending_redirect: Option<String>,
    pub resume_state: [Option<(Vec<crate::proto::BufferedRange>, bool)>; 2],
}

impl SessionState {
    pub fn new(config: &SabrSessionConfig) -> Self {
        SessionState {
            audio_selector: config.audio_selection.clone(),
            video_selector: config.video_selection.clone(),
            initialized_formats: Vec::new(),
            header_table: HeaderIdTable::default(),
            player_time_ms: config.start_time_ms,
            total_duration_ms: 0,
            is_live: false,
            live_metadata: None,
            next_request_policy: None,
            playback_cookie: None,
            redirected: false,
            is_retry: false,
            request_had_data: false,
            requests_no_data: 0,
            timestamp_no_data: None,
            sps_retry_count: 0,
            sps_max_retries: 5,
            po_token_present: config.po_token.is_some(),
            live_segment_target_duration_sec: config.live_segment_target_duration_sec,
            max_empty_requests: config.max_empty_requests,
            live_end_wait_sec: config.live_end_wait_sec,
            pending_events: Vec::new(),
            pending_redirect: None,
            resume_state: config.resume_state.clone(),
        }
    }

    /// Matches a server-advertised format to a caller selector. Index `0` is the audio
    /// selector, `1` the video selector (used for server-side format-switch detection).
    pub fn match_selector(&self, format_id: &FormatId, mime_type: &str) -> Option<usize> {
        if let Some(sel) = &self.audio_selector {
            if sel.matches(format_id, mime_type) {
                return Some(0);
            }
        }
        if let Some(sel) = &self.video_selector {
            if sel.matches(format_id, mime_type) {
                return Some(1);
            }
        }
        None
    }

    pub fn selector(&self, index: usize) -> &FormatSelector {
        match index {
            0 => self.audio_selector.as_ref().expect("selector_index 0 implies an audio selector"),
            _ => self.video_selector.as_ref().expect("selector_index 1 implies a video selector"),
        }
    }

    pub fn find_initialized_mut(&mut self, format_id: &FormatId) -> Option<&mut InitializedFormat> {
        self.initialized_formats.iter_mut().find(|f| &f.format_id == format_id)
    }

    pub fn find_initialized(&self, format_id: &FormatId) -> Option<&InitializedFormat> {
        self.initialized_formats.iter().find(|f| &f.format_id == format_id)
    }

    /// Seeds resumed state from a previously-persisted progress document (spec §4.6 resume).
    pub fn seed_from_progress(&mut self, format_id: &FormatId, buffered_ranges: Vec<crate::proto::BufferedRange>, has_init: bool) {
        if let Some(fmt) = self.find_initialized_mut(format_id) {
            fmt.buffered_ranges = buffered_ranges;
            fmt.current_segment = None;
            if has_init {
                // A placeholder marker; the real bytes live in the writer's sequence file.
                fmt.init_segment = Some(crate::sabr::format::Segment {
                    format_id: format_id.clone(),
                    is_init_segment: true,
                    sequence_number: None,
                    start_ms: 0,
                    duration_ms: 0,
                    duration_estimated: false,
                    content_length: None,
                    start_data_range: None,
                    discard: false,
                    data: Vec::new(),
                });
            }
        }
    }

    /// Runs next-playback-time preparation (spec §4.3.2) at the end of a request's dispatch.
    /// Returns `true` if the session should be marked consumed.
    fn prepare_next_request(&mut self) -> Result<(bool, Option<u64>)> {
        let player_time_ms_before = self.player_time_ms;

        if !self.header_table.is_empty() {
            warn!(remaining = self.header_table.len(), "header id table non-empty at end of request");
        }

        if !self.request_had_data && !self.is_retry {
            self.requests_no_data += 1;
            if self.timestamp_no_data.is_none() {
                self.timestamp_no_data = Some(Instant::now());
            }
        } else {
            self.requests_no_data = 0;
            self.timestamp_no_data = None;
        }

        // Buffer-seek detection.
        for idx in 0..self.initialized_formats.len() {
            let (selector_index, format_id, seek_needed) = {
                let fmt = &self.initialized_formats[idx];
                let Some(cur) = &fmt.current_segment else { continue };
                let Some(seq) = cur.sequence_number else { continue };
                let matches: Vec<usize> = fmt
                    .buffered_ranges
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| r.end_segment_index as i64 == seq)
                    .map(|(i, _)| i)
                    .collect();
                if matches.len() > 1 {
                    return Err(SabrError::Protocol(format!(
                        "segment {seq} appears in {} buffered ranges for format {}",
                        matches.len(),
                        fmt.format_id
                    )));
                }
                match matches.first() {
                    Some(&range_idx) if fmt.chain_len(range_idx) >= 2 => {
                        (fmt.selector_index, fmt.format_id.clone(), true)
                    }
                    _ => (fmt.selector_index, fmt.format_id.clone(), false),
                }
            };
            if seek_needed {
                self.initialized_formats[idx].current_segment = None;
                self.pending_events.push(Event::MediaSeek {
                    reason: SeekReason::BufferSeek,
                    format_id,
                    selector_index,
                });
            }
        }

        // Target time computation.
        let mut tails_ms: Vec<i64> = Vec::new();
        let mut missing_tail = false;
        for fmt in &self.initialized_formats {
            match fmt.range_containing_time(self.player_time_ms) {
                Some(range_idx) => {
                    let tail_idx = fmt.chain_tail(range_idx);
                    let tail = &fmt.buffered_ranges[tail_idx];
                    tails_ms.push(tail.start_time_ms + tail.duration_ms);
                }
                None => missing_tail = true,
            }
        }
        let backoff = self.next_request_policy.as_ref().and_then(|p| p.backoff_time_ms).unwrap_or(0) as i64;
        let mut next_player_time = self.player_time_ms + backoff;
        if !tails_ms.is_empty() {
            let min_buffered = *tails_ms.iter().min().unwrap();
            next_player_time = if missing_tail {
                min_buffered.min(self.player_time_ms).max(next_player_time)
            } else {
                min_buffered.max(next_player_time)
            };
        }
        if !self.redirected {
            self.player_time_ms = next_player_time;
        }

        // End-of-media detection.
        let mut consumed = false;
        let mut wait_sec = None;
        if !self.initialized_formats.is_empty() {
            let all_finished = self.initialized_formats.iter().all(|f| {
                f.discard
                    || f.total_sequences
                        .map(|total| f.buffered_ranges.iter().any(|r| r.end_segment_index as i64 >= total))
                        .unwrap_or(false)
            });
            if all_finished {
                consumed = true;
            } else if self.total_duration_ms > 0 && self.player_time_ms >= self.total_duration_ms {
                if self.is_live {
                    let waited = self
                        .timestamp_no_data
                        .map(|t| t.elapsed().as_secs())
                        .unwrap_or(0);
                    if self.requests_no_data > self.max_empty_requests && waited >= self.live_end_wait_sec {
                        consumed = true;
                    } else {
                        wait_sec = Some(backoff as u64 / 1000 + self.live_segment_target_duration_sec);
                    }
                } else {
                    consumed = true;
                }
            }
        }

        if !consumed
            && !self.is_live
            && self.player_time_ms == player_time_ms_before
            && self.requests_no_data > self.max_empty_requests
            && self.total_duration_ms > 0
            && self.player_time_ms < self.total_duration_ms
        {
            return Err(SabrError::Stream("no data in three consecutive requests".to_string()));
        }

        self.redirected = false;
        self.is_retry = false;
        self.request_had_data = false;
        self.next_request_policy = None;
        self.live_metadata = None;
        self.header_table.clear();

        Ok((consumed, wait_sec))
    }
}

/// The SABR session engine: builds requests, dispatches responses, and yields [`Event`]s.
#[cfg(feature = "fetch")]
pub struct SabrSession {
    config: SabrSessionConfig,
    transport: SabrTransport,
    state: SessionState,
    request_number: u64,
    consumed: bool,
}

#[cfg(feature = "fetch")]
impl SabrSession {
    pub fn new(config: SabrSessionConfig, http_client: reqwest::Client) -> Result<Self> {
        config.validate()?;
        let url = SabrUrl::parse(&config.server_abr_streaming_url)?;
        let is_live = url.is_live();
        let transport = SabrTransport::new(http_client, url, config.http_retries, config.host_fallback_threshold)
            .with_rate_limit(config.rate_limit_bps);
        let mut state = SessionState::new(&config);
        state.is_live = is_live;
        Ok(SabrSession { config, transport, state, request_number: 0, consumed: false })
    }

    pub fn is_live(&self) -> bool {
        self.state.is_live
    }

    /// The current buffered ranges for an initialized format, for the driving loop to persist
    /// into that format's [`crate::sabr::writer::FormatWriter`] progress document after each
    /// batch of events (spec §4.6 step 5).
    pub fn buffered_ranges(&self, format_id: &FormatId) -> Option<Vec<crate::proto::BufferedRange>> {
        self.state.find_initialized(format_id).map(|f| f.buffered_ranges.clone())
    }

    pub fn close(&mut self) {
        self.consumed = true;
    }

    /// Replaces the session's URL and ustreamer config in response to a
    /// [`Event::RefreshPlayerResponse`].
    pub fn refresh(&mut self, server_abr_streaming_url: &str, video_playback_ustreamer_config: Vec<u8>) -> Result<()> {
        self.transport.url.set(server_abr_streaming_url)?;
        self.config.video_playback_ustreamer_config = video_playback_ustreamer_config;
        Ok(())
    }

    /// Pulls the next batch of events, issuing one HTTP poll. Returns an empty vec (never more
    /// than once) on the final call before the session is consumed.
    pub async fn next_events(&mut self) -> Result<Vec<Event>> {
        if self.consumed {
            return Err(SabrError::Consumed);
        }

        let now = epoch_secs_now();
        if self.transport.url.expires_within(now, 300) {
            self.state.pending_events.push(Event::RefreshPlayerResponse { reason: RefreshReason::SabrUrlExpiry });
        }

        let req = build_request(
            &self.config,
            self.state.player_time_ms,
            &self.state.initialized_formats,
            self.state.playback_cookie.as_deref(),
        );
        let body = req.encode();

        let response = self.transport.post(body, self.request_number).await?;
        self.request_number += 1;

        let parts = crate::ump::iter_parts(&response)?;
        for part in parts {
            if let Some(redirect) = handlers::dispatch(&mut self.state, part)? {
                self.transport.url.set(&redirect)?;
                self.state.redirected = true;
            }
        }

        let (consumed, wait_sec) = self.state.prepare_next_request()?;
        if consumed {
            self.consumed = true;
        }

        let events = std::mem::take(&mut self.state.pending_events);
        trace!(count = events.len(), request_number = self.request_number, "yielding events");

        if !self.consumed {
            if let Some(wait_sec) = wait_sec {
                trace!(wait_sec, "sleeping between live polls");
                tokio::time::sleep(std::time::Duration::from_secs(wait_sec)).await;
            }
        }

        Ok(events)
    }
}

#[cfg(feature = "fetch")]
fn epoch_secs_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
