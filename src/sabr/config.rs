//! Caller-facing session configuration.
//!
//! A struct of mostly-optional fields assembled with chained `with_*` setters, kept
//! deliberately thin so that extractor concerns (discovering the SABR URL, obtaining a PO
//! token, building the ustreamer config) stay outside the engine.

use crate::proto::{BufferedRange, ClientInfo};
use crate::sabr::format::FormatSelector;

/// Configuration for one [`crate::sabr::session::SabrSession`].
///
/// At least one of `audio_selection`/`video_selection` must be set before calling
/// [`SabrSessionConfig::build`]; the engine treats neither being set as caller misuse.
#[derive(Debug, Clone)]
pub struct SabrSessionConfig {
    pub server_abr_streaming_url: String,
    pub video_playback_ustreamer_config: Vec<u8>,
    pub client_info: ClientInfo,
    pub audio_selection: Option<FormatSelector>,
    pub video_selection: Option<FormatSelector>,
    pub po_token: Option<Vec<u8>>,
    pub start_time_ms: i64,
    pub live_segment_target_duration_sec: u64,
    pub http_retries: u32,
    pub host_fallback_threshold: u32,
    pub live_end_wait_sec: u64,
    pub max_empty_requests: u32,
    pub debug: bool,
    pub continue_download: bool,
    pub rate_limit_bps: u64,
    /// Progress resumed from a [`crate::sabr::writer::FormatWriter`]'s on-disk document, indexed
    /// by selector index (`0` audio, `1` video): the format's persisted buffered ranges and
    /// whether an init segment was already captured. Seeded into the matching
    /// [`crate::sabr::format::InitializedFormat`] the moment its
    /// `FORMAT_INITIALIZATION_METADATA` arrives (spec §4.6 "Resume").
    pub resume_state: [Option<(Vec<BufferedRange>, bool)>; 2],
}

impl SabrSessionConfig {
    pub fn new(server_abr_streaming_url: impl Into<String>) -> Self {
        SabrSessionConfig {
            server_abr_streaming_url: server_abr_streaming_url.into(),
            video_playback_ustreamer_config: Vec::new(),
            client_info: ClientInfo::default(),
            audio_selection: None,
            video_selection: None,
            po_token: None,
            start_time_ms: 0,
            live_segment_target_duration_sec: 5,
            http_retries: 10,
            host_fallback_threshold: 8,
            live_end_wait_sec: 10,
            max_empty_requests: 3,
            debug: false,
            continue_download: false,
            rate_limit_bps: 0,
            resume_state: [None, None],
        }
    }

    pub fn with_ustreamer_config(mut self, raw: Vec<u8>) -> Self {
        self.video_playback_ustreamer_config = raw;
        self
    }

    pub fn with_client_info(mut self, client_info: ClientInfo) -> Self {
        self.client_info = client_info;
        self
    }

    pub fn with_audio_selection(mut self, selector: FormatSelector) -> Self {
        self.audio_selection = Some(selector);
        self
    }

    pub fn with_video_selection(mut self, selector: FormatSelector) -> Self {
        self.video_selection = Some(selector);
        self
    }

    pub fn with_po_token(mut self, token: Vec<u8>) -> Self {
        self.po_token = Some(token);
        self
    }

    pub fn with_start_time_ms(mut self, start_time_ms: i64) -> Self {
        self.start_time_ms = start_time_ms;
        self
    }

    pub fn with_http_retries(mut self, retries: u32) -> Self {
        self.http_retries = retries;
        self
    }

    pub fn with_host_fallback_threshold(mut self, threshold: u32) -> Self {
        self.host_fallback_threshold = threshold;
        self
    }

    pub fn with_live_end_wait_sec(mut self, sec: u64) -> Self {
        self.live_end_wait_sec = sec;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_continue_download(mut self, continue_download: bool) -> Self {
        self.continue_download = continue_download;
        self
    }

    /// Caps response bandwidth in bytes/second. Zero (the default) means no limit.
    pub fn with_rate_limit(mut self, bps: u64) -> Self {
        self.rate_limit_bps = bps;
        self
    }

    /// Seeds resumed progress for the audio (`selector_index = 0`) or video (`1`) track, read
    /// back from a [`crate::sabr::writer::FormatWriter`]'s progress document before the session
    /// is constructed. Applied the moment that track's `FORMAT_INITIALIZATION_METADATA` arrives.
    pub fn with_resume_state(mut self, selector_index: usize, buffered_ranges: Vec<BufferedRange>, has_init_segment: bool) -> Self {
        self.resume_state[selector_index] = Some((buffered_ranges, has_init_segment));
        self
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.audio_selection.is_none() && self.video_selection.is_none() {
            return Err(crate::error::SabrError::Stream(
                "at least one of audio_selection or video_selection is required".to_string(),
            ));
        }
        Ok(())
    }
}
