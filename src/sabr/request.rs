//! Builds the binary `VideoPlaybackAbrRequest` posted on every poll.

use crate::proto::{ClientAbrState, FormatId, StreamerContext, VideoPlaybackAbrRequest};
use crate::sabr::config::SabrSessionConfig;
use crate::sabr::format::InitializedFormat;

/// Bitfield value for `ClientAbrState.enabled_track_types_bitfield` meaning "audio and video".
pub const TRACK_TYPES_AUDIO_VIDEO: i32 = 0;
/// Bitfield value meaning "audio only" (server should stop sending video media bytes).
pub const TRACK_TYPES_AUDIO_ONLY: i32 = 1;

/// Assembles the next `VideoPlaybackAbrRequest` from current session state.
///
/// `initialized` lists every format the session has seen `FORMAT_INITIALIZATION_METADATA` for;
/// their aggregated `buffered_ranges` and ids are what tell the server what's already been
/// delivered. `playback_cookie` is the opaque blob from the last `NEXT_REQUEST_POLICY`, echoed
/// back verbatim.
pub fn build_request(
    config: &SabrSessionConfig,
    player_time_ms: i64,
    initialized: &[InitializedFormat],
    playback_cookie: Option<&[u8]>,
) -> VideoPlaybackAbrRequest {
    let enabled_track_types_bitfield = if config.video_selection.is_some() {
        TRACK_TYPES_AUDIO_VIDEO
    } else {
        TRACK_TYPES_AUDIO_ONLY
    };

    let client_abr_state = ClientAbrState {
        player_time_ms,
        enabled_track_types_bitfield,
        ..Default::default()
    };

    let initialized_format_ids: Vec<FormatId> = initialized.iter().map(|f| f.format_id.clone()).collect();
    let buffered_ranges = initialized.iter().flat_map(|f| f.buffered_ranges.clone()).collect();

    let selected_audio_format_ids = match &config.audio_selection {
        Some(crate::sabr::format::FormatSelector::Audio { ids, .. }) => ids.clone(),
        _ => Vec::new(),
    };
    let selected_video_format_ids = match &config.video_selection {
        Some(crate::sabr::format::FormatSelector::Video { ids, .. }) => ids.clone(),
        _ => Vec::new(),
    };

    let streamer_context = StreamerContext {
        client_info: config.client_info.clone(),
        po_token: config.po_token.clone(),
        playback_cookie: playback_cookie.map(|c| c.to_vec()),
        ..Default::default()
    };

    VideoPlaybackAbrRequest {
        client_abr_state,
        initialized_format_ids,
        buffered_ranges,
        video_playback_ustreamer_config: config.video_playback_ustreamer_config.clone(),
        selected_audio_format_ids,
        selected_video_format_ids,
        streamer_context,
    }
}
