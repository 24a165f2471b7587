//! One handler per UMP part type (spec §4.5). Each mutates [`SessionState`] and/or appends to
//! its `pending_events`.

use tracing::{debug, trace, warn};

use crate::error::{Result, SabrError};
use crate::proto::{MediaHeader, SabrSeek, StreamProtectionStatus};
use crate::sabr::format::{InitializedFormat, Segment};
use crate::sabr::session::{Event, PoTokenStatusKind, SeekReason, SessionState};
use crate::ump::{Part, PartType};

/// Dispatches one decoded part to its handler. Returns `Some(redirect_url)` when a
/// `SABR_REDIRECT` part successfully rewrote the session URL, so the caller can apply it to
/// the transport (which owns the URL, not the state).
pub fn dispatch(state: &mut SessionState, part: Part) -> Result<Option<String>> {
    match part.part_type {
        PartType::MediaHeader => {
            handle_media_header(state, &part.data)?;
            Ok(None)
        }
        PartType::Media => {
            handle_media(state, &part.data);
            Ok(None)
        }
        PartType::MediaEnd => {
            handle_media_end(state, &part.data)?;
            Ok(None)
        }
        PartType::FormatInitializationMetadata => {
            handle_format_initialization_metadata(state, &part.data)?;
            Ok(None)
        }
        PartType::LiveMetadata => {
            handle_live_metadata(state, &part.data)?;
            Ok(None)
        }
        PartType::StreamProtectionStatus => {
            handle_stream_protection_status(state, &part.data)?;
            Ok(None)
        }
        PartType::SabrRedirect => handle_sabr_redirect(&part.data),
        PartType::NextRequestPolicy => {
            handle_next_request_policy(state, &part.data)?;
            Ok(None)
        }
        PartType::SabrSeek => {
            handle_sabr_seek(state, &part.data)?;
            Ok(None)
        }
        PartType::SabrError => Err(handle_sabr_error(&part.data)),
        PartType::Unknown(tag) => {
            debug!(tag, "ignoring unknown UMP part type");
            Ok(None)
        }
        other => {
            trace!(?other, "ignoring informational UMP part");
            Ok(None)
        }
    }
}

fn handle_media_header(state: &mut SessionState, data: &[u8]) -> Result<()> {
    let header = MediaHeader::decode(data)?;
    let header_id = header.header_id.ok_or_else(|| SabrError::Protocol("MEDIA_HEADER missing header_id".to_string()))? as u8;
    let format_id = header.format_id.ok_or_else(|| SabrError::Protocol("MEDIA_HEADER missing format_id".to_string()))?;

    if state.header_table.contains(header_id) {
        return Err(SabrError::Protocol(format!("duplicate header_id {header_id} in MEDIA_HEADER")));
    }
    if header.compression.is_some() {
        return Err(SabrError::Protocol("MEDIA_HEADER declares unsupported compression".to_string()));
    }

    let Some(fmt) = state.find_initialized(&format_id) else {
        debug!(format = %format_id, "MEDIA_HEADER for an uninitialized format, ignoring");
        return Ok(());
    };

    let is_init_segment = header.is_init_segment.unwrap_or(false);
    let sequence_number = if is_init_segment {
        None
    } else {
        Some(header.sequence_number.ok_or_else(|| {
            SabrError::Protocol("MEDIA_HEADER missing sequence_number for a non-init segment".to_string())
        })?)
    };

    let mut discard = fmt.discard;
    if let Some(seq) = sequence_number {
        if fmt.range_containing_segment(seq).is_some() {
            discard = true;
        }
        if let Some(current) = &fmt.current_segment {
            if let Some(current_seq) = current.sequence_number {
                if seq <= current_seq {
                    discard = true;
                } else if seq > current_seq + 1 {
                    return Err(SabrError::Protocol(format!(
                        "segment gap for format {format_id}: expected {}, got {seq}",
                        current_seq + 1
                    )));
                }
            }
        }
    } else if fmt.init_segment.is_some() {
        discard = true;
    }

    let start_ms = header.start_ms.map(i64::from).unwrap_or_else(|| header.time_range.as_ref().and_then(|t| t.get_start_ms()).unwrap_or(0));
    let (duration_ms, duration_estimated) = match header.duration_ms.map(i64::from) {
        Some(d) => (d, false),
        None => match header.time_range.as_ref().and_then(|t| t.get_duration_ms()) {
            Some(d) => (d, false),
            None if state.is_live => ((state.live_segment_target_duration_sec * 1000) as i64, true),
            None => (0, false),
        },
    };

    let segment = Segment {
        format_id,
        is_init_segment,
        sequence_number,
        start_ms,
        duration_ms,
        duration_estimated,
        content_length: header.content_length,
        start_data_range: header.start_data_range,
        discard,
        data: Vec::new(),
    };
    state.header_table.insert(header_id, segment);
    Ok(())
}

fn handle_media(state: &mut SessionState, data: &[u8]) {
    let Some((&header_id, payload)) = data.split_first() else { return };
    state.request_had_data = true;
    match state.header_table.get_mut(header_id) {
        Some(segment) => segment.data.extend_from_slice(payload),
        None => debug!(header_id, "MEDIA for an unknown header_id, ignoring"),
    }
}

fn handle_media_end(state: &mut SessionState, data: &[u8]) -> Result<()> {
    let Some((&header_id, _)) = data.split_first() else { return Ok(()) };
    let Some(segment) = state.header_table.remove(header_id) else {
        warn!(header_id, "MEDIA_END for an unknown header_id, ignoring");
        return Ok(());
    };

    if let Some(expected) = segment.content_length {
        if expected != segment.data.len() as i64 {
            return Err(SabrError::Protocol(format!(
                "content_length mismatch for format {}: expected {expected}, got {}",
                segment.format_id,
                segment.data.len()
            )));
        }
    }

    if segment.discard {
        return Ok(());
    }

    let format_id = segment.format_id.clone();
    let is_init_segment = segment.is_init_segment;
    let sequence_number = segment.sequence_number;
    let player_time_ms = state.player_time_ms;
    let data = segment.data.clone();
    let start_bytes = segment.start_data_range;
    let start_ms = segment.start_ms;
    let duration_ms = segment.duration_ms;

    let Some(fmt) = state.find_initialized_mut(&format_id) else {
        return Ok(());
    };
    let selector_index = fmt.selector_index;
    let total_sequences = fmt.total_sequences;

    if is_init_segment {
        fmt.init_segment = Some(segment);
    } else {
        extend_buffered_range(fmt, &segment)?;
        fmt.current_segment = Some(segment);
    }

    state.pending_events.push(Event::MediaSegment {
        selector_index,
        format_id,
        player_time_ms,
        fragment_index: sequence_number.unwrap_or(0),
        fragment_count: total_sequences,
        is_init_segment,
        start_bytes,
        start_ms,
        duration_ms,
        data,
    });
    Ok(())
}

/// Extends (or creates) the buffered range that `segment` belongs to (spec §4.5 MEDIA_END).
fn extend_buffered_range(fmt: &mut InitializedFormat, segment: &Segment) -> Result<()> {
    let seq = segment.sequence_number.expect("non-init segment always carries a sequence number");

    if fmt.range_containing_segment(seq).is_some() {
        return Ok(());
    }

    if let Some(idx) = fmt.range_ending_at(seq - 1) {
        let range = &mut fmt.buffered_ranges[idx];
        range.end_segment_index = seq as i32;
        if let Some(tr) = &mut range.time_range {
            if tr.timescale != Some(1000) {
                return Err(SabrError::Protocol(format!(
                    "buffered range timescale {:?} != 1000 for format {}",
                    tr.timescale, fmt.format_id
                )));
            }
            if segment.duration_estimated {
                tr.duration_ticks = Some((segment.start_ms - range.start_time_ms) + segment.duration_ms);
            } else if let Some(d) = tr.duration_ticks {
                tr.duration_ticks = Some(d + segment.duration_ms);
            }
        }
        range.duration_ms += segment.duration_ms;
        return Ok(());
    }

    fmt.buffered_ranges.push(crate::proto::BufferedRange {
        format_id: Some(fmt.format_id.clone()),
        start_time_ms: segment.start_ms,
        duration_ms: segment.duration_ms,
        start_segment_index: seq as i32,
        end_segment_index: seq as i32,
        time_range: Some(crate::proto::TimeRange {
            start_ticks: Some(segment.start_ms),
            duration_ticks: Some(segment.duration_ms),
            timescale: Some(1000),
        }),
    });
    Ok(())
}

fn handle_format_initialization_metadata(state: &mut SessionState, data: &[u8]) -> Result<()> {
    let meta = crate::proto::FormatInitializationMetadata::decode(data)?;
    let format_id = meta.format_id.ok_or_else(|| SabrError::Protocol("FORMAT_INITIALIZATION_METADATA missing format_id".to_string()))?;

    if state.find_initialized(&format_id).is_some() {
        debug!(format = %format_id, "format already initialized, ignoring");
        return Ok(());
    }

    let mime_type = meta.mime_type.clone().unwrap_or_default();
    let selector_index = state
        .match_selector(&format_id, &mime_type)
        .ok_or_else(|| SabrError::Stream(format!("format {format_id} ({mime_type}) matches no selector")))?;

    if state.initialized_formats.iter().any(|f| f.selector_index == selector_index) {
        return Err(SabrError::Stream(format!(
            "server switched formats mid-session for selector {selector_index}"
        )));
    }

    let duration_ms = match (meta.duration, meta.duration_timescale) {
        (Some(d), Some(scale)) if scale != 0 => ((d as f64 / scale as f64) * 1000.0).ceil() as i64,
        _ => 0,
    };

    let discard_media = state.selector(selector_index).discard_media();
    let mut fmt = InitializedFormat::new(format_id.clone(), mime_type, selector_index, discard_media);
    fmt.video_id = meta.video_id;
    fmt.end_time_ms = meta.end_time_ms.map(i64::from);
    fmt.total_sequences = meta.total_segments.map(i64::from);
    fmt.duration_ms = duration_ms;
    if discard_media {
        fmt.suppress_with_max_range();
    }

    state.total_duration_ms = state.total_duration_ms.max(fmt.end_time_ms.unwrap_or(0)).max(duration_ms);
    state.initialized_formats.push(fmt);

    if let Some((ranges, has_init)) = state.resume_state[selector_index].clone() {
        state.seed_from_progress(&format_id, ranges, has_init);
    }
    Ok(())
}

fn handle_live_metadata(state: &mut SessionState, data: &[u8]) -> Result<()> {
    let meta = crate::proto::LiveMetadata::decode(data)?;
    if let Some(head_time) = meta.head_sequence_time_ms {
        state.total_duration_ms = head_time;
    }
    if let Some(head_seq) = meta.head_sequence_number {
        for fmt in &mut state.initialized_formats {
            fmt.total_sequences = Some(head_seq as i64);
        }
    }
    state.live_metadata = Some(meta);
    state.is_live = true;
    Ok(())
}

fn handle_stream_protection_status(state: &mut SessionState, data: &[u8]) -> Result<()> {
    let sps = StreamProtectionStatus::decode(data)?;
    let status: crate::proto::ProtectionStatus = sps.status.into();
    if let Some(max) = sps.max_retries {
        state.sps_max_retries = max as u32;
    }
    let event = match status {
        crate::proto::ProtectionStatus::Ok => {
            if state.po_token_present {
                PoTokenStatusKind::Ok
            } else {
                PoTokenStatusKind::NotRequired
            }
        }
        crate::proto::ProtectionStatus::AttestationPending => {
            if state.po_token_present {
                PoTokenStatusKind::Pending
            } else {
                PoTokenStatusKind::PendingMissing
            }
        }
        crate::proto::ProtectionStatus::AttestationRequired | crate::proto::ProtectionStatus::Unknown(_) => {
            state.sps_retry_count += 1;
            if state.sps_retry_count > state.sps_max_retries {
                let token_state = if state.po_token_present { "Invalid" } else { "Missing" };
                return Err(SabrError::Stream(format!("Attestation Required ({token_state} PO Token)")));
            }
            state.is_retry = true;
            if state.po_token_present {
                PoTokenStatusKind::Invalid
            } else {
                PoTokenStatusKind::Missing
            }
        }
    };
    state.pending_events.push(Event::PoTokenStatus { status: event });
    Ok(())
}

fn handle_sabr_redirect(data: &[u8]) -> Result<Option<String>> {
    let redirect = crate::proto::SabrRedirect::decode(data)?;
    match redirect.redirect_url {
        Some(url) if !url.is_empty() => Ok(Some(url)),
        _ => {
            warn!("SABR_REDIRECT with an empty redirect_url");
            Ok(None)
        }
    }
}

fn handle_next_request_policy(state: &mut SessionState, data: &[u8]) -> Result<()> {
    let policy = crate::proto::NextRequestPolicy::decode(data)?;
    state.playback_cookie = policy.playback_cookie.clone().or(state.playback_cookie.take());
    state.next_request_policy = Some(policy);
    Ok(())
}

fn handle_sabr_seek(state: &mut SessionState, data: &[u8]) -> Result<()> {
    let seek = SabrSeek::decode(data)?;
    if seek.timescale == 0 {
        return Err(SabrError::Protocol("SABR_SEEK with zero timescale".to_string()));
    }
    let seek_to_ms = ((seek.seek_time_ticks as f64 / seek.timescale as f64) * 1000.0).ceil() as i64;
    state.player_time_ms = seek_to_ms;
    for fmt in &mut state.initialized_formats {
        fmt.current_segment = None;
        state.pending_events.push(Event::MediaSeek {
            reason: SeekReason::ServerSeek,
            format_id: fmt.format_id.clone(),
            selector_index: fmt.selector_index,
        });
    }
    Ok(())
}

fn handle_sabr_error(data: &[u8]) -> SabrError {
    match crate::proto::SabrError::decode(data) {
        Ok(err) => SabrError::Protocol(format!("SABR_ERROR: {:?}", err.error_type)),
        Err(_) => SabrError::Protocol("SABR_ERROR with undecodable payload".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::wire::put_message_field;
    use crate::proto::FormatId;
    use crate::sabr::config::SabrSessionConfig;
    use crate::sabr::format::FormatSelector;

    fn state_with_audio_selector() -> SessionState {
        let config = SabrSessionConfig::new("https://example.googlevideo.com/videoplayback?expire=1")
            .with_audio_selection(FormatSelector::Audio { ids: vec![FormatId { itag: Some(140), lmt: None, xtags: None }], discard_media: false });
        SessionState::new(&config)
    }

    fn encode_format_init_metadata(itag: i32, mime: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut fid_body = Vec::new();
        crate::proto::wire::put_i32_field(&mut fid_body, 1, itag);
        put_message_field(&mut buf, 2, &fid_body);
        crate::proto::wire::put_string_field(&mut buf, 5, mime);
        crate::proto::wire::put_i32_field(&mut buf, 9, 10);
        crate::proto::wire::put_i32_field(&mut buf, 10, 1);
        buf
    }

    #[test]
    fn format_initialization_metadata_matches_by_itag() {
        let mut state = state_with_audio_selector();
        let data = encode_format_init_metadata(140, "audio/mp4");
        handle_format_initialization_metadata(&mut state, &data).unwrap();
        assert_eq!(state.initialized_formats.len(), 1);
        assert_eq!(state.initialized_formats[0].selector_index, 0);
    }

    #[test]
    fn format_initialization_metadata_fails_when_no_selector_matches() {
        let mut state = state_with_audio_selector();
        let data = encode_format_init_metadata(137, "video/mp4");
        assert!(handle_format_initialization_metadata(&mut state, &data).is_err());
    }

    #[test]
    fn sabr_seek_clears_current_segment_and_emits_seek_events() {
        let mut state = state_with_audio_selector();
        let data = encode_format_init_metadata(140, "audio/mp4");
        handle_format_initialization_metadata(&mut state, &data).unwrap();
        state.initialized_formats[0].current_segment = Some(Segment {
            format_id: FormatId { itag: Some(140), lmt: None, xtags: None },
            is_init_segment: false,
            sequence_number: Some(10),
            start_ms: 10_000,
            duration_ms: 1000,
            duration_estimated: false,
            content_length: Some(3),
            start_data_range: None,
            discard: false,
            data: vec![1, 2, 3],
        });

        let mut seek_body = Vec::new();
        crate::proto::wire::put_i32_field(&mut seek_body, 1, 30_000);
        crate::proto::wire::put_i32_field(&mut seek_body, 2, 1000);
        handle_sabr_seek(&mut state, &seek_body).unwrap();

        assert_eq!(state.player_time_ms, 30_000);
        assert!(state.initialized_formats[0].current_segment.is_none());
        assert_eq!(state.pending_events.len(), 1);
    }

    #[test]
    fn live_metadata_marks_the_session_live_even_without_a_yt_live_broadcast_url() {
        let mut state = state_with_audio_selector();
        assert!(!state.is_live);

        let mut body = Vec::new();
        crate::proto::wire::put_i32_field(&mut body, 3, 100);
        crate::proto::wire::put_i64_field(&mut body, 4, 500_000);
        handle_live_metadata(&mut state, &body).unwrap();

        assert!(state.is_live);
        assert_eq!(state.total_duration_ms, 500_000);
    }
}
