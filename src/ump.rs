//! UMP framing: the outer envelope every SABR HTTP response body is wrapped in.
//!
//! A UMP stream is a flat sequence of parts, each `{part_type varint}{size varint}{payload}`.
//! The two varints share a custom, non-protobuf variable-length encoding (see
//! [`read_ump_varint`]) that packs the continuation bits into the *high* bits of the first
//! byte instead of LEB128's low-bit convention, so it needs its own reader distinct from
//! [`crate::proto::wire`].
//!
//! Parsing here works over an already-buffered response body (`Bytes`) rather than true
//! streaming I/O: chunked transfer isn't needed because a single SABR poll response is bounded
//! by the requested `playback_cookie`/readahead window, never unboundedly large.

use bytes::Bytes;

use crate::error::{Result, SabrError};

/// The known UMP part type tags. Values follow the numbering used by the wider SABR
/// reverse-engineering community; any tag this crate doesn't recognize decodes to
/// [`PartType::Unknown`] rather than failing the parse, since new part types are added to the
/// wire protocol more often than clients are updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartType {
    OnesieHeader,
    OnesieData,
    MediaHeader,
    Media,
    MediaEnd,
    LiveMetadata,
    HostnameChangeHint,
    LiveMetadataPromise,
    LiveMetadataPromiseCancellation,
    SabrRedirect,
    SabrError,
    SabrSeek,
    ReloadPlayerResponse,
    PlaybackStartPolicy,
    AllowedCachedFormats,
    StartBwSamplingHint,
    PauseBwSamplingHint,
    SelectableFormats,
    RequestIdentifier,
    RequestCancellationPolicy,
    OnesiePrefetchRejection,
    TimelineContext,
    RequestLatencyContext,
    SabrContextUpdate,
    SabrContextSendingPolicy,
    FormatInitializationMetadata,
    StreamProtectionStatus,
    NextRequestPolicy,
    PrewarmConnection,
    PlaybackDebugInfo,
    SnackbarMessage,
    Unknown(u32),
}

impl From<u32> for PartType {
    fn from(tag: u32) -> Self {
        match tag {
            10 => PartType::OnesieHeader,
            11 => PartType::OnesieData,
            20 => PartType::MediaHeader,
            21 => PartType::Media,
            22 => PartType::MediaEnd,
            31 => PartType::LiveMetadata,
            33 => PartType::HostnameChangeHint,
            35 => PartType::LiveMetadataPromise,
            36 => PartType::LiveMetadataPromiseCancellation,
            39 => PartType::SabrRedirect,
            40 => PartType::SabrError,
            41 => PartType::SabrSeek,
            43 => PartType::ReloadPlayerResponse,
            45 => PartType::PlaybackStartPolicy,
            46 => PartType::AllowedCachedFormats,
            47 => PartType::StartBwSamplingHint,
            48 => PartType::PauseBwSamplingHint,
            49 => PartType::SelectableFormats,
            50 => PartType::RequestIdentifier,
            51 => PartType::RequestCancellationPolicy,
            52 => PartType::OnesiePrefetchRejection,
            53 => PartType::TimelineContext,
            54 => PartType::RequestLatencyContext,
            57 => PartType::SabrContextUpdate,
            58 => PartType::SabrContextSendingPolicy,
            59 => PartType::FormatInitializationMetadata,
            60 => PartType::StreamProtectionStatus,
            61 => PartType::NextRequestPolicy,
            64 => PartType::PrewarmConnection,
            65 => PartType::PlaybackDebugInfo,
            66 => PartType::SnackbarMessage,
            other => PartType::Unknown(other),
        }
    }
}

/// One decoded UMP part: its type tag and the raw payload bytes (still protobuf-encoded).
#[derive(Debug, Clone)]
pub struct Part {
    pub part_type: PartType,
    pub data: Bytes,
}

/// Decodes one UMP varint starting at `data[pos]`. Returns the value and the number of bytes
/// consumed (1 to 5). Unlike protobuf's LEB128, continuation is signalled by how many of the
/// high bits of the first byte are set, and a 5-byte varint ignores the first byte's low bits
/// entirely in favour of a little-endian `u32` read from the next four bytes.
pub fn read_ump_varint(data: &[u8], pos: usize) -> Result<(u32, usize)> {
    let first = *data
        .get(pos)
        .ok_or_else(|| SabrError::Protocol("truncated UMP varint".to_string()))?;
    let need = if first < 128 {
        1
    } else if first < 192 {
        2
    } else if first < 224 {
        3
    } else if first < 240 {
        4
    } else {
        5
    };
    if pos + need > data.len() {
        return Err(SabrError::Protocol("truncated UMP varint".to_string()));
    }
    let value = match need {
        1 => first as u32,
        2 => (first as u32 & 0x3f) | ((data[pos + 1] as u32) << 6),
        3 => {
            (first as u32 & 0x1f) | ((data[pos + 1] as u32) << 5) | ((data[pos + 2] as u32) << 13)
        }
        4 => {
            (first as u32 & 0x0f)
                | ((data[pos + 1] as u32) << 4)
                | ((data[pos + 2] as u32) << 12)
                | ((data[pos + 3] as u32) << 20)
        }
        _ => u32::from_le_bytes([data[pos + 1], data[pos + 2], data[pos + 3], data[pos + 4]]),
    };
    Ok((value, need))
}

/// Parses every part out of a fully-buffered UMP stream body.
///
/// Returns an error on truncation (a part's declared size runs past the end of `data`);
/// callers treat that the same as any other malformed-response condition.
pub fn iter_parts(data: &Bytes) -> Result<Vec<Part>> {
    let mut parts = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        let (tag, tag_len) = read_ump_varint(data, pos)?;
        pos += tag_len;
        let (size, size_len) = read_ump_varint(data, pos)?;
        pos += size_len;
        let size = size as usize;
        if pos + size > data.len() {
            return Err(SabrError::Protocol(format!(
                "UMP part of size {size} at offset {pos} runs past end of buffer ({})",
                data.len()
            )));
        }
        let payload = data.slice(pos..pos + size);
        pos += size;
        parts.push(Part { part_type: PartType::from(tag), data: payload });
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_ump_varint(buf: &mut Vec<u8>, value: u32) {
        if value < 128 {
            buf.push(value as u8);
        } else if value < (1 << 14) {
            buf.push(0x80 | (value & 0x3f) as u8);
            buf.push((value >> 6) as u8);
        } else {
            buf.push(0xf0);
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    #[test]
    fn one_byte_varint_round_trips() {
        let data = [42u8];
        let (value, consumed) = read_ump_varint(&data, 0).unwrap();
        assert_eq!(value, 42);
        assert_eq!(consumed, 1);
    }

    #[test]
    fn five_byte_varint_reads_little_endian_u32() {
        let mut data = vec![0xf0];
        data.extend_from_slice(&1_234_567u32.to_le_bytes());
        let (value, consumed) = read_ump_varint(&data, 0).unwrap();
        assert_eq!(value, 1_234_567);
        assert_eq!(consumed, 5);
    }

    #[test]
    fn iter_parts_splits_a_two_part_stream() {
        let mut buf = Vec::new();
        encode_ump_varint(&mut buf, 20); // MEDIA_HEADER
        encode_ump_varint(&mut buf, 3);
        buf.extend_from_slice(b"abc");
        encode_ump_varint(&mut buf, 21); // MEDIA
        encode_ump_varint(&mut buf, 2);
        buf.extend_from_slice(b"xy");

        let parts = iter_parts(&Bytes::from(buf)).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].part_type, PartType::MediaHeader);
        assert_eq!(&parts[0].data[..], b"abc");
        assert_eq!(parts[1].part_type, PartType::Media);
        assert_eq!(&parts[1].data[..], b"xy");
    }

    #[test]
    fn truncated_part_is_an_error() {
        let mut buf = Vec::new();
        encode_ump_varint(&mut buf, 20);
        encode_ump_varint(&mut buf, 100);
        buf.extend_from_slice(b"short");
        assert!(iter_parts(&Bytes::from(buf)).is_err());
    }
}
