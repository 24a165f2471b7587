//! Shared fixtures for the integration tests: UMP part framing and an `axum` mock SABR server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes as AxumBytes;
use axum::extract::State;
use axum::routing::post;
use axum::Router;
use sabr_stream::proto::wire::{put_bytes_field, put_i32_field, put_i64_field, put_message_field, put_string_field};

pub fn encode_ump_varint(buf: &mut Vec<u8>, value: u32) {
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

/// Wraps `payload` in one UMP part of the given tag.
pub fn ump_part(tag: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_ump_varint(&mut out, tag);
    encode_ump_varint(&mut out, payload.len() as u32);
    out.extend_from_slice(payload);
    out
}

/// Concatenates already-framed parts into one response body.
pub fn ump_stream(parts: &[Vec<u8>]) -> Vec<u8> {
    parts.concat()
}

pub fn format_id_bytes(itag: i32) -> Vec<u8> {
    let mut buf = Vec::new();
    put_i32_field(&mut buf, 1, itag);
    buf
}

pub fn format_init_metadata(itag: i32, mime: &str, total_segments: i32, duration: i32, timescale: i32) -> Vec<u8> {
    let mut buf = Vec::new();
    put_message_field(&mut buf, 2, &format_id_bytes(itag));
    put_i32_field(&mut buf, 4, total_segments);
    put_string_field(&mut buf, 5, mime);
    put_i32_field(&mut buf, 9, duration);
    put_i32_field(&mut buf, 10, timescale);
    buf
}

#[allow(clippy::too_many_arguments)]
pub fn media_header(
    header_id: u32,
    itag: i32,
    is_init_segment: bool,
    sequence_number: Option<i64>,
    start_ms: i32,
    duration_ms: i32,
    content_length: i64,
) -> Vec<u8> {
    let mut buf = Vec::new();
    put_i32_field(&mut buf, 1, header_id as i32);
    put_i32_field(&mut buf, 8, is_init_segment as i32);
    if let Some(seq) = sequence_number {
        put_i64_field(&mut buf, 9, seq);
    }
    put_i32_field(&mut buf, 11, start_ms);
    put_i32_field(&mut buf, 12, duration_ms);
    put_message_field(&mut buf, 13, &format_id_bytes(itag));
    put_i64_field(&mut buf, 14, content_length);
    buf
}

pub fn media_payload(header_id: u32, data: &[u8]) -> Vec<u8> {
    let mut buf = vec![header_id as u8];
    buf.extend_from_slice(data);
    buf
}

pub fn media_end(header_id: u32) -> Vec<u8> {
    vec![header_id as u8]
}

pub fn next_request_policy(backoff_time_ms: i32) -> Vec<u8> {
    let mut buf = Vec::new();
    put_i32_field(&mut buf, 4, backoff_time_ms);
    buf
}

pub fn sabr_seek(seek_time_ticks: i32, timescale: i32) -> Vec<u8> {
    let mut buf = Vec::new();
    put_i32_field(&mut buf, 1, seek_time_ticks);
    put_i32_field(&mut buf, 2, timescale);
    buf
}

pub fn stream_protection_status(status: i32, max_retries: i32) -> Vec<u8> {
    let mut buf = Vec::new();
    put_i32_field(&mut buf, 1, status);
    put_i32_field(&mut buf, 2, max_retries);
    buf
}

pub fn live_metadata(head_sequence_number: i32, head_sequence_time_ms: i64) -> Vec<u8> {
    let mut buf = Vec::new();
    put_i32_field(&mut buf, 3, head_sequence_number);
    put_i64_field(&mut buf, 4, head_sequence_time_ms);
    buf
}

pub fn sabr_redirect(url: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    put_string_field(&mut buf, 1, url);
    buf
}

#[allow(dead_code)]
pub fn po_token_bytes() -> Vec<u8> {
    let mut buf = Vec::new();
    put_bytes_field(&mut buf, 1, b"a-po-token");
    buf
}

/// Part type tags (see `ump::PartType`'s numeric mapping).
pub mod tag {
    pub const FORMAT_INITIALIZATION_METADATA: u32 = 59;
    pub const MEDIA_HEADER: u32 = 20;
    pub const MEDIA: u32 = 21;
    pub const MEDIA_END: u32 = 22;
    pub const NEXT_REQUEST_POLICY: u32 = 61;
    pub const SABR_SEEK: u32 = 41;
    pub const STREAM_PROTECTION_STATUS: u32 = 60;
    pub const LIVE_METADATA: u32 = 31;
    pub const SABR_REDIRECT: u32 = 39;
}

/// A mock SABR server that serves a fixed sequence of UMP response bodies, one per POST, and
/// repeats the last one once the sequence is exhausted. Returns the bound address.
pub async fn spawn_mock_server(responses: Vec<Vec<u8>>) -> SocketAddr {
    spawn_mock_server_with_status(responses, 200).await
}

/// Like [`spawn_mock_server`], but every request before the scripted responses run out returns
/// `status` instead of 200 for the first `fail_count` requests.
pub async fn spawn_mock_server_with_status(responses: Vec<Vec<u8>>, status: u16) -> SocketAddr {
    #[derive(Clone)]
    struct ServerState {
        responses: Arc<Mutex<Vec<Vec<u8>>>>,
        status: u16,
    }

    async fn handler(State(state): State<ServerState>, _body: AxumBytes) -> (axum::http::StatusCode, Vec<u8>) {
        let mut responses = state.responses.lock().unwrap();
        if responses.is_empty() {
            return (axum::http::StatusCode::from_u16(state.status).unwrap(), Vec::new());
        }
        let body = if responses.len() == 1 { responses[0].clone() } else { responses.remove(0) };
        (axum::http::StatusCode::OK, body)
    }

    let state = ServerState { responses: Arc::new(Mutex::new(responses)), status };
    let app = Router::new().route("/videoplayback", post(handler)).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("binding mock server");
    let addr = listener.local_addr().expect("reading mock server address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serving mock server");
    });
    addr
}

pub fn mock_url(addr: SocketAddr, extra_query: &str) -> String {
    format!("http://{addr}/videoplayback?expire=99999999999&{extra_query}")
}
