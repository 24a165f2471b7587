//! A Rust client library for the SABR (Server-driven Adaptive Bit Rate) streaming protocol, as
//! used by YouTube to serve audio and video segments outside of the classical DASH/HLS manifest
//! model.
//!
//! Under SABR, the server rather than the client drives format selection and pacing: the client
//! posts a `VideoPlaybackAbrRequest` describing its playback position and the formats it is
//! willing to accept, and the server streams back a sequence of binary parts — framed in UMP, a
//! small custom envelope distinct from the protobuf messages it carries — that interleave format
//! metadata, media bytes, and control messages (redirects, server-initiated seeks, PO token
//! attestation status, live-stream metadata).
//!
//! This library does not discover the SABR URL, the `video_playback_ustreamer_config` blob or a
//! PO token on its own: those come from an external player-response extractor. Given them, it
//! drives the request/response loop and exposes it as a lazy sequence of [`sabr::Event`]s.
//!
//! ## Modules
//!
//! - [`sabr`] — the session engine: request building, response dispatch, host fallback, and
//!   (behind the `fetch` feature) the HTTP transport and on-disk progress store.
//! - [`proto`] — hand-rolled protobuf encoding/decoding for the wire messages exchanged with the
//!   server, plus this crate's own progress-document schema.
//! - [`ump`] — the outer UMP part framing.
//! - [`error`] — the crate's error type.
//!
//! ## Features supported
//!
//! - VOD and live SABR sessions
//! - Resuming an interrupted download from its on-disk progress document
//! - Server-initiated seeks and player-response refreshes
//! - GVS (Google Video Server) host fallback on transient HTTP failures
//! - PO token attestation status reporting
//!
//! ## Limitations / unsupported features
//!
//! - Discovering the SABR URL, ustreamer config or PO token (left to the caller)
//! - Muxing audio and video into a single container
//! - DRM / encrypted content

#![allow(non_snake_case)]

pub mod error;
pub mod proto;
pub mod sabr;
pub mod ump;

pub use error::{Result, SabrError};
pub use proto::{BufferedRange, ClientInfo, FormatId};
pub use sabr::{Event, FormatSelector, PoTokenStatusKind, RefreshReason, SabrSessionConfig, SeekReason};

#[cfg(feature = "fetch")]
pub use sabr::{FormatWriter, SabrSession};
