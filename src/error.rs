//! Crate-wide error type.
//!
//! Carries an `Io` variant with context and an `Other` catch-all, in the same shape used at
//! call sites elsewhere in this crate, rather than a generic `anyhow` error, so that callers
//! driving the session loop can match on the kind of failure.

use std::io;

/// Errors that can terminate a SABR session or a progress-store operation.
///
/// Transient transport failures (network errors, HTTP 5xx) are retried inside
/// [`crate::sabr::transport`] and never reach the caller as a `SabrError` unless every retry
/// and host-fallback candidate is exhausted.
#[derive(thiserror::Error, Debug)]
pub enum SabrError {
    /// A malformed or out-of-sequence part from the server that the engine cannot recover
    /// from.
    #[error("SABR protocol violation: {0}")]
    Protocol(String),

    /// A caller-misuse or policy violation: bad configuration, a server-side format switch,
    /// an exhausted attestation retry budget.
    #[error("SABR stream error: {0}")]
    Stream(String),

    /// The session has already been consumed (closed, or ran to completion) and
    /// `next_event` was called again.
    #[error("SABR stream has already been consumed")]
    Consumed,

    /// Every HTTP retry and every GVS host-fallback candidate was exhausted.
    #[error("unable to find a working Google Video Server host")]
    HostsExhausted,

    /// A non-retriable HTTP status was returned by the server.
    #[error("HTTP error {status}: {reason}")]
    Http { status: u16, reason: String },

    #[error("{1}: {0}")]
    Io(#[source] io::Error, String),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[cfg(feature = "fetch")]
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SabrError>;
