//! HTTP transport wrapper: the SABR URL, per-request retries, and GVS host fallback.

use std::collections::HashSet;
#[cfg(feature = "fetch")]
use std::num::NonZeroU32;

use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, SabrError};

#[cfg(feature = "fetch")]
type DirectRateLimiter = governor::RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
    governor::middleware::NoOpMiddleware,
>;

/// The mutable SABR URL, plus the bookkeeping host fallback needs.
///
/// Rewritten in place by a successful `SABR_REDIRECT`, by [`SabrUrl::fall_back`], or by the
/// caller in response to a `RefreshPlayerResponse` event.
#[derive(Debug, Clone)]
pub struct SabrUrl {
    url: Url,
}

impl SabrUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(SabrUrl { url: Url::parse(raw)? })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn set(&mut self, raw: &str) -> Result<()> {
        self.url = Url::parse(raw)?;
        Ok(())
    }

    fn query_param(&self, name: &str) -> Option<String> {
        self.url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
    }

    /// True iff the URL's `source` query parameter marks a live broadcast.
    pub fn is_live(&self) -> bool {
        self.query_param("source").as_deref() == Some("yt_live_broadcast")
    }

    /// True iff `expire` (epoch seconds) is within `within_secs` of `now`.
    pub fn expires_within(&self, now_epoch_secs: i64, within_secs: i64) -> bool {
        match self.query_param("expire").and_then(|v| v.parse::<i64>().ok()) {
            Some(expire) => expire - now_epoch_secs <= within_secs,
            None => false,
        }
    }

    /// Sets the `rn` (request number) query parameter, replacing any existing value.
    pub fn with_request_number(&self, rn: u64) -> Url {
        set_query_param(&self.url, "rn", &rn.to_string())
    }

    fn fallback_count(&self) -> u32 {
        self.query_param("fallback_count").and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    fn mvi(&self) -> Option<i32> {
        self.query_param("mvi").and_then(|v| v.parse().ok())
    }

    fn mn(&self) -> Vec<String> {
        self.query_param("mn")
            .map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn fvip(&self) -> i32 {
        self.query_param("fvip").and_then(|v| v.parse().ok()).unwrap_or(1)
    }

    /// Attempts a GVS host fallback (spec §4.4). Returns `false` and leaves the URL unchanged
    /// if no alternative host remains.
    pub fn fall_back(&mut self) -> bool {
        let current_host = match self.url.host_str() {
            Some(h) => h.to_string(),
            None => return false,
        };
        let candidates = candidate_hosts(&current_host, &self.mn(), self.fvip());
        let fallback_count = self.fallback_count();
        let next = match next_host(&candidates, &current_host, fallback_count) {
            Some(h) => h,
            None => return false,
        };
        let mut new_url = self.url.clone();
        if new_url.set_host(Some(&next)).is_err() {
            return false;
        }
        let new_url = set_query_param(&new_url, "fallback_count", &(fallback_count + 1).to_string());
        debug!(from = %current_host, to = %next, "falling back to alternate GVS host");
        self.url = new_url;
        true
    }
}

fn set_query_param(url: &Url, name: &str, value: &str) -> Url {
    let mut out = url.clone();
    let mut pairs: Vec<(String, String)> = out
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.push((name.to_string(), value.to_string()));
    out.query_pairs_mut().clear();
    for (k, v) in &pairs {
        out.query_pairs_mut().append_pair(k, v);
    }
    out
}

/// Builds the deduplicated candidate host list described in spec §4.4: the current host first,
/// then `rr{fvip}---{mn_entry}.googlevideo.com` for each `mn` entry in reverse order and each
/// `fvip` candidate in `{fvip, 1, 2, 3, 4, 5}` (also deduplicated).
fn candidate_hosts(current_host: &str, mn: &[String], fvip: i32) -> Vec<String> {
    let mut fvips = vec![fvip, 1, 2, 3, 4, 5];
    let mut seen_fvip = HashSet::new();
    fvips.retain(|v| seen_fvip.insert(*v));

    let mut candidates = vec![current_host.to_string()];
    for mn_entry in mn.iter().rev() {
        for fv in &fvips {
            candidates.push(format!("rr{fv}---{mn_entry}.googlevideo.com"));
        }
    }

    let mut seen = HashSet::new();
    candidates.retain(|h| seen.insert(h.clone()));
    candidates
}

/// Picks the next host to try, given the candidate list and the currently-used host.
fn next_host(candidates: &[String], current_host: &str, fallback_count: u32) -> Option<String> {
    let start_idx: i64 = if fallback_count == 0 {
        -1
    } else {
        candidates.iter().position(|h| h == current_host)? as i64
    };
    let mut idx = start_idx + 1;
    if candidates.get(idx as usize).map(|h| h == current_host).unwrap_or(false) {
        idx += 1;
    }
    candidates.get(idx as usize).cloned()
}

/// Issues one POST with retry-on-transient-failure and GVS host fallback once the retry budget
/// for the current host is exhausted.
#[cfg(feature = "fetch")]
pub struct SabrTransport {
    client: reqwest::Client,
    pub url: SabrUrl,
    http_retries: u32,
    host_fallback_threshold: u32,
    bw_limiter: Option<DirectRateLimiter>,
}

#[cfg(feature = "fetch")]
impl SabrTransport {
    pub fn new(client: reqwest::Client, url: SabrUrl, http_retries: u32, host_fallback_threshold: u32) -> Self {
        SabrTransport { client, url, http_retries, host_fallback_threshold, bw_limiter: None }
    }

    /// Caps response bandwidth at `bps` bytes/second. Cells are counted in kB to keep the quota
    /// within `governor`'s `u32` rate, with a burst allowance generous enough for one segment.
    pub fn with_rate_limit(mut self, bps: u64) -> Self {
        if bps == 0 {
            self.bw_limiter = None;
            return self;
        }
        let kps = u32::try_from(1 + bps / 1024).unwrap_or(u32::MAX);
        let quota = governor::Quota::per_second(NonZeroU32::new(kps).unwrap())
            .allow_burst(NonZeroU32::new(10 * 1024).unwrap());
        self.bw_limiter = Some(governor::RateLimiter::direct(quota));
        self
    }

    async fn throttle(&self, response_len: usize) {
        let Some(limiter) = &self.bw_limiter else { return };
        let kcells = NonZeroU32::new(1 + (response_len as u32) / 1024).unwrap_or(NonZeroU32::new(1).unwrap());
        // Burst size covers one segment's worth of cells; a response larger than the burst
        // allowance just waits out each burst-sized slice in turn.
        let _ = limiter.until_n_ready(kcells).await;
    }

    /// POSTs `body` with `rn=request_number`, retrying transient failures and falling back to
    /// an alternate GVS host once the per-host retry budget is spent.
    pub async fn post(&mut self, body: Vec<u8>, request_number: u64) -> Result<bytes::Bytes> {
        let mut attempt = 0u32;
        use backon::BackoffBuilder;
        let mut backoff = backon::ExponentialBuilder::default()
            .with_min_delay(std::time::Duration::from_millis(200))
            .with_max_delay(std::time::Duration::from_secs(10))
            .build();

        loop {
            let target = self.url.with_request_number(request_number);
            let response = self
                .client
                .post(target)
                .header("content-type", "application/x-protobuf")
                .body(body.clone())
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let bytes = resp.bytes().await.map_err(SabrError::from)?;
                    self.throttle(bytes.len()).await;
                    return Ok(bytes);
                }
                Ok(resp) if resp.status().is_server_error() => {
                    warn!(status = %resp.status(), attempt, "transient HTTP error from SABR server");
                }
                Ok(resp) => {
                    return Err(SabrError::Http {
                        status: resp.status().as_u16(),
                        reason: resp.status().canonical_reason().unwrap_or("unknown").to_string(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, attempt, "transport error contacting SABR server");
                }
            }

            attempt += 1;
            if attempt >= self.http_retries {
                return Err(SabrError::HostsExhausted);
            }
            if attempt >= self.host_fallback_threshold && !self.url.fall_back() {
                return Err(SabrError::HostsExhausted);
            }
            if let Some(delay) = backoff.next() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
