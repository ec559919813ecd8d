//! HTTP fetch engine: per-domain client sessions, rate-limited requests,
//! and a bounded retry loop with explicit per-attempt outcomes.

use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::backoff::ExponentialBackoff;
use crate::config::SpiderConfig;
use crate::rate_limiter::DomainRateLimiter;
use crate::url_utils;

/// Response bodies are truncated past this point.
const MAX_CONTENT_BYTES: usize = 50 * 1024 * 1024;

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

/// Everything the crawl engine needs from a completed fetch.
#[derive(Debug, Clone)]
pub struct HttpFetchResult {
    pub url: String,
    pub final_url: String,
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
    pub content_type: String,
    pub elapsed_time: f64,
}

impl HttpFetchResult {
    pub fn is_html(&self) -> bool {
        url_utils::is_html_content_type(&self.content_type)
    }

    pub fn is_binary(&self) -> bool {
        url_utils::is_binary_content_type(&self.content_type)
    }

    pub fn size_mb(&self) -> f64 {
        self.body.len() as f64 / (1024.0 * 1024.0)
    }
}

/// What a single attempt decided; the retry loop acts on this, not on
/// exceptions threaded through the call stack.
enum AttemptOutcome {
    Success(Box<HttpFetchResult>),
    Retry { delay: Duration, reason: String },
    Terminal { reason: String },
    TransportError { delay: Duration, error: String },
}

#[derive(Debug, Default)]
pub struct HttpStats {
    pub requests_made: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub retries_performed: AtomicU64,
    pub rate_limited_requests: AtomicU64,
    pub total_bytes_downloaded: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HttpStatsSnapshot {
    pub requests_made: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retries_performed: u64,
    pub rate_limited_requests: u64,
    pub total_bytes_downloaded: u64,
    pub success_rate: f64,
    pub total_mb_downloaded: f64,
}

/// Fetches pages through one session per domain, never exceeding the
/// domain's token-bucket rate, retrying transient failures with backoff.
pub struct HttpClient {
    user_agent: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_retries: u32,
    backoff: ExponentialBackoff,
    rate_limiter: DomainRateLimiter,
    sessions: DashMap<String, reqwest::Client>,
    stats: HttpStats,
}

impl HttpClient {
    pub fn new(config: &SpiderConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            connect_timeout: Duration::from_secs_f64(config.timeout_connect_secs),
            read_timeout: Duration::from_secs_f64(config.timeout_read_secs),
            max_retries: config.max_retries,
            backoff: ExponentialBackoff::standard(),
            rate_limiter: DomainRateLimiter::new(
                config.requests_per_second,
                config.burst_capacity,
            ),
            sessions: DashMap::new(),
            stats: HttpStats::default(),
        }
    }

    pub fn rate_limiter(&self) -> &DomainRateLimiter {
        &self.rate_limiter
    }

    /// Fetch a page. `custom_delay` (a robots crawl-delay) replaces the
    /// token-bucket wait for this request.
    ///
    /// `Ok(Some)` is a successful fetch. `Ok(None)` means the URL yielded
    /// nothing crawlable: terminal client error, or retryable statuses past
    /// the attempt budget. `Err` means transport failures exhausted the
    /// attempt budget.
    pub async fn fetch(
        &self,
        url: &str,
        custom_delay: Option<Duration>,
    ) -> Result<Option<HttpFetchResult>, FetchError> {
        let Some(domain) = url_utils::extract_domain(url) else {
            tracing::warn!(url, "cannot fetch URL without a domain");
            self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        self.rate_limiter.wait_if_needed(&domain, custom_delay).await;

        let attempts = self.max_retries + 1;
        let mut last_transport_error: Option<String> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                self.stats.retries_performed.fetch_add(1, Ordering::Relaxed);
            }

            match self.attempt(url, &domain, attempt).await {
                AttemptOutcome::Success(result) => {
                    self.stats
                        .successful_requests
                        .fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .total_bytes_downloaded
                        .fetch_add(result.body.len() as u64, Ordering::Relaxed);
                    return Ok(Some(*result));
                }
                AttemptOutcome::Terminal { reason } => {
                    tracing::warn!(url, reason, "fetch abandoned");
                    self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
                // A transport error from an earlier attempt is remembered
                // across status-driven retries for the final error report.
                AttemptOutcome::Retry { delay, reason } => {
                    if attempt + 1 < attempts {
                        tracing::info!(
                            url,
                            attempt,
                            delay_secs = delay.as_secs_f64(),
                            reason,
                            "retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                AttemptOutcome::TransportError { delay, error } => {
                    last_transport_error = Some(error.clone());
                    if attempt + 1 < attempts {
                        tracing::info!(
                            url,
                            attempt,
                            delay_secs = delay.as_secs_f64(),
                            error,
                            "retrying after transport error"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);

        match last_transport_error {
            Some(last_error) => Err(FetchError::RetriesExhausted {
                url: url.to_string(),
                attempts,
                last_error,
            }),
            None => {
                tracing::warn!(url, attempts, "retryable statuses exhausted attempt budget");
                Ok(None)
            }
        }
    }

    async fn attempt(&self, url: &str, domain: &str, attempt: u32) -> AttemptOutcome {
        self.stats.requests_made.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let response = match self
            .session(domain)
            .get(url)
            .timeout(self.read_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return AttemptOutcome::TransportError {
                    delay: self.backoff.delay(attempt),
                    error: e.to_string(),
                };
            }
        };

        let status = response.status();

        match status {
            StatusCode::OK => match self.read_body(response, url, started).await {
                Ok(result) => AttemptOutcome::Success(Box::new(result)),
                Err(error) => AttemptOutcome::TransportError {
                    delay: self.backoff.delay(attempt),
                    error,
                },
            },
            StatusCode::TOO_MANY_REQUESTS => {
                self.stats
                    .rate_limited_requests
                    .fetch_add(1, Ordering::Relaxed);
                AttemptOutcome::Retry {
                    delay: retry_after_delay(response.headers()),
                    reason: "server rate limited (429)".to_string(),
                }
            }
            StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => AttemptOutcome::Retry {
                delay: self.backoff.delay(attempt),
                reason: format!("server error ({})", status.as_u16()),
            },
            s if s.is_client_error() => AttemptOutcome::Terminal {
                reason: format!("client error ({})", s.as_u16()),
            },
            s => AttemptOutcome::Retry {
                delay: self.backoff.delay(attempt),
                reason: format!("unexpected status ({})", s.as_u16()),
            },
        }
    }

    /// Stream the body, truncating past the size cap instead of failing.
    async fn read_body(
        &self,
        mut response: reqwest::Response,
        url: &str,
        started: Instant,
    ) -> Result<HttpFetchResult, String> {
        let final_url = response.url().to_string();
        let status_code = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let content_type = headers
            .get("content-type")
            .cloned()
            .unwrap_or_default();

        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if body.len() + chunk.len() > MAX_CONTENT_BYTES {
                        body.extend_from_slice(&chunk[..MAX_CONTENT_BYTES - body.len()]);
                        tracing::warn!(url, limit = MAX_CONTENT_BYTES, "body truncated");
                        break;
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => return Err(e.to_string()),
            }
        }

        Ok(HttpFetchResult {
            url: url.to_string(),
            final_url,
            status_code,
            body: String::from_utf8_lossy(&body).into_owned(),
            headers,
            content_type,
            elapsed_time: started.elapsed().as_secs_f64(),
        })
    }

    /// One session per domain so connection pools and cookies never leak
    /// across crawl targets.
    fn session(&self, domain: &str) -> reqwest::Client {
        self.sessions
            .entry(domain.to_string())
            .or_insert_with(|| {
                let mut headers = HeaderMap::new();
                headers.insert(
                    ACCEPT,
                    HeaderValue::from_static(
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    ),
                );
                headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

                reqwest::Client::builder()
                    .user_agent(&self.user_agent)
                    .default_headers(headers)
                    .connect_timeout(self.connect_timeout)
                    .gzip(true)
                    .build()
                    .unwrap_or_default()
            })
            .clone()
    }

    pub fn stats_snapshot(&self) -> HttpStatsSnapshot {
        let made = self.stats.requests_made.load(Ordering::Relaxed);
        let ok = self.stats.successful_requests.load(Ordering::Relaxed);
        let bytes = self.stats.total_bytes_downloaded.load(Ordering::Relaxed);
        HttpStatsSnapshot {
            requests_made: made,
            successful_requests: ok,
            failed_requests: self.stats.failed_requests.load(Ordering::Relaxed),
            retries_performed: self.stats.retries_performed.load(Ordering::Relaxed),
            rate_limited_requests: self.stats.rate_limited_requests.load(Ordering::Relaxed),
            total_bytes_downloaded: bytes,
            success_rate: if made > 0 { ok as f64 / made as f64 } else { 0.0 },
            total_mb_downloaded: bytes as f64 / (1024.0 * 1024.0),
        }
    }
}

/// 429 wait: honor Retry-After when present, defaulting to a minute and
/// refusing to wait more than five.
fn retry_after_delay(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
        .min(MAX_RETRY_AFTER)
}
