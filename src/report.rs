//! Crawl report: the JSON document produced at the end of every run,
//! whether the crawl finished, hit its page budget, or was interrupted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::config::SpiderConfig;
use crate::frontier::FrontierStatsSnapshot;
use crate::network::HttpStatsSnapshot;
use crate::safety::{SafetyAnalysis, SafetyStatsSnapshot};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report file: {0}")]
    Io(#[from] std::io::Error),
}

/// One successfully crawled page.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlRecord {
    pub url: String,
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_url: Option<String>,
    pub status_code: u16,
    pub content_type: String,
    pub content_size: usize,
    pub response_time: f64,
    pub links_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_analysis: Option<SafetyAnalysis>,
    pub crawled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub start_url: String,
    pub duration_seconds: f64,
    pub pages_crawled: usize,
    pub pages_skipped: usize,
    pub links_discovered: usize,
    pub errors_encountered: usize,
    pub total_content_size_mb: f64,
    pub pages_per_second: f64,
    pub avg_response_time: f64,
}

impl CrawlSummary {
    pub fn compute(
        start_url: &str,
        duration_seconds: f64,
        records: &BTreeMap<String, CrawlRecord>,
        pages_skipped: usize,
        links_discovered: usize,
        errors_encountered: usize,
    ) -> Self {
        let pages_crawled = records.len();
        let total_bytes: usize = records.values().map(|r| r.content_size).sum();
        let total_response_time: f64 = records.values().map(|r| r.response_time).sum();

        Self {
            start_url: start_url.to_string(),
            duration_seconds,
            pages_crawled,
            pages_skipped,
            links_discovered,
            errors_encountered,
            total_content_size_mb: total_bytes as f64 / (1024.0 * 1024.0),
            pages_per_second: if duration_seconds > 0.0 {
                pages_crawled as f64 / duration_seconds
            } else {
                0.0
            },
            avg_response_time: if pages_crawled > 0 {
                total_response_time / pages_crawled as f64
            } else {
                0.0
            },
        }
    }
}

/// The full report document. Records are keyed by URL in sorted order so
/// two runs over the same site diff cleanly.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub summary: CrawlSummary,
    pub configuration: SpiderConfig,
    pub crawl_results: BTreeMap<String, CrawlRecord>,
    // Page URL -> links extracted from that page.
    pub discovered_links: BTreeMap<String, Vec<String>>,
    pub queue_stats: FrontierStatsSnapshot,
    pub safety_stats: SafetyStatsSnapshot,
    pub http_stats: HttpStatsSnapshot,
    pub generated_at: DateTime<Utc>,
}

impl CrawlReport {
    pub fn to_json_pretty(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ReportError> {
        let json = self.to_json_pretty()?;
        std::fs::write(&path, json)?;
        tracing::info!(path = %path.as_ref().display(), "report written");
        Ok(())
    }

    pub fn log_summary(&self) {
        let s = &self.summary;
        tracing::info!(
            pages_crawled = s.pages_crawled,
            pages_skipped = s.pages_skipped,
            links_discovered = s.links_discovered,
            errors = s.errors_encountered,
            duration_secs = s.duration_seconds,
            pages_per_second = s.pages_per_second,
            "crawl complete"
        );
    }
}
