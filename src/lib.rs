//! WebWarden: a polite, policy-aware crawler for single-domain audits.
//!
//! The crawl pipeline is sequential by design: the frontier hands out one
//! URL at a time, the safety gate vets it, the fetch engine retrieves it
//! under per-domain rate limits, and every run ends with a JSON report.

pub mod backoff;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod frontier;
pub mod logging;
pub mod network;
pub mod parser;
pub mod rate_limiter;
pub mod report;
pub mod robots;
pub mod safety;
pub mod url_utils;

pub use config::{ConfigError, SpiderConfig};
pub use crawler::Spider;
pub use frontier::{FrontierItem, FrontierOrder, UrlFrontier};
pub use network::{FetchError, HttpClient, HttpFetchResult};
pub use report::{CrawlRecord, CrawlReport};
pub use safety::{PreCrawlDecision, SafetyManager};
