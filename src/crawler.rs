//! The crawl engine: drives the frontier through the safety gate and the
//! fetch engine one page at a time, and always produces a report, even
//! when interrupted.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use crate::config::SpiderConfig;
use crate::frontier::{FrontierItem, FrontierOrder, UrlFrontier};
use crate::network::HttpClient;
use crate::parser;
use crate::report::{CrawlRecord, CrawlReport, CrawlSummary};
use crate::safety::SafetyManager;
use crate::url_utils;

pub struct Spider {
    config: SpiderConfig,
    client: HttpClient,
    safety: SafetyManager,
    frontier: UrlFrontier,
    records: BTreeMap<String, CrawlRecord>,
    discovered_links: BTreeMap<String, Vec<String>>,
    pages_skipped: usize,
    links_discovered: usize,
    errors_encountered: usize,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Spider {
    pub fn new(config: SpiderConfig) -> Self {
        Self::with_order(config, FrontierOrder::default())
    }

    pub fn with_order(config: SpiderConfig, order: FrontierOrder) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Room for discovered-but-unvisited links beyond the page budget.
        let frontier = UrlFrontier::new(order, config.max_pages * 2);

        Self {
            client: HttpClient::new(&config),
            safety: SafetyManager::new(&config),
            frontier,
            records: BTreeMap::new(),
            discovered_links: BTreeMap::new(),
            pages_skipped: 0,
            links_discovered: 0,
            errors_encountered: 0,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            config,
        }
    }

    /// Handle for requesting a graceful stop from another task. The current
    /// page finishes; the report still covers everything crawled so far.
    pub fn shutdown_trigger(&self) -> Arc<watch::Sender<bool>> {
        Arc::clone(&self.shutdown_tx)
    }

    pub async fn run(mut self) -> CrawlReport {
        let started = Instant::now();
        let start_url = url_utils::normalize_url(&self.config.start_url);

        tracing::info!(
            start_url = %start_url,
            max_depth = self.config.max_depth,
            max_pages = self.config.max_pages,
            "starting crawl"
        );

        self.frontier.enqueue(FrontierItem::new(&start_url, 0, None));

        loop {
            if *self.shutdown_rx.borrow() {
                tracing::info!("shutdown requested, stopping crawl");
                break;
            }
            if self.records.len() >= self.config.max_pages {
                tracing::info!(max_pages = self.config.max_pages, "page budget reached");
                break;
            }
            let Some(item) = self.frontier.dequeue() else {
                tracing::info!("frontier exhausted");
                break;
            };

            self.crawl_one(item).await;
        }

        let report = self.build_report(started.elapsed().as_secs_f64());
        report.log_summary();
        report
    }

    async fn crawl_one(&mut self, item: FrontierItem) {
        tracing::debug!(url = %item.url, depth = item.depth, "crawling");

        if !self
            .safety
            .pre_crawl_check(&item.url, item.depth)
            .await
            .is_allowed()
        {
            self.pages_skipped += 1;
            return;
        }

        let crawl_delay = self.safety.robots_delay(&item.url);

        let result = match self.client.fetch(&item.url, crawl_delay).await {
            Ok(Some(result)) => result,
            // "No result" is a skipped page, not an error; errors are
            // reserved for transport failures.
            Ok(None) => {
                self.pages_skipped += 1;
                return;
            }
            Err(e) => {
                tracing::error!(url = %item.url, error = %e, "fetch failed");
                self.errors_encountered += 1;
                return;
            }
        };

        if !result.is_html() {
            tracing::debug!(
                url = %item.url,
                content_type = %result.content_type,
                "skipping non-HTML content"
            );
            self.pages_skipped += 1;
            return;
        }

        let analysis = self.safety.post_crawl_analysis(&item.url, &result.body);

        // Relative links resolve against where the response actually came
        // from, which also scopes discovery after a redirect.
        let links = parser::extract_links(&result.body, &result.final_url);
        self.links_discovered += links.len();

        if item.depth < self.config.max_depth {
            for link in &links {
                self.frontier.enqueue(
                    FrontierItem::new(link, item.depth + 1, Some(item.url.clone()))
                        .with_priority(item.depth + 1),
                );
            }
        }

        let key = url_utils::normalize_url(&item.url);
        self.discovered_links.insert(key.clone(), links.clone());
        self.records.insert(
            key,
            CrawlRecord {
                url: item.url,
                depth: item.depth,
                parent_url: item.parent_url,
                status_code: result.status_code,
                content_type: result.content_type,
                content_size: result.body.len(),
                response_time: result.elapsed_time,
                links_found: links.len(),
                safety_analysis: Some(analysis),
                crawled_at: Utc::now(),
            },
        );
    }

    fn build_report(&self, duration_seconds: f64) -> CrawlReport {
        CrawlReport {
            summary: CrawlSummary::compute(
                &self.config.start_url,
                duration_seconds,
                &self.records,
                self.pages_skipped,
                self.links_discovered,
                self.errors_encountered,
            ),
            configuration: self.config.clone(),
            crawl_results: self.records.clone(),
            discovered_links: self.discovered_links.clone(),
            queue_stats: self.frontier.stats(),
            safety_stats: self.safety.stats_snapshot(),
            http_stats: self.client.stats_snapshot(),
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config(start_url: &str) -> SpiderConfig {
        SpiderConfig {
            start_url: start_url.to_string(),
            respect_robots_txt: false,
            max_retries: 0,
            requests_per_second: 1000.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_blocked_start_url_yields_empty_report() {
        // The start URL trips the path filter, so no request is ever made.
        let spider = Spider::new(offline_config("https://site.test/wp-admin/"));
        let report = spider.run().await;

        assert_eq!(report.summary.pages_crawled, 0);
        assert_eq!(report.summary.pages_skipped, 1);
        assert_eq!(report.safety_stats.filter_blocks, 1);
        assert_eq!(report.http_stats.requests_made, 0);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_page() {
        let spider = Spider::new(offline_config("https://site.test/"));
        let trigger = spider.shutdown_trigger();
        trigger.send(true).unwrap();

        let report = spider.run().await;
        assert_eq!(report.summary.pages_crawled, 0);
        assert_eq!(report.http_stats.requests_made, 0);
    }

    #[tokio::test]
    async fn test_report_carries_configuration() {
        let mut config = offline_config("https://site.test/wp-admin/");
        config.max_pages = 7;
        let report = Spider::new(config).run().await;
        assert_eq!(report.configuration.max_pages, 7);
        assert_eq!(report.summary.start_url, "https://site.test/wp-admin/");
    }
}
