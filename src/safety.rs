//! The safety gate consulted before and after every fetch: URL filtering,
//! robots-exclusion compliance, and authentication/sensitive-area
//! detection, composed so the first failing check short-circuits.

use regex::Regex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

use crate::config::SpiderConfig;
use crate::parser::FormDescriptor;
use crate::robots::RobotsChecker;
use crate::url_utils;

const MAX_URL_LENGTH: usize = 2048;
const LARGE_CONTENT_BYTES: usize = 10 * 1024 * 1024;

/// Which check blocked a URL; drives the per-category counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCategory {
    Filter,
    Robots,
    Auth,
}

#[derive(Debug, Clone)]
pub enum PreCrawlDecision {
    Allowed,
    Blocked {
        category: BlockCategory,
        reason: String,
    },
}

impl PreCrawlDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PreCrawlDecision::Allowed)
    }
}

/// Rejects URLs on mechanical grounds before any network activity.
struct UrlFilter {
    excluded_extensions: Vec<String>,
    excluded_paths: Vec<String>,
    max_depth: u32,
}

impl UrlFilter {
    fn new(config: &SpiderConfig) -> Self {
        Self {
            excluded_extensions: config.excluded_extensions.clone(),
            excluded_paths: config.excluded_paths.clone(),
            max_depth: config.max_depth,
        }
    }

    fn check(&self, url: &str, depth: u32) -> Result<(), String> {
        if depth > self.max_depth {
            return Err(format!(
                "depth limit exceeded: {} > {}",
                depth, self.max_depth
            ));
        }

        let parsed = Url::parse(url).map_err(|_| "URL failed to parse".to_string())?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("unsupported scheme: {}", parsed.scheme()));
        }

        if url.len() > MAX_URL_LENGTH {
            return Err("URL too long".to_string());
        }

        if url_utils::has_excluded_extension(url, &self.excluded_extensions) {
            return Err(format!(
                "excluded extension: {}",
                url_utils::file_extension(url)
            ));
        }

        let path = parsed.path().to_ascii_lowercase();
        if let Some(excluded) = self.excluded_paths.iter().find(|p| path.contains(p.as_str())) {
            return Err(format!("excluded path segment: {}", excluded));
        }

        Ok(())
    }
}

/// Heuristic category attached to each URL pattern, so operators can
/// extend the list without touching the gate's composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternCategory {
    AuthPage,
    SensitiveArea,
}

/// Detects authentication surfaces from URLs (pre-fetch) and page markup
/// (post-fetch). Patterns are an ordered, pluggable list.
pub struct AuthDetector {
    url_patterns: Vec<(Regex, PatternCategory)>,
    content_patterns: Vec<Regex>,
}

impl AuthDetector {
    pub fn new() -> Self {
        let url_specs: &[(&str, PatternCategory)] = &[
            (r"(?i)/login", PatternCategory::AuthPage),
            (r"(?i)/signin", PatternCategory::AuthPage),
            (r"(?i)/logon", PatternCategory::AuthPage),
            (r"(?i)/auth", PatternCategory::AuthPage),
            (r"(?i)/session", PatternCategory::AuthPage),
            (r"(?i)/logout", PatternCategory::AuthPage),
            (r"(?i)/signout", PatternCategory::AuthPage),
            (r"(?i)/admin", PatternCategory::SensitiveArea),
            (r"(?i)/webadmin", PatternCategory::SensitiveArea),
            (r"(?i)/siteadmin", PatternCategory::SensitiveArea),
            (r"(?i)/cpanel", PatternCategory::SensitiveArea),
            (r"(?i)/phpmyadmin", PatternCategory::SensitiveArea),
            (r"(?i)/wp-admin", PatternCategory::SensitiveArea),
            (r"(?i)/manage", PatternCategory::SensitiveArea),
            (r"(?i)/control", PatternCategory::SensitiveArea),
            (r"(?i)/dashboard", PatternCategory::SensitiveArea),
        ];

        let content_specs = [
            r#"(?i)<input[^>]*type=["']password["']"#,
            r#"(?i)<input[^>]*name=["']password["']"#,
            r#"(?i)<input[^>]*name=["']username["']"#,
            r#"(?i)<input[^>]*name=["']email["'].*password"#,
            r"(?i)<form[^>]*action=[^>]*login",
            r"(?i)<form[^>]*action=[^>]*signin",
        ];

        Self {
            url_patterns: url_specs
                .iter()
                .filter_map(|(p, c)| Regex::new(p).ok().map(|r| (r, *c)))
                .collect(),
            content_patterns: content_specs
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }

    /// Register an additional URL pattern. Invalid patterns are rejected.
    pub fn add_url_pattern(&mut self, pattern: &str, category: PatternCategory) -> bool {
        match Regex::new(pattern) {
            Ok(regex) => {
                self.url_patterns.push((regex, category));
                true
            }
            Err(_) => false,
        }
    }

    /// URL-only half of the detector, usable before any content exists.
    pub fn match_url(&self, url: &str) -> Option<PatternCategory> {
        self.url_patterns
            .iter()
            .find(|(regex, _)| regex.is_match(url))
            .map(|(_, category)| *category)
    }

    /// Content half: does the markup reveal an authentication surface?
    pub fn content_has_auth_markers(&self, html_body: &str) -> bool {
        self.content_patterns.iter().any(|r| r.is_match(html_body))
    }

    /// Classify each detected form the way the report records them. A
    /// password field marks a login form in addition to any action-based
    /// classification.
    pub fn classify_forms(&self, forms: &[FormDescriptor]) -> Vec<String> {
        let mut types = Vec::new();

        for form in forms {
            if form.has_password_field {
                types.push("login_form".to_string());
            }

            let action = &form.action;
            if ["login", "signin", "auth"].iter().any(|w| action.contains(w)) {
                types.push("auth_form".to_string());
            } else if ["search", "query"].iter().any(|w| action.contains(w)) {
                types.push("search_form".to_string());
            } else if ["contact", "feedback"].iter().any(|w| action.contains(w)) {
                types.push("contact_form".to_string());
            } else {
                types.push("generic_form".to_string());
            }
        }

        types
    }
}

impl Default for AuthDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct SafetyStats {
    pub urls_checked: AtomicU64,
    pub urls_blocked: AtomicU64,
    pub filter_blocks: AtomicU64,
    pub robots_blocks: AtomicU64,
    pub auth_blocks: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SafetyStatsSnapshot {
    pub urls_checked: u64,
    pub urls_blocked: u64,
    pub filter_blocks: u64,
    pub robots_blocks: u64,
    pub auth_blocks: u64,
    pub block_rate: f64,
}

/// Result of post-fetch content analysis; annotates the crawl record,
/// never blocks.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyAnalysis {
    pub url: String,
    pub timestamp: f64,
    pub has_forms: bool,
    pub form_types: Vec<String>,
    pub auth_detected: bool,
    pub warnings: Vec<String>,
}

/// Composes the three safety checks in order: URL filter, robots
/// exclusion, auth detection. The first failing check wins.
pub struct SafetyManager {
    url_filter: UrlFilter,
    robots: Option<RobotsChecker>,
    auth_detector: AuthDetector,
    block_auth_urls: bool,
    analyze_forms: bool,
    stats: SafetyStats,
}

impl SafetyManager {
    pub fn new(config: &SpiderConfig) -> Self {
        Self {
            url_filter: UrlFilter::new(config),
            robots: config
                .respect_robots_txt
                .then(|| RobotsChecker::new(config.user_agent.clone())),
            auth_detector: AuthDetector::new(),
            block_auth_urls: config.avoid_auth_pages,
            analyze_forms: config.avoid_forms,
            stats: SafetyStats::default(),
        }
    }

    pub async fn pre_crawl_check(&self, url: &str, depth: u32) -> PreCrawlDecision {
        self.stats.urls_checked.fetch_add(1, Ordering::Relaxed);

        if let Err(reason) = self.url_filter.check(url, depth) {
            return self.block(BlockCategory::Filter, reason, url);
        }

        if let Some(robots) = &self.robots {
            if !robots.can_fetch(url).await {
                return self.block(
                    BlockCategory::Robots,
                    "disallowed by robots.txt".to_string(),
                    url,
                );
            }
        }

        if self.block_auth_urls {
            if let Some(category) = self.auth_detector.match_url(url) {
                let reason = match category {
                    PatternCategory::AuthPage => "authentication page pattern".to_string(),
                    PatternCategory::SensitiveArea => "sensitive area pattern".to_string(),
                };
                return self.block(BlockCategory::Auth, reason, url);
            }
        }

        PreCrawlDecision::Allowed
    }

    fn block(&self, category: BlockCategory, reason: String, url: &str) -> PreCrawlDecision {
        self.stats.urls_blocked.fetch_add(1, Ordering::Relaxed);
        let counter = match category {
            BlockCategory::Filter => &self.stats.filter_blocks,
            BlockCategory::Robots => &self.stats.robots_blocks,
            BlockCategory::Auth => &self.stats.auth_blocks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::info!(url, reason, "blocked");
        PreCrawlDecision::Blocked { category, reason }
    }

    /// Analyze fetched markup: form classification plus the content half
    /// of the auth detector (the URL half already ran pre-fetch).
    pub fn post_crawl_analysis(&self, url: &str, html_body: &str) -> SafetyAnalysis {
        let mut analysis = SafetyAnalysis {
            url: url.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            has_forms: false,
            form_types: Vec::new(),
            auth_detected: false,
            warnings: Vec::new(),
        };

        if self.analyze_forms {
            let forms = crate::parser::extract_forms(html_body);
            analysis.form_types = self.auth_detector.classify_forms(&forms);
            analysis.has_forms = !analysis.form_types.is_empty();
        }

        if self.auth_detector.content_has_auth_markers(html_body) {
            analysis.auth_detected = true;
            analysis
                .warnings
                .push("Authentication content detected".to_string());
        }

        if html_body.len() > LARGE_CONTENT_BYTES {
            analysis
                .warnings
                .push(format!("Large content size: {} bytes", html_body.len()));
        }

        analysis
    }

    /// Crawl-delay declared by the domain's robots file, if any.
    pub fn robots_delay(&self, url: &str) -> Option<Duration> {
        self.robots.as_ref().and_then(|r| r.crawl_delay(url))
    }

    #[cfg(test)]
    pub(crate) fn robots_checker(&self) -> Option<&RobotsChecker> {
        self.robots.as_ref()
    }

    pub fn stats_snapshot(&self) -> SafetyStatsSnapshot {
        let checked = self.stats.urls_checked.load(Ordering::Relaxed);
        let blocked = self.stats.urls_blocked.load(Ordering::Relaxed);
        SafetyStatsSnapshot {
            urls_checked: checked,
            urls_blocked: blocked,
            filter_blocks: self.stats.filter_blocks.load(Ordering::Relaxed),
            robots_blocks: self.stats.robots_blocks.load(Ordering::Relaxed),
            auth_blocks: self.stats.auth_blocks.load(Ordering::Relaxed),
            block_rate: if checked > 0 {
                blocked as f64 / checked as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robots::RobotsTxt;

    fn test_config() -> SpiderConfig {
        SpiderConfig {
            start_url: "https://site.test".to_string(),
            respect_robots_txt: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_filter_blocks_excluded_extension() {
        let manager = SafetyManager::new(&test_config());
        let decision = manager
            .pre_crawl_check("https://site.test/report.pdf", 0)
            .await;
        match decision {
            PreCrawlDecision::Blocked { category, .. } => {
                assert_eq!(category, BlockCategory::Filter)
            }
            _ => panic!("expected filter block"),
        }
        assert_eq!(manager.stats_snapshot().filter_blocks, 1);
    }

    #[tokio::test]
    async fn test_filter_blocks_bad_scheme_and_depth() {
        let manager = SafetyManager::new(&test_config());
        assert!(!manager
            .pre_crawl_check("ftp://site.test/file", 0)
            .await
            .is_allowed());
        assert!(!manager
            .pre_crawl_check("https://site.test/deep", 3)
            .await
            .is_allowed());
        assert!(manager
            .pre_crawl_check("https://site.test/page", 2)
            .await
            .is_allowed());
    }

    #[tokio::test]
    async fn test_filter_blocks_long_url() {
        let manager = SafetyManager::new(&test_config());
        let long_url = format!("https://site.test/{}", "a".repeat(2100));
        assert!(!manager.pre_crawl_check(&long_url, 0).await.is_allowed());
    }

    #[tokio::test]
    async fn test_auth_detector_blocks_before_fetch() {
        let manager = SafetyManager::new(&test_config());
        let decision = manager
            .pre_crawl_check("https://site.test/dashboard/home", 0)
            .await;
        match decision {
            PreCrawlDecision::Blocked { category, .. } => {
                assert_eq!(category, BlockCategory::Auth)
            }
            _ => panic!("expected auth block"),
        }
        assert_eq!(manager.stats_snapshot().auth_blocks, 1);
    }

    #[tokio::test]
    async fn test_robots_block_category() {
        let mut config = test_config();
        config.respect_robots_txt = true;
        let manager = SafetyManager::new(&config);

        let robots = RobotsTxt::parse("User-agent: *\nDisallow: /private/\n");
        manager
            .robots_checker()
            .unwrap()
            .preload("site.test", Some(robots));

        let decision = manager
            .pre_crawl_check("https://site.test/private/x", 0)
            .await;
        match decision {
            PreCrawlDecision::Blocked { category, .. } => {
                assert_eq!(category, BlockCategory::Robots)
            }
            _ => panic!("expected robots block"),
        }
        assert!(manager
            .pre_crawl_check("https://site.test/public/x", 0)
            .await
            .is_allowed());
    }

    #[test]
    fn test_excluded_path_check() {
        let manager = SafetyManager::new(&test_config());
        let result = manager.url_filter.check("https://site.test/wp-admin/options", 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_form_classification() {
        let detector = AuthDetector::new();
        let forms = vec![
            FormDescriptor {
                has_password_field: true,
                action: "/login".to_string(),
            },
            FormDescriptor {
                has_password_field: false,
                action: "/search".to_string(),
            },
            FormDescriptor {
                has_password_field: false,
                action: "/contact-us".to_string(),
            },
            FormDescriptor {
                has_password_field: false,
                action: "/subscribe".to_string(),
            },
        ];

        let types = detector.classify_forms(&forms);
        assert_eq!(
            types,
            vec![
                "login_form",
                "auth_form",
                "search_form",
                "contact_form",
                "generic_form"
            ]
        );
    }

    #[test]
    fn test_post_crawl_analysis_flags_auth_markup() {
        let manager = SafetyManager::new(&test_config());
        let html = r#"<form action="/do-login" method="post">
            <input type="text" name="username">
            <input type="password" name="password">
        </form>"#;

        let analysis = manager.post_crawl_analysis("https://site.test/page", html);
        assert!(analysis.has_forms);
        assert!(analysis.auth_detected);
        assert!(analysis.form_types.contains(&"login_form".to_string()));
        assert!(!analysis.warnings.is_empty());
    }

    #[test]
    fn test_email_login_markup_detected() {
        let detector = AuthDetector::new();
        // No password input; the email field followed by login wording is
        // enough.
        let html = r#"<input type="text" name="email"> enter your password to continue"#;
        assert!(detector.content_has_auth_markers(html));
        assert!(!detector.content_has_auth_markers(r#"<input type="text" name="email">"#));
    }

    #[test]
    fn test_post_crawl_analysis_plain_page() {
        let manager = SafetyManager::new(&test_config());
        let analysis =
            manager.post_crawl_analysis("https://site.test/page", "<html><p>hello</p></html>");
        assert!(!analysis.has_forms);
        assert!(!analysis.auth_detected);
        assert!(analysis.warnings.is_empty());
    }

    #[test]
    fn test_pluggable_url_patterns() {
        let mut detector = AuthDetector::new();
        assert!(detector.match_url("https://site.test/internal-tools").is_none());
        assert!(detector.add_url_pattern(r"(?i)/internal-tools", PatternCategory::SensitiveArea));
        assert_eq!(
            detector.match_url("https://site.test/internal-tools"),
            Some(PatternCategory::SensitiveArea)
        );
        assert!(!detector.add_url_pattern(r"(unclosed", PatternCategory::AuthPage));
    }
}
