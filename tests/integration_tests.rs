use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use webwarden::config::SpiderConfig;
use webwarden::crawler::Spider;

fn html_page(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">link</a>"#, href))
        .collect();
    format!("<html><body>{}</body></html>", anchors)
}

// set_body_raw keeps the content type; set_body_string would stamp
// text/plain over it.
fn html_response(links: &[&str]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(html_page(links), "text/html; charset=utf-8")
}

fn fast_config(server: &MockServer) -> SpiderConfig {
    SpiderConfig {
        start_url: format!("{}/", server.uri()),
        respect_robots_txt: false,
        requests_per_second: 1000.0,
        burst_capacity: 100,
        max_retries: 3,
        ..Default::default()
    }
}

#[tokio::test]
async fn crawl_follows_same_domain_links() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(&["/a", "/b", "https://other-site.test/x"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_response(&[]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html_response(&[]))
        .mount(&server)
        .await;

    let report = Spider::new(fast_config(&server)).run().await;

    assert_eq!(report.summary.pages_crawled, 3);
    assert_eq!(report.summary.errors_encountered, 0);
    // The off-domain link is never discovered, let alone fetched.
    assert!(report
        .discovered_links
        .values()
        .flatten()
        .all(|l| !l.contains("other-site.test")));
}

#[tokio::test]
async fn transient_server_errors_are_retried() {
    let server = MockServer::start().await;

    // Two failures, then success; the mock expires after two matches.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(&[]))
        .mount(&server)
        .await;

    let report = Spider::new(fast_config(&server)).run().await;

    assert_eq!(report.summary.pages_crawled, 1);
    assert_eq!(report.summary.errors_encountered, 0);
    assert_eq!(report.http_stats.requests_made, 3);
    assert_eq!(report.http_stats.retries_performed, 2);
}

#[tokio::test]
async fn rate_limit_response_honors_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(&[]))
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let report = Spider::new(fast_config(&server)).run().await;

    assert_eq!(report.summary.pages_crawled, 1);
    assert_eq!(report.http_stats.rate_limited_requests, 1);
    assert!(started.elapsed() >= std::time::Duration::from_secs(1));
}

#[tokio::test]
async fn client_errors_are_terminal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(&["/missing"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let report = Spider::new(fast_config(&server)).run().await;

    // A terminal 404 is a page that yielded nothing, not an error.
    assert_eq!(report.summary.pages_crawled, 1);
    assert_eq!(report.summary.pages_skipped, 1);
    assert_eq!(report.summary.errors_encountered, 0);
    assert_eq!(report.http_stats.retries_performed, 0);
}

#[tokio::test]
async fn transport_failure_during_retries_is_an_error() {
    let server = MockServer::start().await;

    // First attempt stalls past the read timeout, the rest hit a 503;
    // the transport failure must survive to the final outcome.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut config = fast_config(&server);
    config.timeout_read_secs = 0.5;
    config.max_retries = 1;

    let report = Spider::new(config).run().await;

    assert_eq!(report.summary.pages_crawled, 0);
    assert_eq!(report.summary.pages_skipped, 0);
    assert_eq!(report.summary.errors_encountered, 1);
}

#[tokio::test]
async fn robots_rules_are_respected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(&["/private/secret", "/public"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html_response(&[]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(html_response(&[]))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = fast_config(&server);
    config.respect_robots_txt = true;

    let report = Spider::new(config).run().await;

    assert_eq!(report.summary.pages_crawled, 2);
    assert_eq!(report.safety_stats.robots_blocks, 1);
}

#[tokio::test]
async fn excluded_extensions_never_hit_the_network() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(&["/report.pdf", "/page"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html_response(&[]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let report = Spider::new(fast_config(&server)).run().await;

    assert_eq!(report.summary.pages_crawled, 2);
    assert_eq!(report.safety_stats.filter_blocks, 1);
    assert_eq!(report.summary.pages_skipped, 1);
}

#[tokio::test]
async fn non_html_content_is_fetched_but_not_parsed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(&["/logo"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(vec![0u8; 64]),
        )
        .expect(1)
        .mount(&server)
        .await;

    let report = Spider::new(fast_config(&server)).run().await;

    assert_eq!(report.summary.pages_crawled, 1);
    assert_eq!(report.summary.pages_skipped, 1);
    assert!(!report
        .crawl_results
        .keys()
        .any(|url| url.ends_with("/logo")));
}

#[tokio::test]
async fn depth_limit_bounds_discovery() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(&["/depth1"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/depth1"))
        .respond_with(html_response(&["/depth2"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/depth2"))
        .respond_with(html_response(&[]))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = fast_config(&server);
    config.max_depth = 1;

    let report = Spider::new(config).run().await;

    assert_eq!(report.summary.pages_crawled, 2);
    // The depth-2 link is still discovered, just not enqueued.
    assert!(report
        .discovered_links
        .values()
        .flatten()
        .any(|l| l.ends_with("/depth2")));
}

#[tokio::test]
async fn page_budget_stops_the_crawl() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(&["/a", "/b", "/c", "/d"]))
        .mount(&server)
        .await;
    for p in ["/a", "/b", "/c", "/d"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(html_response(&[]))
            .mount(&server)
            .await;
    }

    let mut config = fast_config(&server);
    config.max_pages = 2;

    let report = Spider::new(config).run().await;

    assert_eq!(report.summary.pages_crawled, 2);
    assert_eq!(report.http_stats.requests_made, 2);
}

#[tokio::test]
async fn duplicate_links_are_crawled_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(&["/dup", "/dup#section", "/dup"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dup"))
        .respond_with(html_response(&["/"]))
        .expect(1)
        .mount(&server)
        .await;

    let report = Spider::new(fast_config(&server)).run().await;

    assert_eq!(report.summary.pages_crawled, 2);
    // The back-link to the visited root is rejected by the frontier.
    assert!(report.queue_stats.duplicates_skipped >= 1);
}

#[tokio::test]
async fn report_records_page_metadata() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_response(&["/child"]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/child"))
        .respond_with(html_response(&[]))
        .mount(&server)
        .await;

    let config = fast_config(&server);
    let root_url = config.start_url.clone();
    let report = Spider::new(config).run().await;

    let child = report
        .crawl_results
        .values()
        .find(|r| r.url.ends_with("/child"))
        .expect("child page should be recorded");
    assert_eq!(child.depth, 1);
    assert_eq!(child.parent_url.as_deref(), Some(root_url.as_str()));
    assert_eq!(child.status_code, 200);
    assert!(child.safety_analysis.is_some());
    assert!(child.response_time >= 0.0);

    // Discovered links are grouped under the page they were found on.
    let from_root = report
        .discovered_links
        .get(&root_url)
        .expect("root page should have a link entry");
    assert!(from_root.iter().any(|l| l.ends_with("/child")));
}
