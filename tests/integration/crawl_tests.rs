//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end through the default HTTP fetcher.

use std::time::Duration;
use sumi_sweep::config::{CheckpointBackend, Config};
use sumi_sweep::crawler::ROBOTS_DISALLOWED;
use sumi_sweep::frontier::DOMAIN_NOT_ALLOWED;
use sumi_sweep::output::write_markdown_summary;
use sumi_sweep::storage::{CheckpointStore, JsonCheckpointStore};
use sumi_sweep::Coordinator;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration tuned for fast tests against a local mock server
fn test_config() -> Config {
    let mut config = Config::default();
    config.crawler.workers = 2;
    config.politeness.rate_limit = 0.0;
    config.politeness.max_per_domain = 2;
    config.retry.max_retries = 1;
    config.retry.base_delay = 0.01;
    config.retry.max_delay = 0.05;
    config.retry.timeout = 5.0;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.checkpoint.enabled = false;
    config
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><body>{}</body></html>", body),
        "text/html",
    )
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html(body))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(&server)
        .await;

    mount_page(
        &server,
        "/",
        &format!(
            r#"<a href="{}/page1">Page 1</a>
               <a href="page2">Page 2</a>
               <a href="https://external.test/">Elsewhere</a>
               <a href="mailto:someone@example.com">Mail</a>"#,
            base
        ),
    )
    .await;
    mount_page(&server, "/page1", r#"<a href="/">Home</a><a href="/page2">2</a>"#).await;
    mount_page(&server, "/page2", "Content 2").await;

    let coordinator = Coordinator::new(test_config()).expect("Failed to create coordinator");
    let result = coordinator
        .crawl(&format!("{}/", base))
        .await
        .expect("Crawl failed");

    assert_eq!(result.visited_urls.len(), 3);
    assert!(result.visited_urls.contains(&format!("{}/page1", base)));
    assert!(result.visited_urls.contains(&format!("{}/page2", base)));
    // Off-site links are reported, never fetched
    assert_eq!(result.failed_urls.len(), 1);
    assert_eq!(
        result
            .failed_urls
            .get("https://external.test/")
            .map(String::as_str),
        Some(DOMAIN_NOT_ALLOWED)
    );
    assert_eq!(result.max_depth_reached, 1);
}

#[tokio::test]
async fn test_robots_disallowed_pages_are_not_fetched() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/", r#"<a href="/private/page">Secret</a><a href="/open">Open</a>"#).await;
    mount_page(&server, "/open", "Open").await;
    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(html("Secret"))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config()).unwrap();
    let result = coordinator.crawl(&format!("{}/", base)).await.unwrap();

    let private = format!("{}/private/page", base);
    assert_eq!(
        result.failed_urls.get(&private).map(String::as_str),
        Some(ROBOTS_DISALLOWED)
    );
    assert!(!result.visited_urls.contains(&private));
}

#[tokio::test]
async fn test_http_errors_are_classified() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/", r#"<a href="/missing">x</a><a href="/broken">y</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    // One attempt plus one retry
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let coordinator = Coordinator::new(test_config()).unwrap();
    let result = coordinator.crawl(&format!("{}/", base)).await.unwrap();

    assert_eq!(
        result
            .failed_urls
            .get(&format!("{}/missing", base))
            .map(String::as_str),
        Some("HTTP 404")
    );
    assert_eq!(
        result
            .failed_urls
            .get(&format!("{}/broken", base))
            .map(String::as_str),
        Some("HTTP 500")
    );
    assert_eq!(result.visited_urls.len(), 1);
}

#[tokio::test]
async fn test_slow_page_times_out() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/", r#"<a href="/slow">slow</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("late").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let mut config = test_config();
    config.retry.timeout = 0.5;
    config.retry.max_retries = 0;

    let result = Coordinator::new(config)
        .unwrap()
        .crawl(&format!("{}/", base))
        .await
        .unwrap();

    let reason = result
        .failed_urls
        .get(&format!("{}/slow", base))
        .expect("slow page recorded as failed");
    assert!(reason.starts_with("timeout"), "unexpected reason: {}", reason);
}

#[tokio::test]
async fn test_redirected_page_links_resolve_against_final_url() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/", r#"<a href="/old">moved</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", format!("{}/new/", base).as_str()),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/new/", r#"<a href="child">child</a>"#).await;
    mount_page(&server, "/new/child", "leaf").await;

    let result = Coordinator::new(test_config())
        .unwrap()
        .crawl(&format!("{}/", base))
        .await
        .unwrap();

    assert!(result.visited_urls.contains(&format!("{}/old", base)));
    assert!(result.visited_urls.contains(&format!("{}/new/child", base)));
}

#[tokio::test]
async fn test_checkpoint_written_and_resume_is_idempotent() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/", r#"<a href="/a">a</a><a href="/b">b</a>"#).await;
    mount_page(&server, "/a", "").await;
    mount_page(&server, "/b", "").await;

    let mut config = test_config();
    config.checkpoint.enabled = true;
    config.checkpoint.path = dir.path().join("sweep.json");

    let coordinator = Coordinator::builder(config.clone())
        .config_hash("first")
        .build()
        .unwrap();
    let first = coordinator.crawl(&format!("{}/", base)).await.unwrap();
    assert_eq!(first.visited_urls.len(), 3);

    let store = JsonCheckpointStore::new(&config.checkpoint.path);
    let checkpoint = store.load().unwrap().expect("checkpoint written");
    assert!(checkpoint.frontier_snapshot.is_empty());
    assert_eq!(checkpoint.dedup_snapshot.len(), 3);
    assert_eq!(checkpoint.config_hash.as_deref(), Some("first"));

    // Nothing is pending, so resuming fetches nothing and keeps the results
    let resumed = Coordinator::new(config)
        .unwrap()
        .resume(checkpoint)
        .await
        .unwrap();
    assert_eq!(resumed.visited_urls, first.visited_urls);
}

#[tokio::test]
async fn test_sqlite_checkpoint_backend() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/", r#"<a href="/a">a</a>"#).await;
    mount_page(&server, "/a", "").await;

    let mut config = test_config();
    config.checkpoint.enabled = true;
    config.checkpoint.backend = CheckpointBackend::Sqlite;
    config.checkpoint.path = dir.path().join("sweep.db");

    let coordinator = Coordinator::new(config).unwrap();
    coordinator.crawl(&format!("{}/", base)).await.unwrap();

    let checkpoint = coordinator
        .load_checkpoint()
        .unwrap()
        .expect("checkpoint written");
    assert_eq!(checkpoint.start_url, format!("{}/", base));
    assert_eq!(checkpoint.dedup_snapshot.len(), 2);
}

#[tokio::test]
async fn test_markdown_summary_lists_failures() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/", r#"<a href="/gone">gone</a>"#).await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let result = Coordinator::new(test_config())
        .unwrap()
        .crawl(&format!("{}/", base))
        .await
        .unwrap();

    let report = dir.path().join("summary.md");
    write_markdown_summary(&result, &report).unwrap();
    let content = std::fs::read_to_string(&report).unwrap();

    assert!(content.contains("# Sumi-Sweep Crawl Summary"));
    assert!(content.contains(&format!("{}/gone", base)));
    assert!(content.contains("HTTP 410"));
}
