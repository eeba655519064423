//! HTTP fetcher tests
//!
//! These use wiremock to create mock HTTP servers and check response
//! classification, then run one crawl end-to-end over real HTTP.

use crate::support::{html_page, markdown_files, test_config};
use sitescribe::crawler::{FetchOptions, FetchResult, HttpFetcher, Orchestrator, PageFetcher};
use sitescribe::CrawlPhase;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options() -> FetchOptions {
    FetchOptions {
        user_agent: "sitescribe-test/1.0".to_string(),
        timeout: Duration::from_secs(5),
    }
}

fn at(server: &MockServer, route: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
}

#[tokio::test]
async fn test_success_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><title>Hi</title></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new().unwrap();
    let result = fetcher.fetch(&at(&server, "/page"), &options()).await;

    match result {
        FetchResult::Success {
            html,
            final_url,
            status,
        } => {
            assert_eq!(status, 200);
            assert!(html.contains("<title>Hi</title>"));
            assert_eq!(final_url, at(&server, "/page"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_user_agent_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("user-agent", "sitescribe-test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new().unwrap();
    let result = fetcher.fetch(&at(&server, "/"), &options()).await;
    assert!(matches!(result, FetchResult::Success { .. }));
}

#[tokio::test]
async fn test_redirect_is_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("new"))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new().unwrap();
    let result = fetcher.fetch(&at(&server, "/old"), &options()).await;

    assert_eq!(
        result,
        FetchResult::Redirect {
            target: at(&server, "/new").to_string()
        }
    );
}

#[tokio::test]
async fn test_redirect_without_location_is_client_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(302))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new().unwrap();
    let result = fetcher.fetch(&at(&server, "/"), &options()).await;
    assert_eq!(result, FetchResult::ClientError { status: 302 });
}

#[tokio::test]
async fn test_status_classification() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new().unwrap();
    assert_eq!(
        fetcher.fetch(&at(&server, "/missing"), &options()).await,
        FetchResult::ClientError { status: 404 }
    );
    assert_eq!(
        fetcher.fetch(&at(&server, "/limited"), &options()).await,
        FetchResult::ClientError { status: 429 }
    );
    assert_eq!(
        fetcher.fetch(&at(&server, "/down"), &options()).await,
        FetchResult::ServerError { status: 503 }
    );
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new().unwrap();
    let options = FetchOptions {
        user_agent: "sitescribe-test/1.0".to_string(),
        timeout: Duration::from_millis(200),
    };
    let result = fetcher.fetch(&at(&server, "/"), &options).await;
    assert_eq!(result, FetchResult::Timeout);
}

#[tokio::test]
async fn test_refused_connection_is_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let fetcher = HttpFetcher::new().unwrap();
    let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
    let result = fetcher.fetch(&url, &options()).await;

    assert!(matches!(result, FetchResult::NetworkError { .. }));
}

#[tokio::test]
async fn test_crawl_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html_page("Home", &["/a", "b?utm_source=x"]))
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html_page("A", &["/"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html_page("B", &[])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let seed = format!("{}/", server.uri());
    let fetcher = Arc::new(HttpFetcher::new().unwrap());

    let report = Orchestrator::new(test_config(&seed, dir.path()), fetcher)
        .run()
        .await
        .unwrap();

    assert_eq!(report.phase, CrawlPhase::Completed);
    assert_eq!(report.metadata.pages_crawled, 3);

    let port = Url::parse(&server.uri()).unwrap().port().unwrap();
    let site = dir.path().join(format!("127.0.0.1_{}", port));
    assert_eq!(report.domain_dir, site);
    assert_eq!(
        markdown_files(&site),
        vec![site.join("a.md"), site.join("b.md"), site.join("index.md")]
    );
}
