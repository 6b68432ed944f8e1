//! Integration tests for the fetch engine against real HTTP servers.
//!
//! wiremock covers redirects, decoding and the header profile. The raw
//! listener in `support::raw_server` covers hang-ups, header casing on the
//! wire and the per-host connection ceiling.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use hardened_fetch::fetch::{
    BROWSER_USER_AGENT, ClientConfig, FetchEngine, FetchError, FetchRequest, FetchResponse,
    RetryScope,
};
use reqwest::{Method, StatusCode};
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::raw_server::{self, Reply};
use support::socket_guard::{should_skip_socket_bound_test, start_mock_server_or_skip};

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return Ok(());
        };
        mock_server
    }};
}

fn engine() -> FetchEngine {
    FetchEngine::new(ClientConfig::default()).unwrap()
}

fn redirect_to(location: &str) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("Location", location)
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Mounts `/hop/0` -> `/hop/1` -> ... -> `/hop/{hops}` (200).
async fn mount_chain(server: &wiremock::MockServer, hops: usize) {
    for i in 0..hops {
        Mock::given(method("GET"))
            .and(path(format!("/hop/{i}")))
            .respond_with(redirect_to(&format!("/hop/{}", i + 1)))
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(format!("/hop/{hops}")))
        .respond_with(ResponseTemplate::new(200).set_body_string("end of chain"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_plain_page_is_fetched() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let page = engine()
        .fetch(&format!("{}/page", mock_server.uri()), 10)
        .await?;

    assert_eq!(page.response.status(), StatusCode::OK);
    assert_eq!(page.body.as_ref(), b"<html>ok</html>");
    assert_eq!(page.redirects, 0);
    Ok(())
}

#[tokio::test]
async fn test_chain_of_exactly_max_redirects_succeeds() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    mount_chain(&mock_server, 4).await;

    let page = engine()
        .fetch(&format!("{}/hop/0", mock_server.uri()), 4)
        .await?;

    assert_eq!(page.redirects, 4);
    assert_eq!(page.url.path(), "/hop/4");
    assert_eq!(page.body.as_ref(), b"end of chain");
    Ok(())
}

#[tokio::test]
async fn test_chain_one_longer_than_max_fails() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    mount_chain(&mock_server, 5).await;

    let err = engine()
        .fetch(&format!("{}/hop/0", mock_server.uri()), 4)
        .await
        .unwrap_err();

    assert!(
        matches!(err, FetchError::TooManyRedirects { max_redirects: 4, .. }),
        "{err:?}"
    );
    Ok(())
}

#[tokio::test]
async fn test_single_shot_returns_redirect_untouched() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(redirect_to("/elsewhere"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/elsewhere"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let engine = engine();
    let mut request = FetchRequest::get(Url::parse(&format!("{}/moved", mock_server.uri()))?);
    let mut response = FetchResponse::default();
    engine
        .fetch_follow_redirects(&mut request, &mut response, 1, None)
        .await?;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.location(), Some("/elsewhere"));
    Ok(())
}

#[tokio::test]
async fn test_redirect_without_location_fails() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(301))
        .mount(&mock_server)
        .await;

    let err = engine()
        .fetch(&format!("{}/broken", mock_server.uri()), 10)
        .await
        .unwrap_err();

    assert!(
        matches!(err, FetchError::MissingLocation { status: 301, .. }),
        "{err:?}"
    );
    Ok(())
}

#[tokio::test]
async fn test_relative_and_absolute_targets_are_resolved() -> Result<(), Box<dyn std::error::Error>>
{
    let mock_server = require_mock_server!();
    let absolute = format!("{}/docs/c", mock_server.uri());
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(redirect_to("/docs/b"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/b"))
        .respond_with(redirect_to(&absolute))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/c"))
        .respond_with(redirect_to("d"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/d"))
        .respond_with(ResponseTemplate::new(200).set_body_string("landed"))
        .mount(&mock_server)
        .await;

    let page = engine()
        .fetch(&format!("{}/a", mock_server.uri()), 10)
        .await?;

    assert_eq!(page.url.path(), "/docs/d");
    assert_eq!(page.redirects, 3);
    Ok(())
}

#[tokio::test]
async fn test_observer_sees_hops_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    mount_chain(&mock_server, 2).await;

    let engine = engine();
    let mut request = FetchRequest::get(Url::parse(&format!("{}/hop/0", mock_server.uri()))?);
    let mut response = FetchResponse::default();
    let mut seen = Vec::new();
    let mut observe =
        |r: &FetchResponse| seen.push((r.status().as_u16(), r.location().map(str::to_string)));

    engine
        .fetch_follow_redirects(&mut request, &mut response, 10, Some(&mut observe))
        .await?;

    assert_eq!(
        seen,
        vec![
            (302, Some("/hop/1".to_string())),
            (302, Some("/hop/2".to_string())),
            (200, None),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_browser_profile_is_sent_on_every_hop() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/start"))
        .and(header("user-agent", BROWSER_USER_AGENT))
        .and(header("upgrade-insecure-requests", "1"))
        .and(header("sec-fetch-mode", "navigate"))
        .respond_with(redirect_to("/next"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .and(header("user-agent", BROWSER_USER_AGENT))
        .and(header("sec-fetch-site", "cross-site"))
        .and(header("cache-control", "no-cache"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let page = engine()
        .fetch(&format!("{}/start", mock_server.uri()), 10)
        .await?;
    assert_eq!(page.body.as_ref(), b"ok");
    Ok(())
}

#[tokio::test]
async fn test_gzip_body_is_decoded() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    let html = b"<html><body>compressed page</body></html>";
    Mock::given(method("GET"))
        .and(path("/gz"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Encoding", "gzip")
                .set_body_bytes(gzip(html)),
        )
        .mount(&mock_server)
        .await;

    let page = engine()
        .fetch(&format!("{}/gz", mock_server.uri()), 10)
        .await?;

    assert_eq!(page.body.as_ref(), html);
    assert_ne!(page.response.body().as_ref(), html);
    Ok(())
}

#[tokio::test]
async fn test_unknown_encoding_is_rejected_but_metadata_survives()
-> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/br"))
        .respond_with(
            ResponseTemplate::new(203)
                .insert_header("Content-Encoding", "br")
                .insert_header("X-Meta", "still here")
                .set_body_bytes(b"\x1b\x00\x00".to_vec()),
        )
        .mount(&mock_server)
        .await;

    let err = engine()
        .fetch(&format!("{}/br", mock_server.uri()), 10)
        .await
        .unwrap_err();

    assert!(
        matches!(err, FetchError::UnsupportedEncoding { ref encoding, .. } if encoding == "br"),
        "{err:?}"
    );
    let response = err.response().ok_or("decode error should keep the response")?;
    assert_eq!(response.status(), StatusCode::NON_AUTHORITATIVE_INFORMATION);
    assert_eq!(response.headers()["x-meta"], "still here");
    assert_eq!(response.body().as_ref(), b"\x1b\x00\x00");
    Ok(())
}

#[tokio::test]
async fn test_oversized_body_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 4096]))
        .mount(&mock_server)
        .await;

    let engine = FetchEngine::new(ClientConfig::default().with_max_body_size(1024))?;
    let err = engine
        .fetch(&format!("{}/big", mock_server.uri()), 10)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Transport(_)), "{err:?}");
    assert!(err.to_string().contains("1024"), "Expected limit in: {err}");
    Ok(())
}

#[tokio::test]
async fn test_read_timeout_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let engine = FetchEngine::new(
        ClientConfig::default().with_read_timeout(Duration::from_millis(200)),
    )?;
    let err = engine
        .fetch(&format!("{}/slow", mock_server.uri()), 10)
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn test_refused_connection_is_unreachable() -> Result<(), Box<dyn std::error::Error>> {
    if should_skip_socket_bound_test() {
        return Ok(());
    }
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);

    let err = engine()
        .fetch(&format!("http://127.0.0.1:{port}/"), 10)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::DialUnreachable { .. }), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn test_empty_responses_are_retried() -> Result<(), Box<dyn std::error::Error>> {
    if should_skip_socket_bound_test() {
        return Ok(());
    }
    let server = raw_server::spawn(|n| {
        if n < 2 {
            Reply::Hangup
        } else {
            Reply::Ok {
                delay: Duration::ZERO,
                body: "third connection",
            }
        }
    })
    .await?;

    let page = engine().fetch(&server.url("/"), 10).await?;

    assert_eq!(page.body.as_ref(), b"third connection");
    assert_eq!(server.connections(), 3);
    Ok(())
}

#[tokio::test]
async fn test_retry_stops_after_max_attempts() -> Result<(), Box<dyn std::error::Error>> {
    if should_skip_socket_bound_test() {
        return Ok(());
    }
    let server = raw_server::spawn(|_| Reply::Hangup).await?;

    let engine =
        FetchEngine::new(ClientConfig::default().with_max_idempotent_call_attempts(3))?;
    let err = engine.fetch(&server.url("/"), 10).await.unwrap_err();

    assert!(
        matches!(err, FetchError::Transport(ref t) if t.is_empty_response()),
        "{err:?}"
    );
    assert_eq!(server.connections(), 3);
    Ok(())
}

#[tokio::test]
async fn test_post_is_sent_once_unless_any_method_retry() -> Result<(), Box<dyn std::error::Error>>
{
    if should_skip_socket_bound_test() {
        return Ok(());
    }
    let server = raw_server::spawn(|n| {
        if n == 0 {
            Reply::Hangup
        } else {
            Reply::Ok {
                delay: Duration::ZERO,
                body: "posted",
            }
        }
    })
    .await?;
    let url = Url::parse(&server.url("/submit"))?;

    let mut request = FetchRequest::new(Method::POST, url.clone()).with_body("a=1");
    let mut response = FetchResponse::default();
    let result = engine()
        .fetch_follow_redirects(&mut request, &mut response, 1, None)
        .await;
    assert!(result.is_err());
    assert_eq!(server.connections(), 1);

    let engine = FetchEngine::new(ClientConfig::default().with_retry_scope(RetryScope::AnyMethod))?;
    let mut request = FetchRequest::new(Method::POST, url).with_body("a=1");
    engine
        .fetch_follow_redirects(&mut request, &mut response, 1, None)
        .await?;
    assert_eq!(response.body().as_ref(), b"posted");
    assert_eq!(server.connections(), 2);
    Ok(())
}

#[tokio::test]
async fn test_headers_are_title_cased_on_the_wire() -> Result<(), Box<dyn std::error::Error>> {
    if should_skip_socket_bound_test() {
        return Ok(());
    }
    let server = raw_server::spawn(|_| Reply::Ok {
        delay: Duration::ZERO,
        body: "ok",
    })
    .await?;

    engine().fetch(&server.url("/"), 10).await?;

    let requests = server.requests();
    let head = requests.first().ok_or("no request received")?;
    assert!(head.starts_with("GET / HTTP/1.1\r\n"), "{head}");
    for expected in [
        "User-Agent: Mozilla/5.0",
        "Accept-Encoding: gzip, deflate",
        "Upgrade-Insecure-Requests: 1",
        "Sec-Fetch-Site: cross-site",
        "Te: trailers",
    ] {
        assert!(head.contains(expected), "Expected `{expected}` in:\n{head}");
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connections_per_host_are_capped() -> Result<(), Box<dyn std::error::Error>> {
    if should_skip_socket_bound_test() {
        return Ok(());
    }
    let server = raw_server::spawn(|_| Reply::Ok {
        delay: Duration::from_millis(100),
        body: "slow",
    })
    .await?;

    let engine = FetchEngine::new(ClientConfig::default().with_max_conns_per_host(2))?;
    let mut handles = Vec::new();
    for i in 0..6 {
        let engine = engine.clone();
        let url = server.url(&format!("/{i}"));
        handles.push(tokio::spawn(async move { engine.fetch(&url, 1).await }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(server.connections(), 6);
    assert!(server.peak() <= 2, "peak concurrency {} exceeded 2", server.peak());
    assert!(server.peak() >= 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hosts_do_not_share_a_ceiling() -> Result<(), Box<dyn std::error::Error>> {
    if should_skip_socket_bound_test() {
        return Ok(());
    }
    let reply = |_| Reply::Ok {
        delay: Duration::from_millis(300),
        body: "slow",
    };
    let first = raw_server::spawn(reply).await?;
    let second = raw_server::spawn(reply).await?;

    let engine = Arc::new(FetchEngine::new(
        ClientConfig::default().with_max_conns_per_host(1),
    )?);
    let first_url = first.url("/");
    let second_url = second.url("/");
    let started = std::time::Instant::now();
    let (a, b) = tokio::join!(
        engine.fetch(&first_url, 1),
        engine.fetch(&second_url, 1)
    );
    a?;
    b?;

    // Serialized, the two requests would take at least 600ms.
    assert!(started.elapsed() < Duration::from_millis(590), "{:?}", started.elapsed());
    Ok(())
}
