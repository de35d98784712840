//! Integration tests: the full pipeline against a loopback origin.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::origin::{Origin, Route};
use common::{ingestor, loopback_config, with_store, FixedResolver, JPEG, PNG, PUBLIC_BASE};
use platter_core::config::{GuardConfig, ResponseMode};
use platter_core::pipeline::fetch::ACCEPT_IMAGES;
use platter_core::pipeline::{Fetcher, Hasher, HostResolver, HttpFetcher, UrlGuard};
use platter_core::{FailureKind, FilesystemStore, ImageRequest};
use tempfile::tempdir;

fn image(content_type: &'static str, body: &[u8]) -> Route {
    Route::Body {
        status: 200,
        content_type: Some(content_type),
        body: body.to_vec(),
    }
}

#[tokio::test]
async fn happy_path_redirects_to_content_addressed_url() {
    let origin = Origin::start(vec![("/dish.jpg", image("image/jpeg", JPEG))]);
    let (ingestor, memory) = ingestor(&loopback_config());

    let response = ingestor
        .handle(&ImageRequest::new(origin.url("/dish.jpg")))
        .await;

    let hash = Hasher::content_hash_from_bytes(JPEG);
    assert_eq!(response.status.as_u16(), 302);
    assert_eq!(
        response.header(reqwest::header::LOCATION),
        Some(format!("{PUBLIC_BASE}/images/{hash}.jpg").as_str())
    );
    assert_eq!(
        response.header(reqwest::header::CACHE_CONTROL),
        Some("public, max-age=31536000, immutable")
    );
    assert_eq!(memory.len().await, 1);
}

#[tokio::test]
async fn sends_fixed_headers_and_only_valid_referer() {
    let origin = Origin::start(vec![("/a.png", image("image/png", PNG))]);
    let config = loopback_config();
    let (ingestor, _) = ingestor(&config);

    let request =
        ImageRequest::new(origin.url("/a.png")).with_referer("https://blog.example.com/post");
    assert!(ingestor.ingest(&request).await.is_ok());

    let request = ImageRequest::new(origin.url("/a.png")).with_referer("javascript:alert(1)");
    assert!(ingestor.ingest(&request).await.is_ok());

    let seen = origin.requests();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].header("user-agent"), Some(config.fetch.user_agent.as_str()));
    assert_eq!(seen[0].header("accept"), Some(ACCEPT_IMAGES));
    assert_eq!(seen[0].header("referer"), Some("https://blog.example.com/post"));
    assert!(seen[0].header("cookie").is_none());
    assert!(seen[1].header("referer").is_none());
}

#[tokio::test]
async fn declared_length_over_cap_is_rejected() {
    let origin = Origin::start(vec![("/big.jpg", image("image/jpeg", &vec![0xFF; 4096]))]);
    let mut config = loopback_config();
    config.fetch.max_bytes = 1024;
    let (ingestor, memory) = ingestor(&config);

    let result = ingestor.ingest(&ImageRequest::new(origin.url("/big.jpg"))).await;
    assert_eq!(result.unwrap_err().kind(), FailureKind::PayloadTooLarge);
    assert!(memory.is_empty().await);
}

#[tokio::test]
async fn streamed_body_over_cap_is_rejected() {
    let mut chunk = JPEG.to_vec();
    chunk.resize(1024, 0);
    let origin = Origin::start(vec![(
        "/endless.jpg",
        Route::Stream {
            content_type: "image/jpeg",
            chunk,
            count: 512,
        },
    )]);
    let mut config = loopback_config();
    config.fetch.max_bytes = 16 * 1024;
    let (ingestor, memory) = ingestor(&config);

    let request = ImageRequest::new(origin.url("/endless.jpg"));
    let result = ingestor.ingest(&request).await;
    assert_eq!(result.unwrap_err().kind(), FailureKind::PayloadTooLarge);
    assert!(ingestor.handle(&request).await.is_fallback());
    assert!(memory.is_empty().await);
}

#[tokio::test]
async fn html_page_is_not_an_image() {
    let origin = Origin::start(vec![(
        "/page",
        image("text/html; charset=utf-8", b"<!doctype html><p>hi</p>"),
    )]);
    let (ingestor, memory) = ingestor(&loopback_config());

    let request = ImageRequest::new(origin.url("/page"));
    let report = ingestor.report(&request).await;
    assert_eq!(report.failure, Some(FailureKind::NotAnImage));
    assert!(ingestor.handle(&request).await.is_fallback());
    assert_eq!(memory.put_calls(), 0);
}

#[tokio::test]
async fn upstream_404_never_reaches_store() {
    let origin = Origin::start(vec![]);
    let (ingestor, memory) = ingestor(&loopback_config());

    let report = ingestor
        .report(&ImageRequest::new(origin.url("/gone.jpg")))
        .await;
    assert_eq!(report.failure, Some(FailureKind::UpstreamError));
    assert_eq!(report.upstream_status, Some(404));
    assert_eq!(memory.put_calls(), 0);
}

#[tokio::test]
async fn follows_relative_redirects() {
    let origin = Origin::start(vec![
        (
            "/start",
            Route::Redirect {
                status: 301,
                location: "/middle".into(),
            },
        ),
        (
            "/middle",
            Route::Redirect {
                status: 307,
                location: "final.png".into(),
            },
        ),
        ("/final.png", image("image/png", PNG)),
    ]);
    let (ingestor, _) = ingestor(&loopback_config());

    let ingested = ingestor
        .ingest(&ImageRequest::new(origin.url("/start")))
        .await
        .unwrap();
    assert_eq!(ingested.asset.extension, "png");
    assert_eq!(ingested.content.source_url().path(), "/final.png");
    assert_eq!(origin.hits(), 3);
}

#[tokio::test]
async fn redirect_loop_hits_the_limit() {
    let origin = Origin::start(vec![(
        "/loop",
        Route::Redirect {
            status: 302,
            location: "/loop".into(),
        },
    )]);
    let config = loopback_config();
    let (ingestor, _) = ingestor(&config);

    let result = ingestor.ingest(&ImageRequest::new(origin.url("/loop"))).await;
    assert_eq!(result.unwrap_err().kind(), FailureKind::TooManyRedirects);
    assert_eq!(origin.hits(), config.fetch.max_redirects + 1);
}

#[tokio::test]
async fn redirect_without_location_is_upstream_error() {
    let origin = Origin::start(vec![(
        "/nowhere",
        Route::Body {
            status: 302,
            content_type: None,
            body: Vec::new(),
        },
    )]);
    let (ingestor, _) = ingestor(&loopback_config());

    let result = ingestor
        .ingest(&ImageRequest::new(origin.url("/nowhere")))
        .await;
    let err = result.unwrap_err();
    assert_eq!(err.kind(), FailureKind::UpstreamError);
    assert_eq!(err.upstream_status(), Some(302));
}

#[tokio::test]
async fn redirect_to_private_host_is_blocked() {
    let origin = Origin::start(vec![
        (
            "/to-metadata",
            Route::Redirect {
                status: 302,
                location: "http://169.254.169.254/latest/meta-data/".into(),
            },
        ),
        (
            "/to-localhost",
            Route::Redirect {
                status: 302,
                location: "http://localhost/admin".into(),
            },
        ),
        (
            "/to-file",
            Route::Redirect {
                status: 302,
                location: "file:///etc/passwd".into(),
            },
        ),
    ]);

    // The first hop is the loopback fixture; every later hop goes through the
    // strict guard held by the fetcher.
    let permissive = UrlGuard::new(GuardConfig {
        allow_private_hosts: true,
        ..GuardConfig::default()
    });
    let fetcher = HttpFetcher::new(
        loopback_config().fetch,
        UrlGuard::new(GuardConfig::default()),
    )
    .unwrap();

    for (path, expected) in [
        ("/to-metadata", FailureKind::BlockedHost),
        ("/to-localhost", FailureKind::BlockedHost),
        ("/to-file", FailureKind::UnsupportedScheme),
    ] {
        let target = permissive.resolve(&origin.url(path)).unwrap();
        let err = fetcher.fetch(&target, None).await.unwrap_err();
        assert_eq!(err.kind(), expected, "{path}");
    }
    assert_eq!(origin.hits(), 3);
}

#[tokio::test]
async fn slow_origin_times_out() {
    let origin = Origin::start(vec![("/slow.png", Route::Stall(Duration::from_secs(3)))]);
    let mut config = loopback_config();
    config.fetch.timeout_ms = 300;
    let (ingestor, _) = ingestor(&config);

    let started = std::time::Instant::now();
    let result = ingestor
        .ingest(&ImageRequest::new(origin.url("/slow.png")))
        .await;
    assert_eq!(result.unwrap_err().kind(), FailureKind::UpstreamTimeout);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn stalled_body_times_out() {
    let origin = Origin::start(vec![(
        "/trickle.jpg",
        Route::StallBody {
            content_type: "image/jpeg",
            delay: Duration::from_secs(3),
        },
    )]);
    let mut config = loopback_config();
    config.fetch.timeout_ms = 300;
    let (ingestor, _) = ingestor(&config);

    let result = ingestor
        .ingest(&ImageRequest::new(origin.url("/trickle.jpg")))
        .await;
    assert_eq!(result.unwrap_err().kind(), FailureKind::UpstreamTimeout);
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let (ingestor, _) = ingestor(&loopback_config());

    let result = ingestor
        .ingest(&ImageRequest::new(format!("http://127.0.0.1:{port}/a.png")))
        .await;
    assert_eq!(result.unwrap_err().kind(), FailureKind::UpstreamUnreachable);
}

#[tokio::test]
async fn concurrent_ingests_store_one_object() {
    let origin = Origin::start(vec![
        ("/a.jpg", image("image/jpeg", JPEG)),
        ("/b.jpg", image("image/jpeg", JPEG)),
    ]);
    let (ingestor, memory) = ingestor(&loopback_config());
    let ingestor = Arc::new(ingestor);

    let mut handles = Vec::new();
    for i in 0..6 {
        let ingestor = Arc::clone(&ingestor);
        let url = origin.url(if i % 2 == 0 { "/a.jpg" } else { "/b.jpg" });
        handles.push(tokio::spawn(async move {
            ingestor.ingest(&ImageRequest::new(url)).await.unwrap()
        }));
    }

    let mut urls = Vec::new();
    for handle in handles {
        urls.push(handle.await.unwrap().asset.public_url);
    }
    urls.dedup();
    assert_eq!(urls.len(), 1);
    assert_eq!(memory.len().await, 1);
}

#[tokio::test]
async fn filesystem_round_trip_is_byte_identical() {
    let origin = Origin::start(vec![("/dish.jpg", image("image/jpeg", JPEG))]);
    let dir = tempdir().unwrap();
    let config = loopback_config();
    let backend = Arc::new(FilesystemStore::new(
        dir.path().to_path_buf(),
        "http://127.0.0.1:8787".into(),
    ));
    let ingestor = with_store(&config, backend);

    let ingested = ingestor
        .ingest(&ImageRequest::new(origin.url("/dish.jpg")))
        .await
        .unwrap();

    let on_disk = std::fs::read(dir.path().join(&ingested.asset.storage_key)).unwrap();
    assert_eq!(on_disk, JPEG);
    let via_store = ingestor
        .store()
        .get(&ingested.asset.storage_key)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(via_store.as_ref(), JPEG);
}

#[tokio::test]
async fn inline_mode_returns_the_bytes() {
    let origin = Origin::start(vec![("/dish.jpg", image("image/jpeg", JPEG))]);
    let mut config = loopback_config();
    config.response.mode = ResponseMode::Inline;
    let (ingestor, _) = ingestor(&config);

    let response = ingestor
        .handle(&ImageRequest::new(origin.url("/dish.jpg")))
        .await;
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.body.as_ref(), JPEG);
    assert_eq!(
        response.header(reqwest::header::CONTENT_TYPE),
        Some("image/jpeg")
    );
}

#[tokio::test]
async fn proxied_url_is_unwrapped_once() {
    let origin = Origin::start(vec![("/dish.jpg", image("image/jpeg", JPEG))]);
    let (ingestor, _) = ingestor(&loopback_config());
    let inner = origin.url("/dish.jpg");

    let once = format!("/image?target={}", urlencoding::encode(&inner));
    assert!(ingestor.ingest(&ImageRequest::new(once.clone())).await.is_ok());

    let twice = format!("/image?target={}", urlencoding::encode(&once));
    let result = ingestor.ingest(&ImageRequest::new(twice)).await;
    assert_eq!(result.unwrap_err().kind(), FailureKind::InvalidUrl);
    assert_eq!(origin.hits(), 1);
}

const FIXTURE_HOST: &str = "images.fixture.example";

fn strict_fetcher(resolver: Arc<dyn HostResolver>) -> HttpFetcher {
    HttpFetcher::with_resolver(
        loopback_config().fetch,
        UrlGuard::new(GuardConfig::default()),
        resolver,
    )
    .unwrap()
}

#[tokio::test]
async fn name_resolving_to_loopback_is_blocked_before_connecting() {
    let origin = Origin::start(vec![("/a.png", image("image/png", PNG))]);
    let resolver = Arc::new(FixedResolver::new().answer(FIXTURE_HOST, &["127.0.0.1"]));
    let guard = UrlGuard::new(GuardConfig::default());
    let fetcher = strict_fetcher(resolver.clone());

    for host in [FIXTURE_HOST, "images.fixture.example."] {
        // The name itself looks public, so the guard lets it through.
        let target = guard.resolve(&origin.url_for_host(host, "/a.png")).unwrap();
        assert_eq!(target.host(), FIXTURE_HOST);

        let err = fetcher.fetch(&target, None).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::BlockedHost, "{host}");
    }
    assert_eq!(resolver.lookups(), 2);
    assert_eq!(origin.hits(), 0);
}

#[tokio::test]
async fn client_connects_to_the_resolved_answer() {
    let origin = Origin::start(vec![("/a.png", image("image/png", PNG))]);
    let resolver = Arc::new(FixedResolver::new().answer(FIXTURE_HOST, &["127.0.0.1"]));
    let permissive = UrlGuard::new(GuardConfig {
        allow_private_hosts: true,
        ..GuardConfig::default()
    });
    let fetcher =
        HttpFetcher::with_resolver(loopback_config().fetch, permissive.clone(), resolver.clone())
            .unwrap();

    for host in [FIXTURE_HOST, "images.fixture.example."] {
        let target = permissive
            .resolve(&origin.url_for_host(host, "/a.png"))
            .unwrap();
        let outcome = fetcher.fetch(&target, None).await.unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body.read_capped().await.unwrap().as_ref(), PNG);
    }
    assert_eq!(origin.hits(), 2);
    assert!(origin
        .requests()
        .iter()
        .all(|r| r.header("host").is_some_and(|h| h.starts_with(FIXTURE_HOST))));
}

#[tokio::test]
async fn rebinding_answer_is_checked_again_at_connect() {
    let origin = Origin::start(vec![("/a.png", image("image/png", PNG))]);
    // First answer passes the pre-connect check, the next one is loopback.
    let resolver = Arc::new(
        FixedResolver::new()
            .answer(FIXTURE_HOST, &["93.184.216.34"])
            .answer(FIXTURE_HOST, &["127.0.0.1"]),
    );
    let fetcher = strict_fetcher(resolver.clone());
    let target = UrlGuard::new(GuardConfig::default())
        .resolve(&origin.url_for_host(FIXTURE_HOST, "/a.png"))
        .unwrap();

    let err = fetcher.fetch(&target, None).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::BlockedHost);
    assert_eq!(resolver.lookups(), 2);
    assert_eq!(origin.hits(), 0);
}
