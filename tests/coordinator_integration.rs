//! End-to-end coverage of the cache -> disk -> network chain against a real
//! HTTP transport pointed at a local `wiremock` server.

use std::time::Duration;

use image::{Rgba, RgbaImage};
use imgdl::{CacheTier, ConfigBuilder, Coordinator, DownloadPriority, DownloaderError, RequestOptions};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(w, h, Rgba([42, 7, 99, 255]));
    let dynamic = image::DynamicImage::ImageRgba8(img);
    let mut buf = std::io::Cursor::new(Vec::new());
    dynamic.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

async fn coordinator_with_root(root: &std::path::Path) -> Coordinator {
    let config = ConfigBuilder::new()
        .root_path(root)
        .timeout(Duration::from_secs(5))
        .build()
        .expect("config builds");
    Coordinator::new(config)
}

fn options() -> RequestOptions {
    RequestOptions {
        update_tier: CacheTier::High,
        download_priority: DownloadPriority::High,
        save_to_disk: Some(true),
    }
}

#[tokio::test]
async fn network_success_is_persisted_to_disk() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(4, 4)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator_with_root(dir.path()).await;
    let url = format!("{}/a.png", server.uri());

    let completion = coordinator
        .request(&url, options(), None, imgdl::new_caller_token())
        .await;
    assert!(matches!(completion, imgdl::Completion::Success { .. }));

    // The disk write happens on a spawned task; give it a moment.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(coordinator.disk_file_count().await >= 1);
}

#[tokio::test]
async fn second_request_is_served_from_memory_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/b.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(2, 2)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator_with_root(dir.path()).await;
    let url = format!("{}/b.png", server.uri());

    let first = coordinator.request(&url, options(), None, imgdl::new_caller_token()).await;
    assert!(matches!(first, imgdl::Completion::Success { from_cache: false, .. }));

    let second = coordinator.request(&url, options(), None, imgdl::new_caller_token()).await;
    assert!(matches!(second, imgdl::Completion::Success { from_cache: true, .. }));
}

#[tokio::test]
async fn fresh_coordinator_promotes_from_disk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/c.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(3, 3)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/c.png", server.uri());

    let first_coordinator = coordinator_with_root(dir.path()).await;
    let first = first_coordinator
        .request(&url, options(), None, imgdl::new_caller_token())
        .await;
    assert!(matches!(first, imgdl::Completion::Success { .. }));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A brand new coordinator (empty memory cache) sharing the same disk
    // root should find the entry on disk instead of hitting the network
    // again -- wiremock's `expect(1)` would fail the test otherwise.
    let second_coordinator = coordinator_with_root(dir.path()).await;
    let second = second_coordinator
        .request(&url, options(), None, imgdl::new_caller_token())
        .await;
    assert!(matches!(
        second,
        imgdl::Completion::Success {
            from_cache: false,
            from_storage: true,
            ..
        }
    ));
}

#[tokio::test]
async fn concurrent_requests_for_same_url_share_one_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/d.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(5, 5)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let coordinator = std::sync::Arc::new(coordinator_with_root(dir.path()).await);
    let url = format!("{}/d.png", server.uri());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = coordinator.clone();
        let url = url.clone();
        handles.push(tokio::spawn(async move {
            coordinator.request(&url, options(), None, imgdl::new_caller_token()).await
        }));
    }
    for handle in handles {
        let completion = handle.await.unwrap();
        assert!(matches!(completion, imgdl::Completion::Success { .. }));
    }
}

#[tokio::test]
async fn transient_server_error_is_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/e.png"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/e.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(2, 2)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new()
        .root_path(dir.path())
        .timeout(Duration::from_secs(5))
        .retry_policy(imgdl::RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(50),
        })
        .build()
        .expect("config builds");
    let coordinator = Coordinator::new(config);
    let url = format!("{}/e.png", server.uri());

    let completion = coordinator.request(&url, options(), None, imgdl::new_caller_token()).await;
    assert!(matches!(completion, imgdl::Completion::Success { .. }));
}

#[tokio::test]
async fn progress_sink_receives_a_terminal_tick_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/f.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(2, 2)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator_with_root(dir.path()).await;
    let url = format!("{}/f.png", server.uri());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let completion = coordinator.request(&url, options(), Some(tx), imgdl::new_caller_token()).await;
    assert!(matches!(completion, imgdl::Completion::Success { .. }));

    let mut saw_terminal_progress = false;
    while let Ok(value) = rx.try_recv() {
        if value >= 1.0 {
            saw_terminal_progress = true;
        }
    }
    assert!(saw_terminal_progress, "expected at least one progress tick reaching 1.0");
}

#[tokio::test]
async fn not_found_is_delivered_as_terminal_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator_with_root(dir.path()).await;
    let url = format!("{}/missing.png", server.uri());

    let completion = coordinator.request(&url, options(), None, imgdl::new_caller_token()).await;
    match completion {
        imgdl::Completion::Failure(DownloaderError::NotFound { .. }) => {}
        _ => panic!("expected a terminal not-found failure"),
    }
}

#[tokio::test]
async fn request_options_defer_to_save_by_default_when_unset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/g.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(2, 2)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = ConfigBuilder::new()
        .root_path(dir.path())
        .timeout(Duration::from_secs(5))
        .build()
        .expect("config builds");
    assert!(config.storage.save_by_default, "default config saves by default");
    let coordinator = Coordinator::new(config);
    let url = format!("{}/g.png", server.uri());

    let completion = coordinator
        .request(&url, RequestOptions::default(), None, imgdl::new_caller_token())
        .await;
    assert!(matches!(completion, imgdl::Completion::Success { .. }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        coordinator.disk_file_count().await >= 1,
        "save_by_default=true should persist to disk when the caller doesn't override save_to_disk"
    );
}

#[tokio::test]
async fn failed_download_delivers_no_progress_ticks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/h.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator_with_root(dir.path()).await;
    let url = format!("{}/h.png", server.uri());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let completion = coordinator.request(&url, options(), Some(tx), imgdl::new_caller_token()).await;
    assert!(matches!(completion, imgdl::Completion::Failure(DownloaderError::NotFound { .. })));
    assert!(
        rx.try_recv().is_err(),
        "a failed download must not deliver any progress ticks, including a bogus terminal 1.0"
    );
}
