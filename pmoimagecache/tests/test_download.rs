//! Téléchargements réels contre un serveur HTTP local

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pmoimagecache::{
    download::download_to_file, DownloadOptions, ImageCache, ImageCacheConfig, LocalStorage,
    Storage,
};

const BODY: &[u8] = b"\x89PNG served over http";

async fn serve_image(server: &MockServer, route: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_download_writes_body() {
    let server = MockServer::start().await;
    serve_image(&server, "/img.png").await;
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("img.png");

    let client = reqwest::Client::new();
    let uri = format!("{}/img.png", server.uri());
    let outcome = download_to_file(&client, &uri, &dest, &DownloadOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.bytes_written, BODY.len() as u64);
    assert_eq!(outcome.checksum, None);
    assert_eq!(std::fs::read(&dest).unwrap(), BODY);
}

#[tokio::test]
async fn test_download_sends_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private.png"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .expect(1)
        .mount(&server)
        .await;
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("private.png");

    let options = DownloadOptions::default().with_header("Authorization", "Bearer secret");
    let uri = format!("{}/private.png", server.uri());
    let outcome = download_to_file(&reqwest::Client::new(), &uri, &dest, &options)
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert!(dest.exists());
}

#[tokio::test]
async fn test_download_checksum() {
    let server = MockServer::start().await;
    serve_image(&server, "/sum.png").await;
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("sum.png");

    let options = DownloadOptions::default().with_checksum();
    let uri = format!("{}/sum.png", server.uri());
    let outcome = download_to_file(&reqwest::Client::new(), &uri, &dest, &options)
        .await
        .unwrap();

    assert_eq!(outcome.checksum, Some(hex::encode(Sha256::digest(BODY))));
}

#[tokio::test]
async fn test_download_not_found_creates_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("missing.png");

    let uri = format!("{}/missing.png", server.uri());
    let outcome = download_to_file(&reqwest::Client::new(), &uri, &dest, &DownloadOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.status, 404);
    assert_eq!(outcome.bytes_written, 0);
    assert!(!outcome.is_success());
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_download_connection_refused() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("refused.png");

    let err = download_to_file(
        &reqwest::Client::new(),
        "http://127.0.0.1:1/img.png",
        &dest,
        &DownloadOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(err.is_transport());
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_local_storage_download_and_stat() {
    let server = MockServer::start().await;
    serve_image(&server, "/local.png").await;
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("local.png");
    let storage = LocalStorage::new();

    assert!(!storage.stat(&dest).await.unwrap().exists);

    let uri = format!("{}/local.png", server.uri());
    let outcome = storage
        .download(&uri, &dest, &DownloadOptions::default())
        .await
        .unwrap();
    assert!(outcome.is_success());

    let info = storage.stat(&dest).await.unwrap();
    assert!(info.exists);
    assert!(!info.is_dir);
    assert_eq!(info.size, BODY.len() as u64);
}

#[tokio::test]
async fn test_image_cache_downloads_once_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cover.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .expect(1)
        .mount(&server)
        .await;
    let temp_dir = TempDir::new().unwrap();
    let cache = ImageCache::new(&ImageCacheConfig::with_base_dir(temp_dir.path()));
    let uri = format!("{}/cover.png", server.uri());

    let first = cache
        .get(&uri, DownloadOptions::default())
        .resolve_path()
        .await
        .unwrap()
        .unwrap();
    let second = cache
        .get(&uri, DownloadOptions::default())
        .resolve_path()
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first, second);
    assert!(first.starts_with(temp_dir.path()));
    assert_eq!(first.extension().and_then(|e| e.to_str()), Some("png"));
    assert_eq!(std::fs::read(&first).unwrap(), BODY);
}
