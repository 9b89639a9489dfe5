//! Example: resolve remote images through the disk cache
//!
//! Run with: cargo run -p pmoimagecache --example fetch_image -- https://example.com/a.png
//! Use RUST_LOG=pmoimagecache=debug to follow hits, misses and installs.

use std::env;
use std::sync::Arc;

use pmoimagecache::{DownloadOptions, ImageCache, ImageCacheConfig, ImageSource};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let uris: Vec<String> = env::args().skip(1).collect();
    if uris.is_empty() {
        eprintln!("usage: fetch_image <uri>...");
        return Ok(());
    }

    let config = ImageCacheConfig::load("pmoimagecache.yaml")?;
    let cache = Arc::new(ImageCache::new(&config));
    println!("Cache directory: {}\n", cache.cache_dir().display());

    // Twice each: the second pass must be served from disk
    for pass in 1..=2 {
        println!("Pass {pass}:");
        for uri in &uris {
            let handle = cache.get(uri, DownloadOptions::default());
            match handle.resolve_path().await {
                Ok(Some(path)) => println!("  {uri} -> {}", path.display()),
                Ok(None) => println!("  {uri} -> unavailable"),
                Err(e) => println!("  {uri} -> error: {e}"),
            }
        }
    }

    // Callback flavour, all requests share one download per uri
    let requests = uris.iter().map(|uri| {
        let label = uri.clone();
        cache.request(uri, DownloadOptions::default(), move |source| match source {
            ImageSource::Local(path) => println!("  callback {label}: {}", path.display()),
            ImageSource::Remote(original) => println!("  callback {label}: fallback {original}"),
        })
    });
    futures::future::join_all(requests).await;

    match cache.cache_size().await {
        Ok(size) => println!("\nCache size: {size} bytes"),
        Err(e) => println!("\nCache size unavailable: {e}"),
    }

    Ok(())
}
