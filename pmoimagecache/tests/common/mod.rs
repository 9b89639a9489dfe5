//! Stockage de test : système de fichiers réel, réseau simulé.

#![allow(dead_code)]

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pmoimagecache::{
    CacheError, DownloadOptions, DownloadOutcome, FileInfo, ImageCache, ImageCacheConfig,
    LocalStorage, Storage,
};
use tempfile::TempDir;

pub const BODY: &[u8] = b"\x89PNG fake image bytes";

pub struct FakeStorage {
    local: LocalStorage,
    pub downloads: AtomicUsize,
    pub status: AtomicU16,
    pub fail_transport: AtomicBool,
    pub fail_rename: AtomicBool,
    pub fail_mkdir: AtomicBool,
    pub delay: Duration,
}

impl FakeStorage {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::from_millis(0))
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            local: LocalStorage::new(),
            downloads: AtomicUsize::new(0),
            status: AtomicU16::new(200),
            fail_transport: AtomicBool::new(false),
            fail_rename: AtomicBool::new(false),
            fail_mkdir: AtomicBool::new(false),
            delay,
        })
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for FakeStorage {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        if self.fail_mkdir.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.local.create_dir_all(path).await
    }

    async fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        self.local.stat(path).await
    }

    async fn download(
        &self,
        uri: &str,
        dest: &Path,
        _options: &DownloadOptions,
    ) -> pmoimagecache::Result<DownloadOutcome> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail_transport.load(Ordering::SeqCst) {
            // Fichier partiel laissé par un flux interrompu
            tokio::fs::write(dest, &BODY[..4]).await.unwrap();
            return Err(CacheError::transport(uri, "connection reset"));
        }

        let status = self.status.load(Ordering::SeqCst);
        if !(200..300).contains(&status) {
            return Ok(DownloadOutcome {
                status,
                bytes_written: 0,
                checksum: None,
            });
        }

        tokio::fs::write(dest, BODY).await.unwrap();
        Ok(DownloadOutcome {
            status,
            bytes_written: BODY.len() as u64,
            checksum: None,
        })
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.fail_rename.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        }
        self.local.rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.local.remove_file(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.local.remove_dir_all(path).await
    }

    async fn dir_size(&self, path: &Path) -> io::Result<u64> {
        self.local.dir_size(path).await
    }
}

pub fn create_test_cache(storage: Arc<FakeStorage>) -> (TempDir, ImageCache) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = ImageCacheConfig::with_base_dir(temp_dir.path());
    let cache = ImageCache::with_storage(&config, storage);
    (temp_dir, cache)
}

/// Noms des fichiers présents dans le répertoire du cache
pub fn cache_files(cache: &ImageCache) -> Vec<String> {
    match std::fs::read_dir(cache.cache_dir()) {
        Ok(entries) => {
            let mut names: Vec<String> = entries
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect();
            names.sort();
            names
        }
        Err(_) => Vec::new(),
    }
}
