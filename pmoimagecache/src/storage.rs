//! Abstraction du stockage utilisé par le cache
//!
//! Le trait [`Storage`] regroupe toutes les opérations d'entrée/sortie du
//! cache : système de fichiers et téléchargement réseau. [`LocalStorage`] en
//! est l'implémentation réelle (tokio::fs + reqwest) ; les tests peuvent
//! fournir la leur.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::download::{download_to_file, DownloadOptions, DownloadOutcome};
use crate::error::Result;

/// Informations sur un chemin du stockage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub exists: bool,
    pub is_dir: bool,
    /// Taille en octets (fichiers uniquement)
    pub size: Option<u64>,
}

impl FileInfo {
    pub fn missing() -> Self {
        Self::default()
    }
}

/// Opérations de stockage nécessaires au cache
///
/// Toutes les suppressions sont idempotentes : supprimer un chemin absent
/// n'est pas une erreur.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Crée un répertoire et ses parents
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Interroge un chemin. Un chemin absent donne `exists == false`,
    /// jamais une erreur.
    async fn stat(&self, path: &Path) -> io::Result<FileInfo>;

    /// Télécharge `uri` dans `dest`
    async fn download(
        &self,
        uri: &str,
        dest: &Path,
        options: &DownloadOptions,
    ) -> Result<DownloadOutcome>;

    /// Renomme `from` en `to` (installation atomique)
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Taille cumulée des fichiers sous `path`.
    /// Erreur `NotFound` si le répertoire n'existe pas.
    async fn dir_size(&self, path: &Path) -> io::Result<u64>;
}

/// Stockage sur le système de fichiers local avec téléchargement HTTP
#[derive(Debug, Clone, Default)]
pub struct LocalStorage {
    client: reqwest::Client,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Utilise un client HTTP préconfiguré (proxy, user-agent, timeout...)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn stat(&self, path: &Path) -> io::Result<FileInfo> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(FileInfo {
                exists: true,
                is_dir: metadata.is_dir(),
                size: metadata.is_file().then(|| metadata.len()),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileInfo::missing()),
            Err(e) => Err(e),
        }
    }

    async fn download(
        &self,
        uri: &str,
        dest: &Path,
        options: &DownloadOptions,
    ) -> Result<DownloadOutcome> {
        download_to_file(&self.client, uri, dest, options).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        ignore_not_found(tokio::fs::remove_file(path).await)
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        ignore_not_found(tokio::fs::remove_dir_all(path).await)
    }

    async fn dir_size(&self, path: &Path) -> io::Result<u64> {
        let mut total = 0u64;
        let mut pending: Vec<PathBuf> = vec![path.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    pending.push(entry.path());
                } else if metadata.is_file() {
                    total += metadata.len();
                }
            }
        }

        Ok(total)
    }
}
