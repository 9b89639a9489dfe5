//! Coordination des téléchargements d'une entrée du cache
//!
//! Une [`CacheEntry`] existe par clé de cache. Sa méthode
//! [`CacheEntry::resolve`] renvoie le chemin local de la ressource :
//!
//! 1. si le fichier final existe, il est renvoyé sans accès réseau ;
//! 2. sinon la ressource est téléchargée dans un fichier temporaire unique
//!    `{key}-{uuid}{ext}` puis renommée en `{key}{ext}`.
//!
//! Les appels concurrents sur une même entrée partagent un seul
//! téléchargement : le marqueur "en cours" est posé sous verrou, avant le
//! premier point de suspension. Le téléchargement tourne dans une tâche
//! tokio et va à son terme même si tous les appelants abandonnent.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use uuid::Uuid;

use crate::download::{DownloadOptions, DownloadOutcome};
use crate::error::{CacheError, Result};
use crate::key::{derive_key, CacheKey};
use crate::storage::Storage;

type SharedFetch = Shared<BoxFuture<'static, Result<Option<PathBuf>>>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// État transitoire d'une entrée
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Idle,
    Fetching,
}

/// Unité de travail pour une ressource distante
pub struct CacheEntry {
    uri: String,
    options: DownloadOptions,
    key: CacheKey,
    dir: PathBuf,
    storage: Arc<dyn Storage>,
    inflight: Mutex<Option<SharedFetch>>,
    last_download: Mutex<Option<DownloadOutcome>>,
}

/// Remet l'entrée à l'état `Idle` quand la tâche de téléchargement se
/// termine, y compris sur panique.
struct ClearInflight<'a>(&'a CacheEntry);

impl Drop for ClearInflight<'_> {
    fn drop(&mut self) {
        *lock(&self.0.inflight) = None;
    }
}

impl CacheEntry {
    pub(crate) fn new(
        uri: &str,
        options: DownloadOptions,
        dir: PathBuf,
        storage: Arc<dyn Storage>,
    ) -> Arc<Self> {
        let key = derive_key(uri, &options);
        Arc::new(Self {
            uri: uri.to_string(),
            options,
            key,
            dir,
            storage,
            inflight: Mutex::new(None),
            last_download: Mutex::new(None),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    /// Chemin d'installation : `{cache_dir}/{key}{ext}`
    pub fn final_path(&self) -> PathBuf {
        self.dir.join(self.key.file_name())
    }

    fn temp_path(&self) -> PathBuf {
        let suffix = Uuid::new_v4().simple().to_string();
        self.dir.join(self.key.temp_file_name(&suffix))
    }

    pub fn state(&self) -> EntryState {
        if lock(&self.inflight).is_some() {
            EntryState::Fetching
        } else {
            EntryState::Idle
        }
    }

    /// Résultat du dernier téléchargement réussi (statut, taille, condensat)
    pub fn last_download(&self) -> Option<DownloadOutcome> {
        lock(&self.last_download).clone()
    }

    /// Résout la ressource en chemin local
    ///
    /// # Returns
    ///
    /// * `Ok(Some(path))` - fichier présent ou installé
    /// * `Ok(None)` - le serveur a répondu avec un statut non 2xx
    /// * `Err(_)` - échec réseau, d'installation ou d'entrée/sortie
    ///
    /// Dans tous les cas l'entrée revient à l'état `Idle` et un appel
    /// ultérieur peut retenter le téléchargement.
    pub async fn resolve(self: &Arc<Self>) -> Result<Option<PathBuf>> {
        self.join_or_start().await
    }

    /// Attend la fin du téléchargement en cours, s'il y en a un, sans en
    /// démarrer de nouveau
    pub async fn wait_until_finished(&self) {
        let fetch = lock(&self.inflight).clone();
        if let Some(fetch) = fetch {
            let _ = fetch.await;
        }
    }

    fn join_or_start(self: &Arc<Self>) -> SharedFetch {
        let mut inflight = lock(&self.inflight);
        if let Some(fetch) = inflight.as_ref() {
            tracing::debug!(key = %self.key.key, "Joining download already in progress");
            return fetch.clone();
        }

        let entry = Arc::clone(self);
        let task = tokio::spawn(async move {
            let _idle = ClearInflight(&entry);
            entry.fetch().await
        });

        let fetch = async move {
            task.await
                .unwrap_or_else(|e| Err(CacheError::Task(e.to_string())))
        }
        .boxed()
        .shared();

        *inflight = Some(fetch.clone());
        fetch
    }

    async fn fetch(&self) -> Result<Option<PathBuf>> {
        let final_path = self.final_path();

        let info = self
            .storage
            .stat(&final_path)
            .await
            .map_err(|e| CacheError::io(&final_path, e))?;
        if info.exists {
            tracing::debug!(key = %self.key.key, "Cache hit");
            return Ok(Some(final_path));
        }

        self.ensure_cache_dir().await?;

        let tmp_path = self.temp_path();
        tracing::debug!(key = %self.key.key, uri = %self.uri, "Cache miss, downloading");

        let outcome = match self
            .storage
            .download(&self.uri, &tmp_path, &self.options)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(uri = %self.uri, "Download failed: {}", e);
                self.discard(&tmp_path).await;
                return Err(e);
            }
        };

        if !outcome.is_success() {
            tracing::warn!(uri = %self.uri, status = outcome.status, "Download rejected by server");
            self.discard(&tmp_path).await;
            return Ok(None);
        }

        if let Err(e) = self.storage.rename(&tmp_path, &final_path).await {
            tracing::warn!(key = %self.key.key, "Cannot install downloaded file: {}", e);
            self.discard(&tmp_path).await;
            return Err(CacheError::Install {
                from: tmp_path,
                to: final_path,
                source: Arc::new(e),
            });
        }

        tracing::info!(
            key = %self.key.key,
            bytes = outcome.bytes_written,
            "Installed {}",
            final_path.display()
        );
        *lock(&self.last_download) = Some(outcome);

        Ok(Some(final_path))
    }

    /// Crée le répertoire du cache. Un échec n'est pas fatal si le
    /// répertoire existe malgré tout (création concurrente).
    async fn ensure_cache_dir(&self) -> Result<()> {
        let source = match self.storage.create_dir_all(&self.dir).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        match self.storage.stat(&self.dir).await {
            Ok(info) if info.exists && info.is_dir => {
                tracing::debug!(
                    "Ignoring error while creating {}: {}",
                    self.dir.display(),
                    source
                );
                Ok(())
            }
            _ => Err(CacheError::Directory {
                path: self.dir.clone(),
                source: Arc::new(source),
            }),
        }
    }

    async fn discard(&self, tmp_path: &Path) {
        if let Err(e) = self.storage.remove_file(tmp_path).await {
            tracing::warn!("Cannot remove temporary file {}: {}", tmp_path.display(), e);
        }
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("uri", &self.uri)
            .field("key", &self.key)
            .field("dir", &self.dir)
            .field("state", &self.state())
            .finish()
    }
}

/// Accès d'un appelant à une [`CacheEntry`] partagée
///
/// Chaque appel à [`ImageCache::get`](crate::ImageCache::get) renvoie un
/// nouveau handle, avec son propre drapeau d'annulation. Les clones d'un
/// handle partagent ce drapeau.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    entry: Arc<CacheEntry>,
    canceled: Arc<AtomicBool>,
}

impl CacheHandle {
    pub(crate) fn new(entry: Arc<CacheEntry>) -> Self {
        Self {
            entry,
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn entry(&self) -> &Arc<CacheEntry> {
        &self.entry
    }

    pub fn key(&self) -> &CacheKey {
        self.entry.key()
    }

    pub fn final_path(&self) -> PathBuf {
        self.entry.final_path()
    }

    /// Vrai si les deux handles pointent sur la même entrée
    pub fn same_entry(&self, other: &CacheHandle) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }

    /// Résout la ressource en chemin local
    ///
    /// Renvoie `Ok(None)` si le handle a été annulé avant la fin du
    /// téléchargement, même si le fichier a été installé.
    pub async fn resolve_path(&self) -> Result<Option<PathBuf>> {
        let result = self.entry.resolve().await;
        if self.is_canceled() {
            tracing::debug!(key = %self.entry.key.key, "Resolution canceled by caller");
            return Ok(None);
        }
        result
    }

    /// Annulation coopérative : le transfert continue, seul le résultat
    /// rapporté à ce handle change.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}
