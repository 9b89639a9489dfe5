//! Façade du cache d'images
//!
//! [`ImageCache`] est le point d'entrée de la couche UI. Il maintient le
//! registre des entrées (une par clé de cache), les files d'attente des
//! requêtes à callback, et les opérations d'administration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::config::ImageCacheConfig;
use crate::download::DownloadOptions;
use crate::entry::{lock, CacheEntry, CacheHandle};
use crate::error::{CacheError, Result};
use crate::key::derive_key;
use crate::storage::{LocalStorage, Storage};

/// Valeur transmise aux callbacks de [`ImageCache::request`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Fichier local installé dans le cache
    Local(PathBuf),
    /// Identifiant d'origine, quand la ressource n'a pas pu être mise en cache
    Remote(String),
}

impl ImageSource {
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Local(path) => Some(path),
            Self::Remote(_) => None,
        }
    }
}

/// Callback appelé une fois qu'une requête est résolue
pub type Listener = Box<dyn FnOnce(ImageSource) + Send>;

/// Cache disque des images distantes
///
/// Note : ce type est conçu pour être partagé derrière un `Arc<ImageCache>`.
pub struct ImageCache {
    /// Répertoire du cache (`{base_dir}/{directory_name}`)
    dir: RwLock<PathBuf>,
    /// Nom du sous-répertoire, conservé pour `set_base_dir`
    directory_name: String,
    storage: Arc<dyn Storage>,
    /// Registre des entrées (clé -> entrée)
    entries: Mutex<HashMap<String, Arc<CacheEntry>>>,
    /// Callbacks en attente d'un téléchargement (clé -> callbacks)
    listeners: Arc<Mutex<HashMap<String, Vec<Listener>>>>,
}

impl ImageCache {
    /// Crée un cache sur le système de fichiers local
    pub fn new(config: &ImageCacheConfig) -> Self {
        Self::with_storage(config, Arc::new(LocalStorage::new()))
    }

    /// Crée un cache avec un stockage fourni par l'appelant
    pub fn with_storage(config: &ImageCacheConfig, storage: Arc<dyn Storage>) -> Self {
        let dir = config.cache_dir();
        tracing::debug!("Image cache directory: {}", dir.display());
        Self {
            dir: RwLock::new(dir),
            directory_name: config.directory_name.clone(),
            storage,
            entries: Mutex::new(HashMap::new()),
            listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Répertoire courant du cache
    pub fn cache_dir(&self) -> PathBuf {
        self.dir
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Change le répertoire de base du cache
    ///
    /// Les fichiers déjà en cache ne sont pas migrés. Le registre est vidé
    /// pour que les nouvelles entrées utilisent le nouveau répertoire ; les
    /// handles existants continuent d'utiliser l'ancien.
    pub fn set_base_dir(&self, base_dir: impl AsRef<Path>) {
        let dir = base_dir.as_ref().join(&self.directory_name);
        tracing::info!("Image cache directory changed to {}", dir.display());
        *self
            .dir
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = dir;
        lock(&self.entries).clear();
    }

    /// Nombre d'entrées enregistrées
    pub fn entry_count(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Renvoie un handle sur l'entrée de la ressource, créée au besoin
    ///
    /// Deux appels avec le même identifiant et les mêmes options partagent
    /// la même entrée, donc le même téléchargement.
    pub fn get(&self, identifier: &str, options: DownloadOptions) -> CacheHandle {
        let key = derive_key(identifier, &options);
        let mut entries = lock(&self.entries);
        let entry = entries
            .entry(key.key)
            .or_insert_with(|| {
                tracing::debug!(uri = identifier, "New cache entry");
                CacheEntry::new(identifier, options, self.cache_dir(), self.storage.clone())
            })
            .clone();
        CacheHandle::new(entry)
    }

    /// Variante à callback de [`get`](Self::get)
    ///
    /// Si un téléchargement est déjà en cours pour cette ressource, le
    /// callback est mis en file d'attente et la méthode rend la main aussitôt.
    /// Sinon, si le fichier est présent, le callback est appelé tout de suite.
    /// Sinon la ressource est téléchargée et tous les callbacks en attente sont
    /// appelés une fois chacun, dans leur ordre d'arrivée, avec le chemin local
    /// ou, en cas d'échec, l'identifiant d'origine.
    pub async fn request<F>(&self, identifier: &str, options: DownloadOptions, callback: F)
    where
        F: FnOnce(ImageSource) + Send + 'static,
    {
        let key = derive_key(identifier, &options).key;
        let callback: Listener = Box::new(callback);

        if let Some(queue) = lock(&self.listeners).get_mut(&key) {
            tracing::debug!(uri = identifier, "Queued behind download in progress");
            queue.push(callback);
            return;
        }

        let handle = self.get(identifier, options);
        let final_path = handle.final_path();
        match self.storage.stat(&final_path).await {
            Ok(info) if info.exists => {
                callback(ImageSource::Local(final_path));
                return;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Cannot stat {}: {}", final_path.display(), e),
        }

        {
            let mut listeners = lock(&self.listeners);
            if let Some(queue) = listeners.get_mut(&key) {
                queue.push(callback);
                return;
            }
            listeners.insert(key.clone(), vec![callback]);
        }

        // La notification tourne dans sa propre tâche : si l'appelant
        // abandonne ce future, les callbacks en file sont quand même appelés
        // et la file est retirée.
        let listeners = Arc::clone(&self.listeners);
        let identifier = identifier.to_string();
        let notify = tokio::spawn(async move {
            let source = match handle.resolve_path().await {
                Ok(Some(path)) => ImageSource::Local(path),
                Ok(None) => ImageSource::Remote(identifier.clone()),
                Err(e) => {
                    tracing::warn!(uri = %identifier, "Falling back to remote source: {}", e);
                    ImageSource::Remote(identifier.clone())
                }
            };

            let queued = lock(&listeners).remove(&key).unwrap_or_default();
            tracing::debug!(uri = %identifier, waiting = queued.len(), "Notifying listeners");

            for listener in queued {
                listener(source.clone());
            }
        });

        if let Err(e) = notify.await {
            tracing::warn!("Listener notification task failed: {}", e);
        }
    }

    /// Supprime une entrée et son fichier installé
    ///
    /// Un téléchargement en cours pour cette entrée est attendu avant la
    /// suppression, pour qu'il ne réinstalle pas le fichier ensuite.
    ///
    /// # Returns
    ///
    /// `true` si un fichier était présent
    pub async fn remove_entry(&self, identifier: &str, options: &DownloadOptions) -> Result<bool> {
        let key = derive_key(identifier, options);
        let entry = lock(&self.entries).remove(&key.key);
        let path = match entry {
            Some(entry) => {
                entry.wait_until_finished().await;
                entry.final_path()
            }
            None => self.cache_dir().join(key.file_name()),
        };

        let info = self
            .storage
            .stat(&path)
            .await
            .map_err(|e| CacheError::io(&path, e))?;
        self.storage
            .remove_file(&path)
            .await
            .map_err(|e| CacheError::io(&path, e))?;

        tracing::debug!(uri = identifier, removed = info.exists, "Cache entry removed");
        Ok(info.exists)
    }

    /// Supprime tous les fichiers du cache puis recrée le répertoire vide
    ///
    /// Le registre est aussi vidé : les prochains `get` repartent d'un
    /// cache froid.
    pub async fn clear_cache(&self) -> Result<()> {
        let dir = self.cache_dir();
        self.storage
            .remove_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(&dir, e))?;
        self.storage
            .create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::Directory {
                path: dir.clone(),
                source: Arc::new(e),
            })?;
        lock(&self.entries).clear();

        tracing::info!("Image cache cleared: {}", dir.display());
        Ok(())
    }

    /// Taille cumulée des fichiers du cache, en octets
    pub async fn cache_size(&self) -> Result<u64> {
        let dir = self.cache_dir();
        match self.storage.dir_size(&dir).await {
            Ok(size) => Ok(size),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CacheError::NotFound { path: dir })
            }
            Err(e) => Err(CacheError::io(&dir, e)),
        }
    }
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("dir", &self.cache_dir())
            .field("entries", &self.entry_count())
            .finish()
    }
}
