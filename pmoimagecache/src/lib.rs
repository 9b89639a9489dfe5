//! # pmoimagecache - Cache disque des images distantes
//!
//! Cette crate fournit un cache adressé par contenu pour les ressources
//! téléchargées (images), destiné à une couche UI qui demande sans cesse
//! « donne-moi un chemin local pour la ressource X ».
//!
//! ## Fonctionnalités
//!
//! - Clé de cache dérivée de l'URI (SHA1), extension tirée du chemin
//! - Vérification de présence avant tout téléchargement
//! - Téléchargement dans un fichier temporaire puis installation par renommage
//! - Déduplication : N demandes concurrentes pour une même ressource
//!   déclenchent un seul téléchargement
//! - Annulation coopérative par handle
//! - Vidage complet, suppression d'une entrée, taille du cache
//!
//! ## Architecture
//!
//! ```text
//! pmoimagecache
//!     ├── key.rs       - Dérivation clé + extension
//!     ├── storage.rs   - Trait Storage + LocalStorage (tokio::fs, reqwest)
//!     ├── download.rs  - Téléchargement HTTP en flux
//!     ├── entry.rs     - CacheEntry (coordination) et CacheHandle
//!     ├── cache.rs     - ImageCache (registre, callbacks, administration)
//!     └── config.rs    - Configuration YAML + variables d'environnement
//! ```
//!
//! ## Structure des fichiers
//!
//! ```text
//! {base_dir}/expo-image-cache/
//! ├── 0b7c...e1.png                 # fichier installé {key}{ext}
//! └── 0b7c...e1-5f2a...9c.png       # téléchargement en cours {key}-{uuid}{ext}
//! ```
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use pmoimagecache::{DownloadOptions, ImageCache, ImageCacheConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = ImageCache::new(&ImageCacheConfig::with_base_dir("./cache"));
//!
//!     let handle = cache.get("https://example.com/cover.png", DownloadOptions::default());
//!     match handle.resolve_path().await? {
//!         Some(path) => println!("Image en cache : {path:?}"),
//!         None => println!("Image indisponible, afficher le placeholder"),
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use once_cell::sync::OnceCell;

pub mod cache;
pub mod config;
pub mod download;
pub mod entry;
pub mod error;
pub mod key;
pub mod storage;

pub use cache::{ImageCache, ImageSource, Listener};
pub use config::{ImageCacheConfig, DEFAULT_DIRECTORY_NAME};
pub use download::{DownloadOptions, DownloadOutcome};
pub use entry::{CacheEntry, CacheHandle, EntryState};
pub use error::{CacheError, Result};
pub use key::{derive_extension, derive_key, CacheKey, DEFAULT_EXTENSION};
pub use storage::{FileInfo, LocalStorage, Storage};

// ============================================================================
// Registre global singleton
// ============================================================================

static IMAGE_CACHE: OnceCell<Arc<ImageCache>> = OnceCell::new();

/// Enregistre le cache d'images global
///
/// Optionnel : [`ImageCache`] s'utilise très bien passé explicitement.
/// Si appelée plusieurs fois, seul le premier appel prend effet.
///
/// # Returns
///
/// `false` si un cache était déjà enregistré
pub fn register_image_cache(cache: Arc<ImageCache>) -> bool {
    IMAGE_CACHE.set(cache).is_ok()
}

/// Accès au cache enregistré via [`register_image_cache`]
pub fn get_image_cache() -> Option<Arc<ImageCache>> {
    IMAGE_CACHE.get().cloned()
}
