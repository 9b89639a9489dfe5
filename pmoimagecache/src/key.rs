//! Dérivation des clés de cache
//!
//! Une ressource distante est identifiée par son URI. La clé de cache est le
//! hash SHA1 (hexadécimal) de la source de clé :
//!
//! - `options.cache_key` si l'appelant en fournit une, sinon l'URI ;
//! - suivie des en-têtes HTTP triés (`nom:valeur`, un par ligne) lorsqu'il y
//!   en a, car deux jeux d'en-têtes différents peuvent produire des octets
//!   différents.
//!
//! L'option `checksum` n'entre jamais dans la clé.
//!
//! L'extension est toujours tirée de l'URI, jamais de `cache_key`.

use sha1::{Digest, Sha1};

use crate::download::DownloadOptions;

/// Extension utilisée quand le chemin de l'URI n'en porte pas
pub const DEFAULT_EXTENSION: &str = ".jpg";

/// Clé de cache et extension dérivées d'une ressource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Hash SHA1 hexadécimal (40 caractères)
    pub key: String,
    /// Extension avec son point (ex: `".png"`)
    pub extension: String,
}

impl CacheKey {
    /// Nom du fichier installé : `{key}{ext}`
    pub fn file_name(&self) -> String {
        format!("{}{}", self.key, self.extension)
    }

    /// Nom du fichier temporaire : `{key}-{suffix}{ext}`
    pub fn temp_file_name(&self, suffix: &str) -> String {
        format!("{}-{}{}", self.key, suffix, self.extension)
    }
}

/// Dérive la clé et l'extension d'une ressource
///
/// # Exemple
///
/// ```
/// use pmoimagecache::{derive_key, DownloadOptions};
///
/// let k = derive_key("https://ex.com/img.png?v=2", &DownloadOptions::default());
/// assert_eq!(k.key.len(), 40);
/// assert_eq!(k.extension, ".png");
/// ```
pub fn derive_key(identifier: &str, options: &DownloadOptions) -> CacheKey {
    let mut hasher = Sha1::new();
    hasher.update(options.cache_key.as_deref().unwrap_or(identifier).as_bytes());
    for (name, value) in &options.headers {
        hasher.update(b"\n");
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
    }

    CacheKey {
        key: hex::encode(hasher.finalize()),
        extension: derive_extension(identifier),
    }
}

/// Extrait l'extension du dernier segment de chemin d'une URI
///
/// La query string est retirée avant d'inspecter le segment.
pub fn derive_extension(identifier: &str) -> String {
    let segment = identifier
        .rsplit_once('/')
        .map_or(identifier, |(_, last)| last);
    let segment = segment.split_once('?').map_or(segment, |(path, _)| path);

    match segment.rfind('.') {
        Some(dot) => segment[dot..].to_string(),
        None => DEFAULT_EXTENSION.to_string(),
    }
}
