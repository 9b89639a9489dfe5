//! Téléchargement HTTP d'une ressource vers un fichier
//!
//! Le flux de la réponse est écrit chunk par chunk dans le fichier de
//! destination. Ce fichier est toujours un chemin temporaire : c'est le
//! coordinateur qui l'installe ensuite à son emplacement final.

use std::collections::BTreeMap;
use std::path::Path;

use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::{CacheError, Result};

/// Options d'une requête de téléchargement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// En-têtes HTTP envoyés avec la requête (triés par nom)
    pub headers: BTreeMap<String, String>,
    /// Calculer un condensat SHA256 des octets reçus
    pub checksum: bool,
    /// Clé de cache explicite, remplace l'URI dans le calcul de la clé
    pub cache_key: Option<String>,
}

impl DownloadOptions {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_checksum(mut self) -> Self {
        self.checksum = true;
        self
    }
}

/// Résultat d'un téléchargement qui a abouti au niveau transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Code de statut HTTP
    pub status: u16,
    /// Nombre d'octets écrits dans le fichier de destination
    pub bytes_written: u64,
    /// Condensat SHA256 hexadécimal, si demandé
    pub checksum: Option<String>,
}

impl DownloadOutcome {
    /// Statut 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Télécharge `uri` dans `dest`
///
/// Un statut non 2xx n'est pas une erreur : il est rapporté dans
/// [`DownloadOutcome`] et le corps de la réponse n'est pas écrit.
pub async fn download_to_file(
    client: &reqwest::Client,
    uri: &str,
    dest: &Path,
    options: &DownloadOptions,
) -> Result<DownloadOutcome> {
    let mut request = client.get(uri);
    for (name, value) in &options.headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let response = request
        .send()
        .await
        .map_err(|e| CacheError::transport(uri, e))?;

    let status = response.status();
    if !status.is_success() {
        tracing::debug!(uri, status = status.as_u16(), "Download returned non-success status");
        return Ok(DownloadOutcome {
            status: status.as_u16(),
            bytes_written: 0,
            checksum: None,
        });
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| CacheError::io(dest, e))?;

    let mut hasher = options.checksum.then(Sha256::new);
    let mut bytes_written = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| CacheError::transport(uri, e))?;

        file.write_all(&chunk)
            .await
            .map_err(|e| CacheError::io(dest, e))?;

        if let Some(hasher) = hasher.as_mut() {
            hasher.update(&chunk);
        }
        bytes_written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| CacheError::io(dest, e))?;

    Ok(DownloadOutcome {
        status: status.as_u16(),
        bytes_written,
        checksum: hasher.map(|h| hex::encode(h.finalize())),
    })
}
