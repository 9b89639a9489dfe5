//! Gestion des erreurs du cache d'images

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Type Result personnalisé pour pmoimagecache
pub type Result<T> = std::result::Result<T, CacheError>;

/// Erreurs possibles lors de la résolution d'une image en cache
///
/// Le type est `Clone` : un même résultat de téléchargement est partagé
/// entre tous les appelants qui attendaient la même ressource.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Le téléchargement a échoué (DNS, connexion, flux interrompu)
    #[error("Failed to fetch {uri}: {reason}")]
    Transport { uri: String, reason: String },

    /// Le déplacement du fichier temporaire vers son chemin final a échoué
    #[error("Failed to install {from} as {to}: {source}")]
    Install {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// Le répertoire du cache n'a pas pu être créé
    #[error("Cannot create cache directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// Le répertoire du cache n'existe pas
    #[error("{path} not found")]
    NotFound { path: PathBuf },

    /// Erreur d'entrée/sortie sur un chemin du cache
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// La tâche de téléchargement a été interrompue par le runtime
    #[error("Fetch task failed: {0}")]
    Task(String),
}

impl CacheError {
    pub fn transport(uri: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Indique si l'erreur provient du réseau
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
