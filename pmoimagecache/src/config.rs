//! Configuration du cache d'images
//!
//! La configuration est lue depuis un fichier YAML optionnel, puis
//! surchargée par les variables d'environnement préfixées par
//! `PMOIMAGECACHE_CONFIG__` (ex: `PMOIMAGECACHE_CONFIG__BASE_DIR=/var/cache`).
//!
//! ```yaml
//! base_dir: /var/cache/myapp
//! directory_name: expo-image-cache
//! ```

use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

const ENV_PREFIX: &str = "PMOIMAGECACHE_CONFIG__";

/// Nom par défaut du répertoire du cache sous `base_dir`
pub const DEFAULT_DIRECTORY_NAME: &str = "expo-image-cache";

/// Paramètres du cache d'images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageCacheConfig {
    /// Répertoire de base. Par défaut, le répertoire de cache de la
    /// plateforme (`dirs::cache_dir()`), ou le répertoire temporaire.
    pub base_dir: Option<PathBuf>,
    /// Sous-répertoire possédé exclusivement par le cache
    pub directory_name: String,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            directory_name: DEFAULT_DIRECTORY_NAME.to_string(),
        }
    }
}

impl ImageCacheConfig {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            ..Self::default()
        }
    }

    /// Charge la configuration depuis un fichier YAML
    ///
    /// Un fichier absent n'est pas une erreur : les valeurs par défaut sont
    /// utilisées. Les variables d'environnement sont appliquées ensuite.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = match fs::read_to_string(path) {
            Ok(yaml) => {
                info!(config_file=%path.display(), "Loaded image cache config");
                Self::from_yaml_str(&yaml)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(config_file=%path.display(), "Config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Cannot read {}", path.display()));
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(env::vars());
    }

    fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name.to_lowercase().as_str() {
                "base_dir" => self.base_dir = Some(PathBuf::from(value)),
                "directory_name" => self.directory_name = value,
                other => tracing::warn!("Unknown image cache setting {}", other),
            }
        }
    }

    /// Répertoire de base effectif
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir
            .clone()
            .or_else(dirs::cache_dir)
            .unwrap_or_else(env::temp_dir)
    }

    /// Répertoire du cache : `{base_dir}/{directory_name}`
    pub fn cache_dir(&self) -> PathBuf {
        self.base_dir().join(&self.directory_name)
    }
}
