//! Configuration file discovery and loading.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;
use tracing::{info, warn};

use super::app_config::AppConfig;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration loading failure.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("failed to determine config directory")]
    ConfigDirNotFound,
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl ConfigError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads `config.toml`, creating it with defaults on first run.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// Resolves the config file: `path_override` if given, else
    /// `config.toml` in the platform config directory.
    ///
    /// # Errors
    /// Returns [`ConfigError::ConfigDirNotFound`] if there is no override and
    /// the platform directory cannot be determined.
    pub fn new(path_override: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path_override {
            return Ok(Self::with_path(path.to_path_buf()));
        }
        let dirs = ProjectDirs::from("com", "linuxmobile", crate::NAME)
            .ok_or(ConfigError::ConfigDirNotFound)?;
        Ok(Self::with_path(dirs.config_dir().join(CONFIG_FILE_NAME)))
    }

    /// Uses `path` as the config file.
    #[must_use]
    pub const fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// The config file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the config. A missing file is created with defaults; an
    /// unparsable one is left alone and defaults are used.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read, or the default
    /// cannot be written.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return self.write_default(),
            Err(e) => return Err(ConfigError::io(&self.path, e)),
        };

        Ok(toml::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Invalid config file, using defaults");
            AppConfig::default()
        }))
    }

    fn write_default(&self) -> Result<AppConfig, ConfigError> {
        let config = AppConfig::default();
        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| ConfigError::io(dir, e))?;

        let content = toml::to_string_pretty(&config)?;
        let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(|e| ConfigError::io(dir, e))?;
        staged
            .write_all(content.as_bytes())
            .map_err(|e| ConfigError::io(staged.path(), e))?;
        staged
            .persist(&self.path)
            .map_err(|e| ConfigError::io(&self.path, e.error))?;

        info!(path = %self.path.display(), "Wrote default config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_run_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join(CONFIG_FILE_NAME);
        let loader = ConfigLoader::with_path(path.clone());

        let config = loader.load().unwrap();

        assert_eq!(config.cache.namespace, "default");
        let written: AppConfig = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.cache.max_age_secs, config.cache.max_age_secs);
        assert_eq!(written.network.timeout_secs, config.network.timeout_secs);
    }

    #[test]
    fn test_invalid_file_falls_back_and_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "cache = [").unwrap();

        let config = ConfigLoader::with_path(path.clone()).load().unwrap();

        assert_eq!(config.cache.namespace, "default");
        assert_eq!(fs::read_to_string(&path).unwrap(), "cache = [");
    }

    #[test]
    fn test_override_path_wins() {
        let temp_dir = TempDir::new().unwrap();
        let custom = temp_dir.path().join("custom.toml");
        fs::write(&custom, "[cache]\nnamespace = \"thumbs\"\n").unwrap();

        let loader = ConfigLoader::new(Some(&custom)).unwrap();

        assert_eq!(loader.path(), custom);
        assert_eq!(loader.load().unwrap().cache.namespace, "thumbs");
    }

    #[test]
    fn test_unreadable_path_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_path(temp_dir.path().to_path_buf());

        assert!(matches!(loader.load(), Err(ConfigError::Io { .. })));
    }
}
