// Option loading for Satchel upload handlers
//
// Owner options can come from a file (JSON, TOML or .env) and from
// prefixed environment variables. Sources are layered in the order they are
// added; later sources override earlier ones key by key.

pub mod env;
pub mod error;
pub mod loader;

pub use env::{DEFAULT_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{FileFormat, OptionsLoader, options_from_value};

use satchel_core::PartialOptions;
use std::path::{Path, PathBuf};
use tracing::debug;

enum Source {
    File(PathBuf),
    Env(String),
    Dotenv(Option<PathBuf>),
}

/// Layered option sources
#[derive(Default)]
pub struct OptionsConfig {
    sources: Vec<Source>,
}

impl OptionsConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file source; the format follows the extension
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::File(path.into()));
        self
    }

    /// Add environment variables with the default prefix
    pub fn env(self) -> Self {
        self.env_prefixed(DEFAULT_PREFIX)
    }

    /// Add environment variables with a custom prefix
    pub fn env_prefixed(mut self, prefix: impl Into<String>) -> Self {
        self.sources.push(Source::Env(prefix.into()));
        self
    }

    /// Load a .env file into the process environment before reading
    /// variables. Without a path, a missing `.env` is ignored.
    pub fn dotenv(mut self, path: Option<&Path>) -> Self {
        self.sources.push(Source::Dotenv(path.map(Path::to_path_buf)));
        self
    }

    /// Resolve every source into one set of overrides
    pub fn load(&self) -> Result<PartialOptions> {
        let mut options = PartialOptions::new();

        for source in &self.sources {
            match source {
                Source::File(path) => {
                    let layer = OptionsLoader::auto(path)?.load_file(path)?;
                    debug!(path = ?path, "Loaded upload options file");
                    options = options.layer(layer);
                }
                Source::Env(prefix) => {
                    options = options.layer(EnvLoader::new(prefix.clone()).load()?);
                }
                Source::Dotenv(Some(path)) => {
                    dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
                }
                Source::Dotenv(None) => {
                    dotenvy::dotenv().ok();
                }
            }
        }

        Ok(options)
    }
}

/// Load owner options from a single file
pub fn from_file(path: impl AsRef<Path>) -> Result<PartialOptions> {
    let path = path.as_ref();
    OptionsLoader::auto(path)?.load_file(path)
}

/// Load owner options from `SATCHEL_UPLOAD_*` variables
pub fn from_env() -> Result<PartialOptions> {
    EnvLoader::default().load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_files_override_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.json");
        let local = dir.path().join("local.toml");
        std::fs::write(&base, r#"{"autosave": true, "allow_overwrite": true}"#).unwrap();
        std::fs::write(&local, "allow_overwrite = false\n").unwrap();

        let options = OptionsConfig::new().file(&base).file(&local).load().unwrap();

        assert_eq!(options.autosave, Some(true));
        assert_eq!(options.allow_overwrite, Some(false));
    }

    #[test]
    fn test_missing_file_fails() {
        let result = OptionsConfig::new().file("/nonexistent/uploads.toml").load();
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploads.env");
        std::fs::write(&path, "UNLINK_TEMPFILE=true\n").unwrap();

        assert_eq!(from_file(&path).unwrap().unlink_tempfile, Some(true));
    }

    #[test]
    fn test_empty_config() {
        assert!(OptionsConfig::new().load().unwrap().is_empty());
    }
}
