// Environment variable loading

use crate::{ConfigError, Result, options_from_value};
use satchel_core::PartialOptions;
use serde_json::{Map, Value};
use std::env;

/// Default variable prefix, e.g. `SATCHEL_UPLOAD_AUTOSAVE`.
pub const DEFAULT_PREFIX: &str = "SATCHEL_UPLOAD";

/// Environment variable loader
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    /// Create a loader for variables starting with `prefix`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load options from the process environment
    pub fn load(&self) -> Result<PartialOptions> {
        self.load_from(env::vars())
    }

    /// Load options from the given variables
    pub fn load_from<I, K, V>(&self, vars: I) -> Result<PartialOptions>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut map = Map::new();

        for (key, value) in vars {
            let key = key.as_ref();
            if let Some(rest) = key.strip_prefix(&self.prefix) {
                let trimmed = rest.trim_start_matches('_');
                if !trimmed.is_empty() {
                    map.insert(trimmed.to_lowercase(), Value::String(value.into()));
                }
            }
        }

        options_from_value(&Value::Object(map))
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(self.var_name(key)).map_err(ConfigError::EnvError)
    }

    /// Full variable name for an option key
    pub fn var_name(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key.to_uppercase())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // std::env::set_var is unsafe in edition 2024, so these tests feed
    // variables through load_from instead of mutating the process env.

    #[test]
    fn test_load_from_prefixed_vars() {
        let loader = EnvLoader::default();
        let options = loader
            .load_from([
                ("SATCHEL_UPLOAD_AUTOSAVE", "true"),
                ("SATCHEL_UPLOAD_DEFAULT_UPLOAD_DIR", "/srv/up"),
                ("OTHER_AUTOSAVE", "false"),
                ("PATH", "/usr/bin"),
            ])
            .unwrap();

        assert_eq!(options.autosave, Some(true));
        assert!(options.default_upload_dir.is_some());
        assert!(options.allow_overwrite.is_none());
    }

    #[test]
    fn test_load_from_invalid_value() {
        let loader = EnvLoader::new("APP");
        let result = loader.load_from([("APP_ALLOW_OVERWRITE", "sometimes")]);

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_var_name() {
        let loader = EnvLoader::new("MY_APP");
        assert_eq!(loader.var_name("autosave"), "MY_APP_AUTOSAVE");
    }

    #[test]
    fn test_load_var_missing() {
        let loader = EnvLoader::new("SATCHEL_TEST_99999");
        assert!(loader.load_var("MISSING_VAR_67890").is_err());
    }
}
