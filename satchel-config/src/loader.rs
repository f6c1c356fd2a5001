// Option file loaders

use crate::{ConfigError, Result};
use satchel_core::{PartialOptions, UploadDir};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Json,
    Toml,
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }
}

/// Loads owner options from a file
pub struct OptionsLoader {
    format: FileFormat,
}

impl OptionsLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Auto-detect format from file extension
    pub fn auto(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        let format = FileFormat::from_extension(ext)
            .ok_or_else(|| ConfigError::LoadError(format!("Unsupported format: {}", ext)))?;

        Ok(Self::new(format))
    }

    /// Load options from file
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<PartialOptions> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("Failed to read file: {}", e)))?;

        self.parse(&content)
    }

    /// Parse options from string
    pub fn parse(&self, content: &str) -> Result<PartialOptions> {
        let value = match self.format {
            FileFormat::Json => self.parse_json(content)?,
            FileFormat::Toml => self.parse_toml(content)?,
            FileFormat::Env => self.parse_env(content),
        };

        options_from_value(&value)
    }

    fn parse_json(&self, content: &str) -> Result<Value> {
        serde_json::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e)))
    }

    fn parse_toml(&self, content: &str) -> Result<Value> {
        let table: toml::Table = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        serde_json::to_value(table)
            .map_err(|e| ConfigError::ParseError(format!("TOML to JSON conversion error: {}", e)))
    }

    fn parse_env(&self, content: &str) -> Value {
        let mut map = serde_json::Map::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"').trim_matches('\'');
                map.insert(key.to_string(), Value::String(value.to_string()));
            }
        }

        Value::Object(map)
    }
}

/// Build options from a parsed document.
///
/// Keys are matched case-insensitively; an `uploads` table, when present,
/// is used instead of the top level. Unknown keys are ignored.
pub fn options_from_value(value: &Value) -> Result<PartialOptions> {
    let Value::Object(map) = value else {
        return Err(ConfigError::ParseError("expected a table of options".to_string()));
    };

    let map = match map.get("uploads") {
        Some(Value::Object(section)) => section,
        _ => map,
    };

    let mut options = PartialOptions::new();
    for (key, value) in map {
        match key.to_lowercase().as_str() {
            "allow_overwrite" => options.allow_overwrite = Some(parse_bool(key, value)?),
            "autosave" => options.autosave = Some(parse_bool(key, value)?),
            "unlink_tempfile" => options.unlink_tempfile = Some(parse_bool(key, value)?),
            "default_upload_dir" | "upload_dir" => {
                options.default_upload_dir = Some(UploadDir::path(parse_string(key, value)?))
            }
            _ => {}
        }
    }

    Ok(options)
}

fn parse_bool(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, value)),
        },
        _ => Err(invalid(key, value)),
    }
}

fn parse_string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &Value) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn dir_of(options: &PartialOptions) -> Option<PathBuf> {
        options.default_upload_dir.as_ref().map(UploadDir::resolve)
    }

    #[test]
    fn test_parse_json() {
        let loader = OptionsLoader::new(FileFormat::Json);
        let json = r#"{"allow_overwrite": true, "default_upload_dir": "/srv/uploads"}"#;

        let options = loader.parse(json).unwrap();
        assert_eq!(options.allow_overwrite, Some(true));
        assert_eq!(dir_of(&options), Some(PathBuf::from("/srv/uploads")));
        assert!(options.autosave.is_none());
    }

    #[test]
    fn test_parse_toml_section() {
        let loader = OptionsLoader::new(FileFormat::Toml);
        let toml = r#"
            [uploads]
            autosave = true
            unlink_tempfile = true
            upload_dir = "/srv/files"
        "#;

        let options = loader.parse(toml).unwrap();
        assert_eq!(options.autosave, Some(true));
        assert_eq!(options.unlink_tempfile, Some(true));
        assert_eq!(dir_of(&options), Some(PathBuf::from("/srv/files")));
    }

    #[test]
    fn test_parse_env() {
        let loader = OptionsLoader::new(FileFormat::Env);
        let env = r#"
            ALLOW_OVERWRITE=1
            # Comment
            DEFAULT_UPLOAD_DIR="/tmp/up"
            AUTOSAVE=off
        "#;

        let options = loader.parse(env).unwrap();
        assert_eq!(options.allow_overwrite, Some(true));
        assert_eq!(options.autosave, Some(false));
        assert_eq!(dir_of(&options), Some(PathBuf::from("/tmp/up")));
    }

    #[test]
    fn test_invalid_bool() {
        let loader = OptionsLoader::new(FileFormat::Json);
        let result = loader.parse(r#"{"autosave": "maybe"}"#);

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_extension("json"), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_extension("TOML"), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_extension("env"), Some(FileFormat::Env));
        assert_eq!(FileFormat::from_extension("yaml"), None);
        assert!(OptionsLoader::auto("uploads").is_err());
    }

    #[test]
    fn test_load_file_auto() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploads.toml");
        std::fs::write(&path, "allow_overwrite = false\n").unwrap();

        let options = OptionsLoader::auto(&path).unwrap().load_file(&path).unwrap();
        assert_eq!(options.allow_overwrite, Some(false));
    }
}
