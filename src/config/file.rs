// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! File configuration provider.

use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use super::ConfigError;
use super::ConfigProvider;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `.json`
    Json,
    /// `.toml`
    Toml,
    /// `.yaml`, `.yml`
    Yaml,
}

impl FileFormat {
    /// Detect the format from the file extension.
    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension().and_then(|ext| {
            match ext.to_string_lossy().to_lowercase().as_str() {
                "json" => Some(FileFormat::Json),
                "toml" => Some(FileFormat::Toml),
                "yaml" | "yml" => Some(FileFormat::Yaml),
                _ => None,
            }
        })
    }
}

/// Configuration provider backed by a JSON, TOML or YAML file.
///
/// The file is read once. Nested tables are addressed with dot separated
/// keys, `forward.transport.connect_timeout_ms` for example.
#[derive(Debug)]
pub struct FileConfigProvider {
    path: PathBuf,
    format: FileFormat,
    data: Map<String, Value>,
}

impl FileConfigProvider {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let format = FileFormat::from_extension(&path)
            .ok_or_else(|| ConfigError::provider_error("file", "unsupported file format"))?;

        let content = fs::read_to_string(&path).map_err(|e| {
            ConfigError::provider_error("file", format!("failed to read {}: {e}", path.display()))
        })?;
        let data = Self::parse(&content, format)?;

        Ok(Self { path, format, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Parse `content` into the unified JSON representation.
    fn parse(content: &str, format: FileFormat) -> Result<Map<String, Value>, ConfigError> {
        let value = match format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::provider_error("file", format!("invalid JSON: {e}")))?,
            FileFormat::Toml => {
                let toml_value: toml::Value = toml::from_str(content).map_err(|e| {
                    ConfigError::provider_error("file", format!("invalid TOML: {e}"))
                })?;
                serde_json::to_value(toml_value).map_err(|e| {
                    ConfigError::provider_error("file", format!("failed to convert TOML: {e}"))
                })?
            }
            FileFormat::Yaml => {
                let yaml_value: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| {
                    ConfigError::provider_error("file", format!("invalid YAML: {e}"))
                })?;
                serde_json::to_value(yaml_value).map_err(|e| {
                    ConfigError::provider_error("file", format!("failed to convert YAML: {e}"))
                })?
            }
        };

        match value {
            Value::Object(map) => Ok(map),
            _ => Err(ConfigError::provider_error(
                "file",
                "root configuration must be an object",
            )),
        }
    }

    fn get_nested_value(&self, key_path: &str) -> Option<&Value> {
        let mut parts = key_path.split('.');
        let first = self.data.get(parts.next()?)?;
        parts.try_fold(first, |current, part| current.get(part))
    }
}

impl ConfigProvider for FileConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.get_nested_value(key).is_some()
    }

    fn provider_name(&self) -> &str {
        "file"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.get_nested_value(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigProviderExt;
    use std::io::Write;
    use tempfile::Builder;

    fn write(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_toml_file() {
        let file = write(
            ".toml",
            r#"
            [forward]
            trust_forward_header = true
            hostname = "edge-1"

            [forward.transport]
            response_header_timeout_ms = 250
            "#,
        );

        let provider = FileConfigProvider::new(file.path()).unwrap();

        assert_eq!(provider.format(), FileFormat::Toml);
        assert!(provider.has("forward.transport"));
        let trust: bool = provider.get("forward.trust_forward_header").unwrap().unwrap();
        assert!(trust);
        let timeout: u64 = provider
            .get("forward.transport.response_header_timeout_ms")
            .unwrap()
            .unwrap();
        assert_eq!(timeout, 250);
        assert!(!provider.has("forward.pass_client_cert"));
    }

    #[test]
    fn test_json_file() {
        let file = write(".json", r#"{ "server": { "port": 9090, "host": "0.0.0.0" } }"#);

        let provider = FileConfigProvider::new(file.path()).unwrap();

        let port: u16 = provider.get("server.port").unwrap().unwrap();
        assert_eq!(port, 9090);
    }

    #[test]
    fn test_yaml_file() {
        let file = write(".yml", "forward:\n  pass_client_cert: true\n  max_chunked_body: 1024\n");

        let provider = FileConfigProvider::new(file.path()).unwrap();

        let pass: bool = provider.get("forward.pass_client_cert").unwrap().unwrap();
        assert!(pass);
        let limit: usize = provider.get("forward.max_chunked_body").unwrap().unwrap();
        assert_eq!(limit, 1024);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write(".ini", "a = b");

        let err = FileConfigProvider::new(file.path()).unwrap_err();

        assert!(matches!(err, ConfigError::ProviderError { .. }));
    }

    #[test]
    fn test_root_must_be_object() {
        let file = write(".json", "[1, 2, 3]");

        let err = FileConfigProvider::new(file.path()).unwrap_err();

        assert!(err.to_string().contains("root configuration must be an object"));
    }

    #[test]
    fn test_missing_file() {
        let err = FileConfigProvider::new("/nonexistent/fwdproxy.toml").unwrap_err();

        assert!(err.to_string().contains("failed to read"));
    }
}
