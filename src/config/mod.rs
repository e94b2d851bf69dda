// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layered configuration.
//!
//! A [`Config`] is an ordered list of [`ConfigProvider`]s; later providers
//! override earlier ones. The usual stack is:
//!
//! 1. `FileConfigProvider` – `fwdproxy.{toml,json,yaml}`
//! 2. `EnvConfigProvider`  – `FWDPROXY_FORWARD__TRUST_FORWARD_HEADER=true`
//! 3. any provider of your own implementing [`ConfigProvider`]
//!
//! Keys are dot separated paths. The keys read by the crate:
//!
//! | key | type | default | description |
//! |-----|------|---------|-------------|
//! | `forward.trust_forward_header` | bool | `false` | Keep caller supplied `X-Forwarded-*` headers |
//! | `forward.hostname` | string | machine hostname | `X-Forwarded-Server` value, empty disables |
//! | `forward.pass_client_cert` | bool | `false` | Forward the verified client certificate chain |
//! | `forward.pass_host_header` | bool | `false` | Send the caller's `Host` upstream |
//! | `forward.max_chunked_body` | integer | unbounded | Buffer cap for chunked upstream bodies |
//! | `forward.transport.*` | – | see `TransportConfig` | Timeouts and pooling of the default transport |
//! | `server.host` | string | `127.0.0.1` | Listener address |
//! | `server.port` | integer | `8080` | Listener port |
//! | `server.upstream` | string | – | Upstream every request is forwarded to |
//! | `server.drain_timeout_secs` | integer | `30` | Grace period for open connections on shutdown |
//! | `logging.*` | – | see `LoggingConfig` | Structured logging |

mod env;
pub mod error;
mod file;
mod value;


pub use env::EnvConfigProvider;
pub use error::ConfigError;
pub use file::{FileConfigProvider, FileFormat};
pub use value::ValueConfigProvider;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

/// A source of configuration values.
/// Object safe, typed access lives in [`ConfigProviderExt`].
pub trait ConfigProvider: Debug + Send + Sync {
    /// Whether the provider has a value for `key`.
    fn has(&self, key: &str) -> bool;

    /// Name of the provider, for diagnostics.
    fn provider_name(&self) -> &str;

    /// The raw value for `key`.
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError>;
}

/// Typed access for any [`ConfigProvider`].
pub trait ConfigProviderExt: ConfigProvider {
    /// Get the value for `key` deserialized into `T`.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get_raw(key)? {
            Some(value) => deserialize(key, value).map(Some),
            None => Ok(None),
        }
    }
}

impl<T: ConfigProvider> ConfigProviderExt for T {}

fn deserialize<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, ConfigError> {
    serde_json::from_value(value)
        .map_err(|e| ConfigError::ParseError(format!("failed to deserialize '{key}': {e}")))
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider; it overrides every provider added before it.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Add an already shared provider.
    pub fn with_shared_provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> Config {
        Config {
            providers: self.providers,
        }
    }
}

/// The assembled configuration.
#[derive(Debug, Clone)]
pub struct Config {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        // Later providers take precedence
        for provider in self.providers.iter().rev() {
            if provider.has(key) {
                return provider.get_raw(key);
            }
        }
        Ok(None)
    }

    /// Get the value for `key` from the highest priority provider that
    /// has it.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get_raw(key)? {
            Some(value) => deserialize(key, value).map(Some),
            None => Ok(None),
        }
    }

    /// Get the value for `key`, or `default` when no provider has it.
    pub fn get_or_default<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.get(key)? {
            Some(value) => Ok(value),
            None => Ok(default),
        }
    }

    /// Names of the providers, lowest priority first.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.provider_name()).collect()
    }

    /// Configuration read from a single file.
    pub fn default_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let provider = FileConfigProvider::new(path)?;
        Ok(Self::builder().with_provider(provider).build())
    }
}
