// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level entry point.
//!
//! The [`Loader`] assembles the configuration, initialises logging, builds
//! the [`Forwarder`] and wraps it in a [`ForwardServer`], returning a
//! [`FwdProxy`] ready to [`start`](FwdProxy::start).


use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{Config, ConfigError, ConfigProvider, EnvConfigProvider, FileConfigProvider};
use crate::error::ForwardError;
use crate::forward::{ForwardConfigBuilder, ForwardSettings, Forwarder};
use crate::logging::{self, LoggingConfig};
use crate::server::{ForwardServer, ServerConfig};
use crate::{debug_fmt, info_fmt};

/// Errors that can occur while assembling the proxy.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// The forwarder or server could not be built or failed
    #[error("forwarder error: {0}")]
    ForwardError(#[from] ForwardError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

type Customizer = Box<dyn FnOnce(ForwardConfigBuilder) -> ForwardConfigBuilder + Send>;

/// Builder assembling a [`FwdProxy`].
///
/// Providers are stacked file, then environment, then any added with
/// [`with_provider`](Loader::with_provider); later ones win.
#[derive(Default)]
pub struct Loader {
    config: Option<Config>,
    config_file_path: Option<PathBuf>,
    use_env_vars: bool,
    env_prefix: Option<String>,
    providers: Vec<Arc<dyn ConfigProvider>>,
    customizers: Vec<Customizer>,
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("config_file_path", &self.config_file_path)
            .field("use_env_vars", &self.use_env_vars)
            .field("env_prefix", &self.env_prefix)
            .field("providers", &self.providers)
            .field("customizers", &self.customizers.len())
            .finish()
    }
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` as is, ignoring file, environment and extra providers.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Read a JSON, TOML or YAML configuration file.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file_path = Some(path.into());
        self
    }

    /// Read `FWDPROXY_` environment variables.
    pub fn with_env_vars(mut self) -> Self {
        self.use_env_vars = true;
        self
    }

    /// Read environment variables with a custom prefix.
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.use_env_vars = true;
        self
    }

    /// Add a configuration provider on top of file and environment.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Adjust the forwarder after configuration was applied, to install
    /// hooks such as response modifiers or an error handler.
    pub fn configure_forwarder<F>(mut self, customize: F) -> Self
    where
        F: FnOnce(ForwardConfigBuilder) -> ForwardConfigBuilder + Send + 'static,
    {
        self.customizers.push(Box::new(customize));
        self
    }

    fn build_config(&mut self) -> Result<Config, LoaderError> {
        if let Some(config) = self.config.take() {
            return Ok(config);
        }

        let mut builder = Config::builder();
        if let Some(path) = &self.config_file_path {
            builder = builder.with_provider(FileConfigProvider::new(path)?);
        }
        if self.use_env_vars {
            let env_provider = match &self.env_prefix {
                Some(prefix) => EnvConfigProvider::new(prefix),
                None => EnvConfigProvider::default(),
            };
            builder = builder.with_provider(env_provider);
        }
        for provider in self.providers.drain(..) {
            builder = builder.with_shared_provider(provider);
        }
        Ok(builder.build())
    }

    /// Assemble the proxy.
    pub fn build(mut self) -> Result<FwdProxy, LoaderError> {
        let config = self.build_config()?;

        logging::init_with_config(&LoggingConfig::load(&config)?);
        debug_fmt!("Startup", "configuration providers: {:?}", config.provider_names());

        let settings = ForwardSettings::load(&config)?;
        let mut builder = ForwardConfigBuilder::from_settings(settings);
        for customize in self.customizers {
            builder = customize(builder);
        }
        let forwarder = builder.build()?;

        let server = ForwardServer::new(ServerConfig::load(&config)?, forwarder.clone())?;
        info_fmt!("Startup", "forwarding to {}", server.upstream());

        Ok(FwdProxy {
            config: Arc::new(config),
            forwarder,
            server,
        })
    }
}

/// An assembled proxy: configuration, forwarder and listener.
#[derive(Debug, Clone)]
pub struct FwdProxy {
    config: Arc<Config>,
    forwarder: Forwarder,
    server: ForwardServer,
}

impl FwdProxy {
    pub fn loader() -> Loader {
        Loader::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub fn server(&self) -> &ForwardServer {
        &self.server
    }

    /// Serve on the configured address until Ctrl-C or SIGTERM.
    pub async fn start(&self) -> Result<(), LoaderError> {
        Ok(self.server.start().await?)
    }

    /// Serve on `listener` until `shutdown` completes.
    pub async fn serve_with_shutdown<F>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), LoaderError>
    where
        F: Future<Output = ()>,
    {
        Ok(self.server.serve_with_shutdown(listener, shutdown).await?)
    }
}
