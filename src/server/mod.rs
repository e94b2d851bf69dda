// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Plain HTTP listener in front of a [`Forwarder`].
//!
//! The server is a thin wrapper around hyper-util. Every accepted
//! connection is served by `hyper_util::server::conn::auto::Builder`, so
//! HTTP/1.1 and HTTP/2 (prior knowledge) are both accepted. Each request
//! gets a [`ConnectionInfo`] with the peer address and is forwarded to the
//! single configured upstream.
//!
//! TLS termination is left to whoever embeds the [`Forwarder`]; such a
//! listener records the verified peer chain with [`ConnectionInfo::tls`].


use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, Uri};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::body::ForwardBody;
use crate::config::{Config, ConfigError};
use crate::conn::ConnectionInfo;
use crate::error::ForwardError;
use crate::forward::Forwarder;

/// Configuration for the listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upstream every request is forwarded to, `http://backend:8080`
    #[serde(default)]
    pub upstream: Option<String>,

    /// How long in-flight connections may take to finish on shutdown, in
    /// seconds
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_drain_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream: None,
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// Read the `server.*` keys from `config`.
    pub fn load(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            host: config.get_or_default("server.host", default_host())?,
            port: config.get_or_default("server.port", default_port())?,
            upstream: config.get("server.upstream")?,
            drain_timeout_secs: config
                .get_or_default("server.drain_timeout_secs", default_drain_timeout_secs())?,
        })
    }

    /// The socket address to bind.
    pub fn listen_addr(&self) -> Result<SocketAddr, ForwardError> {
        format!("{}:{}", self.host, self.port)
            .parse::<SocketAddr>()
            .map_err(|e| ForwardError::InvalidConfig(format!("invalid server address: {e}")))
    }

    /// The parsed upstream URI.
    pub fn upstream_uri(&self) -> Result<Uri, ForwardError> {
        let raw = self
            .upstream
            .as_deref()
            .ok_or_else(|| ForwardError::InvalidConfig("server.upstream is not set".to_string()))?;
        let uri = raw
            .parse::<Uri>()
            .map_err(|e| ForwardError::InvalidTarget(format!("{raw}: {e}")))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ForwardError::InvalidTarget(format!(
                "{raw}: upstream must be an absolute URI"
            )));
        }
        Ok(uri)
    }
}

/// Listener forwarding every request to one upstream.
#[derive(Debug, Clone)]
pub struct ForwardServer {
    config: ServerConfig,
    upstream: Uri,
    forwarder: Forwarder,
}

impl ForwardServer {
    pub fn new(config: ServerConfig, forwarder: Forwarder) -> Result<Self, ForwardError> {
        let upstream = config.upstream_uri()?;
        Ok(Self {
            config,
            upstream,
            forwarder,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn upstream(&self) -> &Uri {
        &self.upstream
    }

    /// Bind the configured address and serve until Ctrl-C or SIGTERM.
    pub async fn start(&self) -> Result<(), ForwardError> {
        let listener = TcpListener::bind(self.config.listen_addr()?).await?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serve connections from `listener` until `shutdown` completes, then
    /// drain in-flight connections.
    pub async fn serve_with_shutdown<F>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), ForwardError>
    where
        F: Future<Output = ()>,
    {
        info!(
            "fwdproxy listening on http://{}, forwarding to {}",
            listener.local_addr()?,
            self.upstream
        );

        let (shutdown_tx, _) = watch::channel(());
        let mut join_set = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested; no longer accepting connections");
                    break;
                }
                accept = listener.accept() => {
                    match accept {
                        Ok((stream, remote_addr)) => {
                            let connection = serve_connection(
                                stream,
                                remote_addr,
                                self.forwarder.clone(),
                                self.upstream.clone(),
                                shutdown_tx.subscribe(),
                            );
                            join_set.spawn(connection);
                        }
                        Err(e) => error!("Accept error: {}", e),
                    }
                }
                Some(res) = join_set.join_next(), if !join_set.is_empty() => {
                    if let Err(e) = res {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        info!("Shutting down; waiting for {} connection(s)", join_set.len());
        shutdown_tx.send_replace(());

        let drain_timeout = Duration::from_secs(self.config.drain_timeout_secs);
        let drain = async {
            while let Some(res) = join_set.join_next().await {
                if let Err(e) = res {
                    error!("Connection task failed: {}", e);
                }
            }
        };

        if tokio::time::timeout(drain_timeout, drain).await.is_err() {
            warn!(
                "Shutdown timed out after {} seconds, closing remaining connections",
                drain_timeout.as_secs()
            );
            join_set.shutdown().await;
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Serve one accepted connection until it closes or shutdown is signalled.
async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    forwarder: Forwarder,
    upstream: Uri,
    mut shutdown: watch::Receiver<()>,
) {
    let service = service_fn(move |mut req: Request<Incoming>| {
        let forwarder = forwarder.clone();
        let upstream = upstream.clone();
        async move {
            req.extensions_mut()
                .insert(ConnectionInfo::plain(remote_addr));
            Ok::<Response<ForwardBody>, Infallible>(forwarder.forward(&upstream, req).await)
        }
    });

    let builder = AutoBuilder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(stream), service);
    let mut connection = std::pin::pin!(connection);

    tokio::select! {
        res = &mut connection => {
            if let Err(e) = res {
                debug!("Connection from {} ended: {}", remote_addr, e);
            }
        }
        _ = shutdown.changed() => {
            connection.as_mut().graceful_shutdown();
            if let Err(e) = connection.await {
                debug!("Connection from {} ended during shutdown: {}", remote_addr, e);
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Cannot install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C; initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM; initiating graceful shutdown"),
    }
}
