// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The network round trip.
//!
//! A [`Transport`] takes a fully prepared outbound request and returns the
//! upstream response head plus a streaming body. Two implementations ship
//! with the crate:
//!
//! * [`HttpTransport`] – the default. A pooled hyper-util client for plain
//!   `http` upstreams. The request URI is handed to hyper untouched, so
//!   repeated slashes, percent-encoded octets and the query string reach
//!   the upstream byte for byte.
//! * [`ReqwestTransport`] – wraps a [`reqwest::Client`] for upstreams that
//!   need TLS. reqwest re-parses the URL, which
//!   resolves dot segments; prefer [`HttpTransport`] when the raw path must
//!   survive unchanged. reqwest also adds `accept: */*` to requests that
//!   carry no `Accept` header.
//!
//! Both apply a response-header timeout: the time between sending the
//! request and receiving the response head. Exceeding it yields
//! [`ForwardError::Timeout`].
//!
//! Cancelling a round trip is done by dropping its future. hyper then
//! discards the connection instead of returning it to the pool.

#[cfg(test)]
mod tests;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};

use crate::body::ForwardBody;
use crate::error::{caused_by_timeout, BoxError, ForwardError};
use crate::trace_fmt;

/// Performs the network round trip for one outbound request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(
        &self,
        request: Request<ForwardBody>,
    ) -> Result<Response<ForwardBody>, ForwardError>;
}

/// Timeouts and pooling of the default transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Time allowed between sending the request and receiving the
    /// response head, in milliseconds. `0` disables the timeout.
    #[serde(default = "default_response_header_timeout_ms")]
    pub response_header_timeout_ms: u64,

    /// How long idle pooled connections are kept, in milliseconds
    #[serde(default = "default_pool_idle_timeout_ms")]
    pub pool_idle_timeout_ms: u64,

    /// Maximum idle connections kept per upstream host
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// TCP keepalive interval in milliseconds, `0` disables it
    #[serde(default = "default_tcp_keepalive_ms")]
    pub tcp_keepalive_ms: u64,

    /// Set `TCP_NODELAY` on upstream sockets
    #[serde(default = "default_true")]
    pub nodelay: bool,
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_response_header_timeout_ms() -> u64 {
    30_000
}

fn default_pool_idle_timeout_ms() -> u64 {
    90_000
}

fn default_pool_max_idle_per_host() -> usize {
    32
}

fn default_tcp_keepalive_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            response_header_timeout_ms: default_response_header_timeout_ms(),
            pool_idle_timeout_ms: default_pool_idle_timeout_ms(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            tcp_keepalive_ms: default_tcp_keepalive_ms(),
            nodelay: true,
        }
    }
}

impl TransportConfig {
    /// Set the response-header timeout.
    pub fn with_response_header_timeout(mut self, timeout: Duration) -> Self {
        self.response_header_timeout_ms = whole_millis(timeout);
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = whole_millis(timeout);
        self
    }

    pub fn response_header_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.response_header_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.connect_timeout_ms)
    }

    fn pool_idle_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.pool_idle_timeout_ms)
    }

    fn tcp_keepalive(&self) -> Option<Duration> {
        non_zero_millis(self.tcp_keepalive_ms)
    }
}

/// Whole milliseconds of `timeout`. A non-zero timeout is at least 1,
/// `0` means disabled.
fn whole_millis(timeout: Duration) -> u64 {
    if timeout.is_zero() {
        return 0;
    }
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Await `fut`, giving up after the response-header timeout.
async fn with_header_timeout<F, T>(timeout: Option<Duration>, fut: F) -> Result<T, ForwardError>
where
    F: Future<Output = Result<T, ForwardError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ForwardError::Timeout(limit))?,
        None => fut.await,
    }
}

/// Default transport: a pooled hyper-util client for `http` upstreams.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, ForwardBody>,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(config.connect_timeout());
        connector.set_keepalive(config.tcp_keepalive());
        connector.set_nodelay(config.nodelay);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(connector);

        Self { client, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn classify(&self, err: hyper_util::client::legacy::Error) -> ForwardError {
        if caused_by_timeout(&err) {
            ForwardError::Timeout(self.config.connect_timeout().unwrap_or_default())
        } else if err.is_connect() {
            ForwardError::Connect(Box::new(err))
        } else {
            ForwardError::Transport(Box::new(err))
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn round_trip(
        &self,
        request: Request<ForwardBody>,
    ) -> Result<Response<ForwardBody>, ForwardError> {
        if request.uri().scheme_str() != Some("http") {
            return Err(ForwardError::InvalidTarget(format!(
                "{} requires a TLS capable transport",
                request.uri()
            )));
        }

        trace_fmt!("HttpTransport", "{} {}", request.method(), request.uri());

        let response = with_header_timeout(self.config.response_header_timeout(), async {
            self.client
                .request(request)
                .await
                .map_err(|e| self.classify(e))
        })
        .await?;

        Ok(response.map(|body| body.map_err(BoxError::from).boxed_unsync()))
    }
}

/// Transport backed by a [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    response_header_timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// Build a client from the same settings as the default transport.
    pub fn new(config: &TransportConfig) -> Result<Self, ForwardError> {
        let mut builder = reqwest::Client::builder()
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_keepalive(config.tcp_keepalive())
            .tcp_nodelay(config.nodelay)
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ForwardError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            response_header_timeout: config.response_header_timeout(),
        })
    }

    /// Use an existing client; redirects should be disabled on it.
    pub fn from_client(client: reqwest::Client, response_header_timeout: Option<Duration>) -> Self {
        Self {
            client,
            response_header_timeout,
        }
    }

    fn classify(&self, err: reqwest::Error) -> ForwardError {
        if err.is_timeout() {
            ForwardError::Timeout(self.response_header_timeout.unwrap_or_default())
        } else if err.is_connect() {
            ForwardError::Connect(Box::new(err))
        } else {
            ForwardError::Transport(Box::new(err))
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn round_trip(
        &self,
        request: Request<ForwardBody>,
    ) -> Result<Response<ForwardBody>, ForwardError> {
        let (parts, body) = request.into_parts();

        trace_fmt!("ReqwestTransport", "{} {}", parts.method, parts.uri);

        let outbound = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()));

        let upstream = with_header_timeout(self.response_header_timeout, async {
            outbound.send().await.map_err(|e| self.classify(e))
        })
        .await?;

        let mut response = Response::builder()
            .status(upstream.status())
            .version(upstream.version());
        if let Some(headers) = response.headers_mut() {
            *headers = upstream.headers().clone();
        }

        let stream = upstream
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(BoxError::from);

        Ok(response.body(StreamBody::new(stream).boxed_unsync())?)
    }
}
