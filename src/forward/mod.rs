// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The forwarder.
//!
//! [`Forwarder::forward`] relays one inbound request to an already
//! resolved upstream and returns the response for the caller:
//!
//! 1. the inbound headers are copied and stripped of hop-by-hop headers,
//! 2. the [`Rewriter`] amends the `X-Forwarded-*` chain,
//! 3. the verified client certificate chain is attached when enabled,
//! 4. the [`Transport`] performs the round trip, bounded by the request's
//!    [`Deadline`] if it carries one,
//! 5. the response is stripped of hop-by-hop headers and passed through
//!    every [`ResponseModifier`],
//! 6. the body is relayed, re-framing chunked bodies with a
//!    `Content-Length`.
//!
//! Any failure along the way is handed to the [`ErrorHandler`], whose
//! response is returned instead. `forward` itself never fails.
//!
//! A [`Forwarder`] is cheap to clone and safe to share between tasks; its
//! [`ForwardConfig`] is immutable once built.


use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use hyper::body::Body;
use hyper::header::{self, HeaderValue};
use hyper::http::request::Parts;
use hyper::http::uri::PathAndQuery;
use hyper::{Method, Request, Response, Uri, Version};
use serde::{Deserialize, Serialize};

use crate::body::{self, ForwardBody};
use crate::client_cert;
use crate::config::{Config, ConfigError};
use crate::conn::{ConnectionInfo, Deadline};
use crate::error::{BoxError, ForwardError};
use crate::error_handler::{DefaultErrorHandler, ErrorHandler};
use crate::headers;
use crate::modifier::{self, ResponseModifier};
use crate::relay::{self, RelayOptions};
use crate::rewrite::{HeaderRewriter, Rewriter};
use crate::transport::{HttpTransport, Transport, TransportConfig};
use crate::{debug_fmt, warn_fmt};

/// The `forward` section of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardSettings {
    /// Keep forwarded-chain headers sent by the caller
    #[serde(default)]
    pub trust_forward_header: bool,

    /// Value of `X-Forwarded-Server`; the machine hostname when unset
    #[serde(default)]
    pub hostname: Option<String>,

    /// Forward the verified client certificate chain
    #[serde(default)]
    pub pass_client_cert: bool,

    /// Send the caller's `Host` header instead of the upstream authority
    #[serde(default)]
    pub pass_host_header: bool,

    /// Buffering limit for chunked upstream bodies, in bytes
    #[serde(default)]
    pub max_chunked_body: Option<usize>,

    /// Settings of the default transport
    #[serde(default)]
    pub transport: TransportConfig,
}

impl ForwardSettings {
    /// Read the `forward.*` keys from `config`, one key at a time so that
    /// every provider can contribute individual values.
    pub fn load(config: &Config) -> Result<Self, ConfigError> {
        let defaults = TransportConfig::default();
        let transport = TransportConfig {
            connect_timeout_ms: config.get_or_default(
                "forward.transport.connect_timeout_ms",
                defaults.connect_timeout_ms,
            )?,
            response_header_timeout_ms: config.get_or_default(
                "forward.transport.response_header_timeout_ms",
                defaults.response_header_timeout_ms,
            )?,
            pool_idle_timeout_ms: config.get_or_default(
                "forward.transport.pool_idle_timeout_ms",
                defaults.pool_idle_timeout_ms,
            )?,
            pool_max_idle_per_host: config.get_or_default(
                "forward.transport.pool_max_idle_per_host",
                defaults.pool_max_idle_per_host,
            )?,
            tcp_keepalive_ms: config.get_or_default(
                "forward.transport.tcp_keepalive_ms",
                defaults.tcp_keepalive_ms,
            )?,
            nodelay: config.get_or_default("forward.transport.nodelay", defaults.nodelay)?,
        };

        Ok(Self {
            trust_forward_header: config.get_or_default("forward.trust_forward_header", false)?,
            hostname: config.get("forward.hostname")?,
            pass_client_cert: config.get_or_default("forward.pass_client_cert", false)?,
            pass_host_header: config.get_or_default("forward.pass_host_header", false)?,
            max_chunked_body: config.get("forward.max_chunked_body")?,
            transport,
        })
    }
}

/// Immutable settings and hooks of a [`Forwarder`].
pub struct ForwardConfig {
    trust_forward_header: bool,
    hostname: String,
    pass_client_cert: bool,
    pass_host_header: bool,
    max_chunked_body: Option<usize>,
    rewriter: Arc<dyn Rewriter>,
    transport: Arc<dyn Transport>,
    error_handler: Arc<dyn ErrorHandler>,
    response_modifiers: Vec<Arc<dyn ResponseModifier>>,
}

impl ForwardConfig {
    pub fn trust_forward_header(&self) -> bool {
        self.trust_forward_header
    }

    /// Hostname reported in `X-Forwarded-Server`.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn pass_client_cert(&self) -> bool {
        self.pass_client_cert
    }

    pub fn pass_host_header(&self) -> bool {
        self.pass_host_header
    }

    pub fn max_chunked_body(&self) -> Option<usize> {
        self.max_chunked_body
    }

    /// Number of installed response modifiers.
    pub fn response_modifier_count(&self) -> usize {
        self.response_modifiers.len()
    }
}

impl fmt::Debug for ForwardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardConfig")
            .field("trust_forward_header", &self.trust_forward_header)
            .field("hostname", &self.hostname)
            .field("pass_client_cert", &self.pass_client_cert)
            .field("pass_host_header", &self.pass_host_header)
            .field("max_chunked_body", &self.max_chunked_body)
            .field("response_modifiers", &self.response_modifiers.len())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Forwarder`].
#[derive(Default)]
pub struct ForwardConfigBuilder {
    trust_forward_header: bool,
    hostname: Option<String>,
    pass_client_cert: bool,
    pass_host_header: bool,
    max_chunked_body: Option<usize>,
    transport_config: Option<TransportConfig>,
    rewriter: Option<Arc<dyn Rewriter>>,
    transport: Option<Arc<dyn Transport>>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    response_modifiers: Vec<Arc<dyn ResponseModifier>>,
}

impl ForwardConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the values of a `forward` configuration section.
    pub fn from_settings(settings: ForwardSettings) -> Self {
        Self {
            trust_forward_header: settings.trust_forward_header,
            hostname: settings.hostname,
            pass_client_cert: settings.pass_client_cert,
            pass_host_header: settings.pass_host_header,
            max_chunked_body: settings.max_chunked_body,
            transport_config: Some(settings.transport),
            ..Self::default()
        }
    }

    /// Keep and extend forwarded-chain headers sent by the caller.
    /// Only affects the default rewriter.
    pub fn with_trust_forward_header(mut self, trust: bool) -> Self {
        self.trust_forward_header = trust;
        self
    }

    /// Value for `X-Forwarded-Server`. An empty string disables the
    /// header. Only affects the default rewriter.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Forward the verified client certificate chain in
    /// `X-Forwarded-Ssl-Client-Cert`.
    pub fn with_pass_client_cert(mut self, pass: bool) -> Self {
        self.pass_client_cert = pass;
        self
    }

    /// Send the caller's `Host` header upstream.
    pub fn with_pass_host_header(mut self, pass: bool) -> Self {
        self.pass_host_header = pass;
        self
    }

    /// Fail with [`ForwardError::BodyTooLarge`] when a chunked upstream
    /// body exceeds `limit` bytes.
    pub fn with_max_chunked_body(mut self, limit: usize) -> Self {
        self.max_chunked_body = Some(limit);
        self
    }

    /// Settings for the default transport. Ignored when a custom transport
    /// is installed.
    pub fn with_transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = Some(config);
        self
    }

    pub fn with_rewriter<R: Rewriter + 'static>(mut self, rewriter: R) -> Self {
        self.rewriter = Some(Arc::new(rewriter));
        self
    }

    pub fn with_transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn with_error_handler<H: ErrorHandler + 'static>(mut self, handler: H) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Append a response modifier; modifiers run in the order added.
    pub fn with_response_modifier<M: ResponseModifier + 'static>(mut self, modifier: M) -> Self {
        self.response_modifiers.push(Arc::new(modifier));
        self
    }

    pub fn build(self) -> Result<Forwarder, ForwardError> {
        let hostname = self.hostname.unwrap_or_else(local_hostname);
        if !hostname.is_empty() && HeaderValue::from_str(&hostname).is_err() {
            return Err(ForwardError::InvalidConfig(format!(
                "hostname {hostname:?} is not a valid header value"
            )));
        }
        if self.max_chunked_body == Some(0) {
            return Err(ForwardError::InvalidConfig(
                "max_chunked_body must be greater than zero".to_string(),
            ));
        }

        let rewriter = self.rewriter.unwrap_or_else(|| {
            Arc::new(HeaderRewriter {
                trust_forward_header: self.trust_forward_header,
                hostname: hostname.clone(),
            })
        });
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.transport_config.unwrap_or_default())),
        };
        let error_handler = self
            .error_handler
            .unwrap_or_else(|| Arc::new(DefaultErrorHandler));

        let config = ForwardConfig {
            trust_forward_header: self.trust_forward_header,
            hostname,
            pass_client_cert: self.pass_client_cert,
            pass_host_header: self.pass_host_header,
            max_chunked_body: self.max_chunked_body,
            rewriter,
            transport,
            error_handler,
            response_modifiers: self.response_modifiers,
        };

        debug_fmt!("Forwarder", "built {:?}", config);

        Ok(Forwarder {
            config: Arc::new(config),
        })
    }
}

/// The machine hostname, or an empty string when it can not be determined.
fn local_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn_fmt!("Forwarder", "could not determine hostname: {}", e);
            String::new()
        }
    }
}

/// Relays requests to upstream servers.
#[derive(Debug, Clone)]
pub struct Forwarder {
    config: Arc<ForwardConfig>,
}

impl Forwarder {
    /// A forwarder with default settings.
    pub fn new() -> Result<Self, ForwardError> {
        Self::builder().build()
    }

    pub fn builder() -> ForwardConfigBuilder {
        ForwardConfigBuilder::new()
    }

    /// Build a forwarder from the `forward` section of `config`.
    pub fn from_config(config: &Config) -> Result<Self, ForwardError> {
        let settings = ForwardSettings::load(config)?;
        ForwardConfigBuilder::from_settings(settings).build()
    }

    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    /// Forward `request` to `upstream` and produce the response for the
    /// caller.
    ///
    /// Only the scheme and authority of `upstream` are used; path and
    /// query are taken verbatim from the inbound request.
    pub async fn forward<B>(&self, upstream: &Uri, request: Request<B>) -> Response<ForwardBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let started = Instant::now();
        let (parts, inbound_body) = request.into_parts();

        let result = match parts.extensions.get::<Deadline>() {
            Some(Deadline(at)) => {
                let at = *at;
                if Instant::now() >= at {
                    Err(ForwardError::DeadlineExceeded)
                } else {
                    let exchange = self.exchange(upstream, &parts, body::boxed(inbound_body));
                    tokio::time::timeout_at(tokio::time::Instant::from_std(at), exchange)
                        .await
                        .unwrap_or(Err(ForwardError::DeadlineExceeded))
                }
            }
            None => {
                self.exchange(upstream, &parts, body::boxed(inbound_body))
                    .await
            }
        };

        match result {
            Ok(response) => {
                debug_fmt!(
                    "Forwarder",
                    "{} {} -> {} in {:?}",
                    parts.method,
                    parts.uri.path(),
                    response.status(),
                    started.elapsed()
                );
                response
            }
            Err(err) => {
                warn_fmt!(
                    "Forwarder",
                    "{} {} to {} failed: {}",
                    parts.method,
                    parts.uri.path(),
                    upstream,
                    err
                );
                let response = self.config.error_handler.handle(&parts, &err).await;
                debug_fmt!(
                    "Forwarder",
                    "{} {} -> {} in {:?}",
                    parts.method,
                    parts.uri.path(),
                    response.status(),
                    started.elapsed()
                );
                response
            }
        }
    }

    /// Round trip plus response processing.
    async fn exchange(
        &self,
        upstream: &Uri,
        inbound: &Parts,
        body: ForwardBody,
    ) -> Result<Response<ForwardBody>, ForwardError> {
        let outbound = self.outbound_request(upstream, inbound, body)?;

        let response = self.config.transport.round_trip(outbound).await?;
        let (mut head, body) = response.into_parts();

        // Transfer-Encoding is hop-by-hop, read it before it is stripped
        let chunked = headers::is_chunked(&head.headers);
        headers::strip_hop_headers(&mut head.headers);

        modifier::apply_all(&self.config.response_modifiers, &mut head)
            .map_err(ForwardError::Modifier)?;

        let options = RelayOptions {
            chunked,
            head_request: inbound.method == Method::HEAD,
            limit: self.config.max_chunked_body,
        };
        relay::relay(head, body, options).await
    }

    /// Derive the upstream request from the inbound head.
    fn outbound_request(
        &self,
        upstream: &Uri,
        inbound: &Parts,
        body: ForwardBody,
    ) -> Result<Request<ForwardBody>, ForwardError> {
        let uri = target_uri(upstream, &inbound.uri)?;

        let unknown = ConnectionInfo::default();
        let conn = inbound.extensions.get::<ConnectionInfo>().unwrap_or(&unknown);

        let mut outbound_headers = inbound.headers.clone();
        headers::strip_hop_headers(&mut outbound_headers);
        self.config.rewriter.rewrite(&mut outbound_headers, inbound, conn);
        if self.config.pass_client_cert {
            client_cert::apply(&mut outbound_headers, conn);
        }
        if !self.config.pass_host_header {
            outbound_headers.remove(header::HOST);
        }

        let mut request = Request::new(body);
        *request.method_mut() = inbound.method.clone();
        *request.uri_mut() = uri;
        *request.version_mut() = Version::HTTP_11;
        *request.headers_mut() = outbound_headers;
        Ok(request)
    }
}

/// Upstream scheme and authority joined with the inbound path and query.
fn target_uri(upstream: &Uri, inbound: &Uri) -> Result<Uri, ForwardError> {
    let scheme = upstream
        .scheme()
        .cloned()
        .ok_or_else(|| ForwardError::InvalidTarget(format!("{upstream} has no scheme")))?;
    let authority = upstream
        .authority()
        .cloned()
        .ok_or_else(|| ForwardError::InvalidTarget(format!("{upstream} has no authority")))?;
    let path_and_query = inbound
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));

    Ok(Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()?)
}
