// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! fwdproxy - a single-hop HTTP forwarder
//!
//! Given an inbound request and an already resolved upstream, a
//! [`Forwarder`] relays the request and hands back the upstream response
//! while keeping proxy semantics intact:
//!
//! - hop-by-hop headers are stripped in both directions,
//! - `X-Forwarded-Proto/For/Host/Server` are rewritten, trusting caller
//!   supplied values only when told to,
//! - the verified client certificate chain can be passed upstream in
//!   `X-Forwarded-Ssl-Client-Cert`,
//! - chunked upstream bodies reach the caller with an exact
//!   `Content-Length`,
//! - path and query reach the upstream byte for byte.
//!
//! Every step that is policy rather than protocol is a trait: the
//! [`Transport`] doing the round trip, the [`Rewriter`] for forwarded
//! headers, [`ResponseModifier`]s and the [`ErrorHandler`] answering
//! failed forwards (`502 Bad Gateway`, or `504 Gateway Timeout` for
//! timeouts, by default).
//!
//! ```rust,no_run
//! use fwdproxy::{ConnectionInfo, Forwarder, BoxError};
//! use hyper::http::response::Parts;
//! use hyper::{Request, Uri};
//! use http_body_util::Empty;
//! use bytes::Bytes;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let forwarder = Forwarder::builder()
//!     .with_trust_forward_header(false)
//!     .with_response_modifier(|head: &mut Parts| -> Result<(), BoxError> {
//!         head.headers.insert("x-served-by", "fwdproxy".parse()?);
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let mut request = Request::get("/hello?x=1").body(Empty::<Bytes>::new())?;
//! request
//!     .extensions_mut()
//!     .insert(ConnectionInfo::plain("10.0.0.7:51234".parse()?));
//!
//! let upstream = Uri::from_static("http://backend.internal:8080");
//! let response = forwarder.forward(&upstream, request).await;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! The forwarder, the bundled listener and logging can be configured from
//! files (JSON, TOML, YAML) and `FWDPROXY_` environment variables through
//! the layered providers in [`config`]; [`Loader`] wires it all together.

pub mod body;
pub mod client_cert;
pub mod config;
pub mod conn;
pub mod error;
pub mod error_handler;
pub mod forward;
pub mod headers;
pub mod loader;
pub mod logging;
pub mod modifier;
pub mod relay;
pub mod rewrite;
pub mod server;
pub mod transport;

pub use body::ForwardBody;
pub use config::{Config, ConfigError, ConfigProvider, ConfigProviderExt};
pub use conn::{ConnectionInfo, Deadline, TlsInfo};
pub use error::{BoxError, ForwardError};
pub use error_handler::{handler_fn, DefaultErrorHandler, ErrorHandler};
pub use forward::{ForwardConfig, ForwardConfigBuilder, ForwardSettings, Forwarder};
pub use loader::{FwdProxy, Loader, LoaderError};
pub use modifier::ResponseModifier;
pub use rewrite::{HeaderRewriter, Rewriter};
pub use server::{ForwardServer, ServerConfig};
pub use transport::{HttpTransport, ReqwestTransport, Transport, TransportConfig};
