// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Forwarded-chain header rewriting.
//!
//! The `X-Forwarded-*` headers tell the upstream who the original client
//! was. Whether the values a caller sent can be believed is a trust
//! decision: by default they are discarded and recomputed from the live
//! connection, so a client can not spoof its address or scheme. Behind a
//! trusted edge proxy, [`HeaderRewriter::trusted`] keeps and extends them.
//!
//! Site specific policies implement [`Rewriter`] and replace the default
//! through [`ForwardConfigBuilder::with_rewriter`](crate::ForwardConfigBuilder::with_rewriter).


use std::fmt;

use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::http::request::Parts;

use crate::conn::ConnectionInfo;
use crate::headers::{
    joined_values, FORWARDED_CHAIN, X_FORWARDED_FOR, X_FORWARDED_HOST, X_FORWARDED_PROTO,
    X_FORWARDED_SERVER,
};
use crate::debug_fmt;

/// Amends the forwarded-chain headers of an outbound request.
pub trait Rewriter: Send + Sync {
    /// Rewrite `outbound`, a sanitized copy of the inbound headers.
    fn rewrite(&self, outbound: &mut HeaderMap, inbound: &Parts, conn: &ConnectionInfo);
}

impl<F> Rewriter for F
where
    F: Fn(&mut HeaderMap, &Parts, &ConnectionInfo) + Send + Sync,
{
    fn rewrite(&self, outbound: &mut HeaderMap, inbound: &Parts, conn: &ConnectionInfo) {
        self(outbound, inbound, conn)
    }
}

/// The default, trust-aware rewriter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderRewriter {
    /// Keep forwarded-chain values supplied by the caller
    pub trust_forward_header: bool,
    /// Value forced into `X-Forwarded-Server`; empty leaves it unset
    pub hostname: String,
}

impl HeaderRewriter {
    /// Rewriter that recomputes every forwarded header.
    pub fn untrusted(hostname: impl Into<String>) -> Self {
        Self {
            trust_forward_header: false,
            hostname: hostname.into(),
        }
    }

    /// Rewriter that preserves and extends caller supplied headers.
    pub fn trusted(hostname: impl Into<String>) -> Self {
        Self {
            trust_forward_header: true,
            hostname: hostname.into(),
        }
    }
}

impl Rewriter for HeaderRewriter {
    fn rewrite(&self, outbound: &mut HeaderMap, inbound: &Parts, conn: &ConnectionInfo) {
        if !self.trust_forward_header {
            for name in FORWARDED_CHAIN.iter() {
                outbound.remove(name);
            }
        }

        if let Some(addr) = conn.remote_addr {
            let client_ip = addr.ip().to_string();
            let chain = match joined_values(outbound, &X_FORWARDED_FOR) {
                Some(prior) => format!("{prior}, {client_ip}"),
                None => client_ip,
            };
            match HeaderValue::from_str(&chain) {
                Ok(value) => {
                    outbound.insert(X_FORWARDED_FOR, value);
                }
                Err(_) => debug_fmt!("Rewriter", "dropping unrepresentable X-Forwarded-For {:?}", chain),
            }
        }

        if !outbound.contains_key(X_FORWARDED_PROTO) {
            let proto = if conn.is_tls() { "https" } else { "http" };
            outbound.insert(X_FORWARDED_PROTO, HeaderValue::from_static(proto));
        }

        if !outbound.contains_key(X_FORWARDED_HOST) {
            if let Some(host) = inbound_host(inbound) {
                outbound.insert(X_FORWARDED_HOST, host);
            }
        }

        if !self.hostname.is_empty() {
            match HeaderValue::from_str(&self.hostname) {
                Ok(value) => {
                    outbound.insert(X_FORWARDED_SERVER, value);
                }
                Err(_) => debug_fmt!("Rewriter", "hostname {:?} is not a valid header value", self.hostname),
            }
        }
    }
}

impl fmt::Display for HeaderRewriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy = if self.trust_forward_header { "trusted" } else { "untrusted" };
        write!(f, "{policy} header rewriter ({})", self.hostname)
    }
}

/// The host the caller addressed: the `Host` header, or the URI authority
/// for HTTP/2 requests that carry `:authority` instead.
fn inbound_host(inbound: &Parts) -> Option<HeaderValue> {
    inbound.headers.get(header::HOST).cloned().or_else(|| {
        inbound
            .uri
            .authority()
            .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
    })
}
