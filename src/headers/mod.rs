// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Header names and hop-by-hop sanitizing.
//!
//! Hop-by-hop headers describe a single transport leg and must never cross
//! the forwarder, in either direction. Besides the fixed set below, any
//! header *named* inside a `Connection` value is connection specific and
//! is stripped as well.


use hyper::header::{self, HeaderMap, HeaderName};

pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_SERVER: HeaderName = HeaderName::from_static("x-forwarded-server");
pub const X_FORWARDED_SSL_CLIENT_CERT: HeaderName =
    HeaderName::from_static("x-forwarded-ssl-client-cert");

/// The forwarded-chain headers managed by the rewriter.
pub const FORWARDED_CHAIN: [HeaderName; 4] = [
    X_FORWARDED_PROTO,
    X_FORWARDED_FOR,
    X_FORWARDED_HOST,
    X_FORWARDED_SERVER,
];

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");
const TRAILERS: HeaderName = HeaderName::from_static("trailers");
const PROXY_CONNECTION: HeaderName = HeaderName::from_static("proxy-connection");

/// Headers that are never propagated across a hop.
pub const HOP_HEADERS: [HeaderName; 10] = [
    header::CONNECTION,
    KEEP_ALIVE,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    TRAILERS,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    PROXY_CONNECTION,
];

/// Remove hop-by-hop headers, including those listed in `Connection`.
pub fn strip_hop_headers(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| HeaderName::from_bytes(token.as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_HEADERS.iter()) {
        headers.remove(name);
    }
}

/// True when the final transfer coding of the message is `chunked`.
pub fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|coding| !coding.is_empty())
        .last()
        .is_some_and(|coding| coding.eq_ignore_ascii_case("chunked"))
}

/// Join every value of `name` with `", "`, the way repeated list headers
/// are folded.
pub fn joined_values(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let values: Vec<String> = headers
        .get_all(name)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}
