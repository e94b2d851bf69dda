// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relaying the upstream body to the caller.
//!
//! Bodies with a declared length, or delimited by connection close, are
//! streamed through without buffering. A chunked upstream body is decoded
//! completely and re-sent with an exact `Content-Length`, so the caller
//! never sees the upstream's chunk framing. The buffer can be capped with
//! [`RelayOptions::limit`].
//!
//! The upstream body is owned by the returned response. Dropping that
//! response at any point, for instance because the caller went away,
//! drops and closes the upstream body with it.


use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http_body_util::{BodyExt, Collected, LengthLimitError, Limited};
use hyper::header::{self, HeaderValue};
use hyper::http::response::Parts;
use hyper::{Response, StatusCode};

use crate::body::{self, ForwardBody};
use crate::error::{BoxError, ForwardError};
use crate::trace_fmt;

type Collecting = Pin<Box<dyn Future<Output = Result<Collected<Bytes>, BoxError>> + Send>>;

/// How the upstream response is framed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOptions {
    /// The upstream used chunked transfer encoding
    pub chunked: bool,
    /// The response answers a `HEAD` request
    pub head_request: bool,
    /// Maximum number of bytes buffered when re-framing a chunked body
    pub limit: Option<usize>,
}

/// Build the caller-facing response from the sanitized upstream head and body.
pub async fn relay(
    mut head: Parts,
    body: ForwardBody,
    options: RelayOptions,
) -> Result<Response<ForwardBody>, ForwardError> {
    if !options.chunked || !permits_body(head.status, options.head_request) {
        return Ok(Response::from_parts(head, body));
    }

    let bytes = match options.limit {
        Some(limit) => collect_limited(body, limit)
            .await
            .map_err(|e| {
                if e.is::<LengthLimitError>() {
                    ForwardError::BodyTooLarge(limit)
                } else {
                    ForwardError::Body(e)
                }
            })?
            .to_bytes(),
        None => body.collect().await.map_err(ForwardError::Body)?.to_bytes(),
    };

    trace_fmt!("BodyRelay", "re-framed chunked body as {} bytes", bytes.len());

    head.headers.remove(header::TRANSFER_ENCODING);
    head.headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));

    Ok(Response::from_parts(head, body::full(bytes)))
}

/// Boxed to keep the `relay` future `Send`.
fn collect_limited(body: ForwardBody, limit: usize) -> Collecting {
    Box::pin(Limited::new(body, limit).collect())
}

/// Responses to `HEAD` and 1xx/204/304 responses never carry a body.
fn permits_body(status: StatusCode, head_request: bool) -> bool {
    !(head_request
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}
