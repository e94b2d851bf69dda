// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Failure responses.
//!
//! The [`ErrorHandler`] is invoked exactly once for every forward that
//! failed, whether the round trip itself failed or a response modifier
//! rejected the upstream response. It receives the head of the original
//! inbound request, extensions included, so request scoped values put
//! there by the caller are available for diagnostics. Whatever it returns
//! is handed to the caller unchanged.

use async_trait::async_trait;
use hyper::http::request::Parts;
use hyper::{header, Response, StatusCode};

use crate::body::{self, ForwardBody};
use crate::error::ForwardError;

/// Renders the response for a failed forward.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, request: &Parts, error: &ForwardError) -> Response<ForwardBody>;
}

/// Answers `504 Gateway Timeout` for timeouts and `502 Bad Gateway`
/// otherwise, with the status text as the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler;

#[async_trait]
impl ErrorHandler for DefaultErrorHandler {
    async fn handle(&self, _request: &Parts, error: &ForwardError) -> Response<ForwardBody> {
        status_response(error.status_code())
    }
}

/// A response with `status` and its canonical reason as plain text body.
pub fn status_response(status: StatusCode) -> Response<ForwardBody> {
    let text = status.canonical_reason().unwrap_or_default();
    let mut response = Response::new(body::full(text));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Adapter turning a closure into an [`ErrorHandler`].
#[derive(Debug, Clone)]
pub struct HandlerFn<F>(F);

/// Wrap `f` as an error handler.
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&Parts, &ForwardError) -> Response<ForwardBody> + Send + Sync,
{
    HandlerFn(f)
}

#[async_trait]
impl<F> ErrorHandler for HandlerFn<F>
where
    F: Fn(&Parts, &ForwardError) -> Response<ForwardBody> + Send + Sync,
{
    async fn handle(&self, request: &Parts, error: &ForwardError) -> Response<ForwardBody> {
        (self.0)(request, error)
    }
}
