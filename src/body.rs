// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The body type that flows through the forwarder.
//!
//! Inbound bodies, outbound bodies and upstream responses are all boxed
//! into a [`ForwardBody`] so that hooks and transports can be swapped
//! without leaking concrete hyper / reqwest body types into their
//! signatures. Only `Send` is required, which lets both hyper's
//! `Incoming` and reqwest streams be carried.

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

use crate::error::BoxError;

/// Boxed, streaming HTTP body.
pub type ForwardBody = UnsyncBoxBody<Bytes, BoxError>;

/// A body holding the given bytes.
pub fn full<T: Into<Bytes>>(chunk: T) -> ForwardBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A body without content.
pub fn empty() -> ForwardBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Box any compatible body.
pub fn boxed<B>(body: B) -> ForwardBody
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}
