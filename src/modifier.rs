// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Response modifiers.
//!
//! A modifier sees the head of a successful upstream response after the
//! hop-by-hop headers were removed and before anything is written to the
//! caller. Modifiers run in the order they were added. Returning an error
//! aborts the exchange: the caller gets whatever the
//! [`ErrorHandler`](crate::ErrorHandler) produces for
//! [`ForwardError::Modifier`](crate::ForwardError::Modifier).

use std::sync::Arc;

use hyper::http::response::Parts;

use crate::error::BoxError;

/// Hook applied to the upstream response head.
pub trait ResponseModifier: Send + Sync {
    fn modify(&self, response: &mut Parts) -> Result<(), BoxError>;
}

impl<F> ResponseModifier for F
where
    F: Fn(&mut Parts) -> Result<(), BoxError> + Send + Sync,
{
    fn modify(&self, response: &mut Parts) -> Result<(), BoxError> {
        self(response)
    }
}

/// Apply `modifiers` in order, stopping at the first failure.
pub(crate) fn apply_all(
    modifiers: &[Arc<dyn ResponseModifier>],
    response: &mut Parts,
) -> Result<(), BoxError> {
    for modifier in modifiers {
        modifier.modify(response)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;
    use hyper::{Response, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn head() -> Parts {
        Response::builder()
            .status(StatusCode::OK)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_closure_modifier_adds_header() {
        let modifier = |parts: &mut Parts| -> Result<(), BoxError> {
            parts.headers.insert("x-test", HeaderValue::from_static("CUSTOM"));
            Ok(())
        };
        let mut parts = head();

        modifier.modify(&mut parts).unwrap();

        assert_eq!(parts.headers.get("x-test").unwrap(), "CUSTOM");
        assert_eq!(parts.status, StatusCode::OK);
    }

    #[test]
    fn test_apply_all_runs_in_order() {
        let first = |parts: &mut Parts| -> Result<(), BoxError> {
            parts.headers.insert("x-order", HeaderValue::from_static("first"));
            Ok(())
        };
        let second = |parts: &mut Parts| -> Result<(), BoxError> {
            parts.headers.insert("x-order", HeaderValue::from_static("second"));
            Ok(())
        };
        let modifiers: Vec<Arc<dyn ResponseModifier>> = vec![Arc::new(first), Arc::new(second)];
        let mut parts = head();

        apply_all(&modifiers, &mut parts).unwrap();

        assert_eq!(parts.headers.get("x-order").unwrap(), "second");
    }

    #[test]
    fn test_apply_all_stops_at_first_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let failing = |_: &mut Parts| -> Result<(), BoxError> { Err("rejected".into()) };
        let counting = move |_: &mut Parts| -> Result<(), BoxError> {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        let modifiers: Vec<Arc<dyn ResponseModifier>> = vec![Arc::new(failing), Arc::new(counting)];
        let mut parts = head();

        let err = apply_all(&modifiers, &mut parts).unwrap_err();

        assert_eq!(err.to_string(), "rejected");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
