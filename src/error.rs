// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error taxonomy for the forwarder.
//!
//! Every failure that can happen between receiving an inbound request and
//! handing a response back to the caller is expressed as a [`ForwardError`].
//! The [`ErrorHandler`](crate::ErrorHandler) decides how each variant is
//! rendered; [`ForwardError::status_code`] is what the default handler uses.

use std::time::Duration;

use hyper::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;

/// Type-erased error used at the hook seams (transport bodies, modifiers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while forwarding a request.
#[derive(Error, Debug)]
pub enum ForwardError {
    /// The upstream could not be reached (refused, reset, DNS failure)
    #[error("upstream connection failed: {0}")]
    Connect(#[source] BoxError),

    /// The upstream did not answer within the configured timeout
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    /// The deadline attached to the inbound request expired
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// Any other failure of the round trip
    #[error("upstream round trip failed: {0}")]
    Transport(#[source] BoxError),

    /// A response modifier rejected the upstream response
    #[error("response modifier failed: {0}")]
    Modifier(#[source] BoxError),

    /// The upstream body could not be read
    #[error("failed to read upstream body: {0}")]
    Body(#[source] BoxError),

    /// A chunked upstream body exceeded the buffering limit
    #[error("chunked upstream body exceeds {0} bytes")]
    BodyTooLarge(usize),

    /// The upstream target can not be used by the transport
    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),

    /// The forwarder was configured with invalid values
    #[error("invalid forwarder configuration: {0}")]
    InvalidConfig(String),

    /// Building an HTTP message failed
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    /// Configuration could not be read
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForwardError {
    /// Returns true for failures caused by a timeout or an expired deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ForwardError::Timeout(_) | ForwardError::DeadlineExceeded)
    }

    /// Status the default error handler answers with.
    pub fn status_code(&self) -> StatusCode {
        if self.is_timeout() {
            StatusCode::GATEWAY_TIMEOUT
        } else {
            StatusCode::BAD_GATEWAY
        }
    }
}

/// Walks the source chain looking for an IO timeout.
pub(crate) fn caused_by_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        let error = ForwardError::Timeout(Duration::from_millis(5));
        assert!(error.is_timeout());
        assert_eq!(error.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(error.to_string(), "upstream timed out after 5ms");
    }

    #[test]
    fn test_deadline_maps_to_gateway_timeout() {
        let error = ForwardError::DeadlineExceeded;
        assert!(error.is_timeout());
        assert_eq!(error.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_connect_maps_to_bad_gateway() {
        let error = ForwardError::Connect(Box::new(IoError::new(
            ErrorKind::ConnectionRefused,
            "connection refused",
        )));
        assert!(!error.is_timeout());
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
        assert!(error.to_string().contains("connection refused"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_modifier_maps_to_bad_gateway() {
        let error = ForwardError::Modifier("rejected".into());
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(error.to_string(), "response modifier failed: rejected");
    }

    #[test]
    fn test_config_error_conversion() {
        let error: ForwardError = ConfigError::ParseError("bad".to_string()).into();
        assert!(matches!(error, ForwardError::Config(_)));
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_caused_by_timeout_walks_sources() {
        #[derive(Debug, Error)]
        #[error("outer")]
        struct Outer(#[source] IoError);

        let timed_out = Outer(IoError::new(ErrorKind::TimedOut, "deadline"));
        assert!(caused_by_timeout(&timed_out));

        let refused = Outer(IoError::new(ErrorKind::ConnectionRefused, "refused"));
        assert!(!caused_by_timeout(&refused));
    }
}
