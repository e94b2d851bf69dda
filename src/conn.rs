// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Facts about the inbound connection, carried in request extensions.
//!
//! The listener that accepted the connection knows the peer address and
//! whether (and with which verified certificate chain) TLS was used. It
//! records those facts by inserting a [`ConnectionInfo`] into the request
//! extensions before calling [`Forwarder::forward`](crate::Forwarder::forward).
//! A request without one is treated as plain HTTP from an unknown peer.

use std::net::SocketAddr;
use std::time::Instant;

/// Connection-level information about the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Address of the peer that sent the request
    pub remote_addr: Option<SocketAddr>,
    /// Present when the inbound connection was TLS
    pub tls: Option<TlsInfo>,
}

/// TLS details of the inbound connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsInfo {
    /// DER encoded certificates the peer presented and the listener
    /// verified, leaf first. Empty when no client certificate was sent.
    pub peer_certificates: Vec<Vec<u8>>,
}

impl ConnectionInfo {
    /// Plain HTTP connection from `remote_addr`.
    pub fn plain(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr: Some(remote_addr),
            tls: None,
        }
    }

    /// TLS connection from `remote_addr`.
    pub fn tls(remote_addr: SocketAddr, peer_certificates: Vec<Vec<u8>>) -> Self {
        Self {
            remote_addr: Some(remote_addr),
            tls: Some(TlsInfo { peer_certificates }),
        }
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// The verified peer chain, if any certificate was presented.
    pub fn peer_certificates(&self) -> Option<&[Vec<u8>]> {
        self.tls
            .as_ref()
            .map(|tls| tls.peer_certificates.as_slice())
            .filter(|certs| !certs.is_empty())
    }
}

/// Point in time after which the round trip for this request is abandoned.
///
/// Insert it into the request extensions; an expired deadline surfaces as
/// [`ForwardError::DeadlineExceeded`](crate::ForwardError::DeadlineExceeded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(pub Instant);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_plain_and_anonymous() {
        let info = ConnectionInfo::default();
        assert!(!info.is_tls());
        assert!(info.remote_addr.is_none());
        assert!(info.peer_certificates().is_none());
    }

    #[test]
    fn test_tls_without_certificates() {
        let addr: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        let info = ConnectionInfo::tls(addr, Vec::new());
        assert!(info.is_tls());
        assert!(info.peer_certificates().is_none());
    }

    #[test]
    fn test_tls_with_certificates() {
        let addr: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        let info = ConnectionInfo::tls(addr, vec![vec![1, 2, 3]]);
        assert_eq!(info.peer_certificates().unwrap().len(), 1);
    }
}
