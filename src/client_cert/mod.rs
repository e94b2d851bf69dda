// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client certificate forwarding.
//!
//! When TLS is terminated in front of the forwarder the upstream can no
//! longer see the client certificate. With `pass_client_cert` enabled the
//! verified peer chain is PEM encoded, stripped of its armour lines and
//! newlines so it fits into a single header value, and sent upstream as
//! `X-Forwarded-Ssl-Client-Cert`. Multiple certificates are joined with
//! [`CHAIN_SEPARATOR`], leaf first.
//!
//! Encoding problems never fail the request: the header is simply left out.


use hyper::header::{HeaderMap, HeaderValue};
use openssl::error::ErrorStack;
use openssl::x509::X509;

use crate::conn::ConnectionInfo;
use crate::headers::X_FORWARDED_SSL_CLIENT_CERT;
use crate::{trace_fmt, warn_fmt};

/// Separator between certificates of a forwarded chain.
pub const CHAIN_SEPARATOR: &str = ",";

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// Strip the PEM armour and every line break from a PEM block.
pub fn sanitize(pem: &[u8]) -> String {
    String::from_utf8_lossy(pem)
        .replace(PEM_BEGIN, "")
        .replace(PEM_END, "")
        .replace(['\r', '\n'], "")
}

/// Encode a DER certificate chain into the forwarded header value.
pub fn encode_chain(chain: &[Vec<u8>]) -> Result<String, ErrorStack> {
    let blocks = chain
        .iter()
        .map(|der| X509::from_der(der)?.to_pem().map(|pem| sanitize(&pem)))
        .collect::<Result<Vec<_>, ErrorStack>>()?;
    Ok(blocks.join(CHAIN_SEPARATOR))
}

/// Replace any caller supplied certificate header with the verified peer
/// chain of `conn`, or remove it when no certificate was presented.
pub fn apply(headers: &mut HeaderMap, conn: &ConnectionInfo) {
    headers.remove(X_FORWARDED_SSL_CLIENT_CERT);

    let Some(chain) = conn.peer_certificates() else {
        return;
    };

    let encoded = match encode_chain(chain) {
        Ok(encoded) => encoded,
        Err(e) => {
            warn_fmt!("ClientCert", "omitting client certificate header: {}", e);
            return;
        }
    };

    match HeaderValue::from_str(&encoded) {
        Ok(value) => {
            trace_fmt!("ClientCert", "forwarding {} certificate(s)", chain.len());
            headers.insert(X_FORWARDED_SSL_CLIENT_CERT, value);
        }
        Err(e) => warn_fmt!("ClientCert", "omitting client certificate header: {}", e),
    }
}
