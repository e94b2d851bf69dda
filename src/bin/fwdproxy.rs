// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal CLI wrapper so the library can run as a stand-alone forwarder.
//!
//!  Build it with `cargo build --release --bin fwdproxy`
//!  The binary honours FWDPROXY_CONFIG_FILE or falls back to
//!  /etc/fwdproxy/config.toml. FWDPROXY_ environment variables override
//!  the file.

use std::env;
use std::error::Error;
use std::path::Path;

use fwdproxy::{info_fmt, error_fmt, FwdProxy};

const FALLBACK_CONFIG: &str = "/etc/fwdproxy/config.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let path = match env::var("FWDPROXY_CONFIG_FILE") {
        Ok(path) => {
            println!("Using configuration from {path}");
            path
        }
        Err(_) => {
            println!("No FWDPROXY_CONFIG_FILE env var found. Attempting to use {FALLBACK_CONFIG}");
            if !Path::new(FALLBACK_CONFIG).exists() {
                println!("Default configuration file {FALLBACK_CONFIG} does not exist.");
                return Err(Box::from("No configuration file found."));
            }
            FALLBACK_CONFIG.to_string()
        }
    };

    let proxy = match FwdProxy::loader()
        .with_config_file(path)
        .with_env_vars()
        .build()
    {
        Ok(proxy) => proxy,
        Err(e) => {
            println!("Failed to build proxy: {e}");
            return Err(e.into());
        }
    };

    match proxy.start().await {
        Ok(()) => info_fmt!("FwdProxy", "Server stopped gracefully"),
        Err(e) => {
            error_fmt!("FwdProxy", "Server failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
