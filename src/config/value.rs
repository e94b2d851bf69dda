// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory configuration provider.

use serde_json::Value;

use super::ConfigError;
use super::ConfigProvider;

/// Configuration held in a JSON document, for programmatic setups and
/// tests. Keys address nested objects with dots like the file provider.
#[derive(Debug, Clone)]
pub struct ValueConfigProvider {
    name: String,
    root: Value,
}

impl ValueConfigProvider {
    pub fn new(root: Value) -> Self {
        Self::named("value", root)
    }

    pub fn named(name: impl Into<String>, root: Value) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.root, |current, part| current.get(part))
    }
}

impl ConfigProvider for ValueConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.lookup(key).cloned())
    }
}
