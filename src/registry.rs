// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use rustc_hash::FxHashMap;

use crate::Error;
use crate::Result;

/// A table of algorithm constructors keyed by name.
///
/// Names are matched case-insensitively. A registry is an ordinary value:
/// build one at start-up with `with_builtin()` of the queue discipline or
/// congestion control registry, add custom entries, and pass it to whoever
/// instantiates components by name. `Default` returns an empty table.
pub struct Registry<C> {
    entries: FxHashMap<String, (String, C)>,
}

impl<C: Copy> Registry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Register a constructor, replacing any entry with the same name.
    pub fn register(&mut self, name: &str, ctor: C) -> &mut Self {
        self.entries
            .insert(name.to_ascii_lowercase(), (name.to_string(), ctor));
        self
    }

    /// Look up the constructor registered under `name`.
    pub fn get(&self, name: &str) -> Result<C> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, ctor)| *ctor)
            .ok_or_else(|| Error::InvalidConfig("unknown".into()))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered names, as given at registration, in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.values().map(|(n, _)| n.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl<C: Copy> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}
