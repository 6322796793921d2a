// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use regex::{NoExpand, Regex};

use crate::LadderError;

/// Renders an address the way it is written into linker scripts.
pub fn render_address(address: u64) -> String {
    format!("{:#x}", address)
}

/// The text in a linker script that stands in for a program's base address.
#[derive(Clone, Debug)]
pub struct Placeholder {
    kind: PlaceholderKind,
    pattern: Regex,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaceholderKind {
    /// A hex literal such as `0x80400000`. It only matches as a whole token:
    /// `0x804000001` or `_0x80400000` are left alone.
    Address(u64),
    /// A dedicated marker such as `@BASE_ADDRESS@`, matched exactly.
    Marker(String),
}

impl Placeholder {
    pub fn address(address: u64) -> Result<Self, LadderError> {
        // `\b` on both sides keeps us from matching a prefix or suffix of a
        // longer literal or identifier.
        // Hex digits match in either case.
        let digits: String = format!("{:x}", address)
            .chars()
            .map(|c| match c {
                'a'..='f' => format!("[{}{}]", c, c.to_ascii_uppercase()),
                _ => c.to_string(),
            })
            .collect();
        let pattern = format!(r"\b0[xX]{}\b", digits);
        Self::build(PlaceholderKind::Address(address), &pattern)
    }

    pub fn marker(marker: &str) -> Result<Self, LadderError> {
        if marker.trim().is_empty() {
            return Err(LadderError::Placeholder {
                reason: "marker must not be blank".to_string(),
            });
        }
        Self::build(
            PlaceholderKind::Marker(marker.to_string()),
            &regex::escape(marker),
        )
    }

    fn build(
        kind: PlaceholderKind,
        pattern: &str,
    ) -> Result<Self, LadderError> {
        let pattern =
            Regex::new(pattern).map_err(|e| LadderError::Placeholder {
                reason: e.to_string(),
            })?;
        Ok(Placeholder { kind, pattern })
    }

    pub fn kind(&self) -> &PlaceholderKind {
        &self.kind
    }

    /// Number of places in `text` that would be rewritten.
    pub fn count(&self, text: &str) -> usize {
        self.pattern.find_iter(text).count()
    }

    /// Returns `text` with every occurrence replaced by `address`.
    pub fn substitute(&self, text: &str, address: u64) -> String {
        self.pattern
            .replace_all(text, NoExpand(&render_address(address)))
            .into_owned()
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PlaceholderKind::Address(a) => f.write_str(&render_address(*a)),
            PlaceholderKind::Marker(m) => f.write_str(m),
        }
    }
}
