use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// vendor/name:version@checksum, e.g. "acme/translator:1.2.0@9f86d08..."
static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9_-]+)/([a-z0-9_-]+):([A-Za-z0-9.+-]+)@([0-9a-f]{16,64})$")
        .expect("valid regex")
});

/// Canonical plugin identity. The encoded string is the dedup and
/// concurrency key for every install/uninstall operation, so it is parsed
/// once at the boundary and never rebuilt from parts afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginIdentifier(String);

#[derive(thiserror::Error, Debug)]
#[error("malformed plugin identifier: {0}")]
pub struct MalformedIdentifier(pub String);

impl PluginIdentifier {
    pub fn parse(raw: &str) -> Result<Self, MalformedIdentifier> {
        if IDENTIFIER_RE.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(MalformedIdentifier(raw.to_string()))
        }
    }

    /// Builds the canonical encoding from resolved package metadata.
    pub fn from_parts(
        vendor: &str,
        name: &str,
        version: &str,
        checksum: &str,
    ) -> Result<Self, MalformedIdentifier> {
        Self::parse(&format!("{vendor}/{name}:{version}@{checksum}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn vendor(&self) -> &str {
        self.capture(1)
    }

    pub fn name(&self) -> &str {
        self.capture(2)
    }

    pub fn version(&self) -> &str {
        self.capture(3)
    }

    pub fn checksum(&self) -> &str {
        self.capture(4)
    }

    fn capture(&self, idx: usize) -> &str {
        IDENTIFIER_RE
            .captures(&self.0)
            .and_then(|c| c.get(idx))
            .map(|m| m.as_str())
            .unwrap_or_default()
    }
}

impl fmt::Display for PluginIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
