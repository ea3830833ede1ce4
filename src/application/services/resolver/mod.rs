use std::io::Read;

use anyhow::Context;
use semver::Version;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::domain::plugins::identifier::PluginIdentifier;
use crate::domain::plugins::manifest::PluginManifest;

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("corrupt plugin package")]
    CorruptPackage(#[source] anyhow::Error),
    #[error("package resolves to {actual}, expected {expected}")]
    IdentityMismatch {
        expected: PluginIdentifier,
        actual: PluginIdentifier,
    },
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    vendor: String,
    name: String,
    version: String,
    #[serde(default)]
    capabilities: Vec<String>,
    min_platform_version: String,
    #[serde(default)]
    max_platform_version: Option<String>,
}

/// Pure resolution from package bytes to verified identity. Never installs,
/// so the read-only fetch-manifest query and the install workers share it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestResolver;

impl ManifestResolver {
    /// Parses the package, derives its identifier from the manifest plus the
    /// package checksum, and verifies it against an externally-asserted
    /// identifier when one exists. A mismatch means the downloaded bytes are
    /// not what the trusted name promised, and must never be installed under
    /// that name.
    pub fn resolve(
        &self,
        bytes: &[u8],
        expected: Option<&PluginIdentifier>,
    ) -> Result<(PluginIdentifier, PluginManifest), ResolveError> {
        let raw = Self::read_manifest(bytes).map_err(ResolveError::CorruptPackage)?;

        let min_platform_version = Version::parse(&raw.min_platform_version)
            .context("parse min_platform_version")
            .map_err(ResolveError::CorruptPackage)?;
        let max_platform_version = raw
            .max_platform_version
            .as_deref()
            .map(Version::parse)
            .transpose()
            .context("parse max_platform_version")
            .map_err(ResolveError::CorruptPackage)?;

        let checksum = sha256_hex(bytes);
        let identifier =
            PluginIdentifier::from_parts(&raw.vendor, &raw.name, &raw.version, &checksum)
                .context("derive plugin identifier")
                .map_err(ResolveError::CorruptPackage)?;

        if let Some(expected) = expected {
            if expected != &identifier {
                return Err(ResolveError::IdentityMismatch {
                    expected: expected.clone(),
                    actual: identifier,
                });
            }
        }

        let manifest = PluginManifest {
            identifier: identifier.clone(),
            capabilities: raw.capabilities,
            min_platform_version,
            max_platform_version,
            size_bytes: bytes.len() as u64,
            checksum,
        };
        Ok((identifier, manifest))
    }

    fn read_manifest(bytes: &[u8]) -> anyhow::Result<RawManifest> {
        let reader = std::io::Cursor::new(bytes);
        let mut zip = zip::ZipArchive::new(reader).context("open package archive")?;

        let mut contents: Option<String> = None;
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("read package entry")?;
            if file.name().ends_with("manifest.json") {
                let mut s = String::new();
                file.read_to_string(&mut s).context("read manifest.json")?;
                contents = Some(s);
                break;
            }
        }

        let contents = contents.context("manifest.json not found in package")?;
        serde_json::from_str(&contents).context("parse manifest.json")
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
