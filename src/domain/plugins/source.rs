use serde::{Deserialize, Serialize};

use super::identifier::PluginIdentifier;

/// Where package bytes come from. Exactly one variant per acquisition;
/// adding a source kind is a closed-set extension handled exhaustively in
/// the acquirer.
#[derive(Debug, Clone)]
pub enum InstallSource {
    LocalPackage {
        bytes: Vec<u8>,
    },
    GitHubRelease {
        repo: String,
        version: String,
        asset: String,
    },
    Marketplace {
        identifier: PluginIdentifier,
    },
}

impl InstallSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            InstallSource::LocalPackage { .. } => SourceKind::Package,
            InstallSource::GitHubRelease { .. } => SourceKind::Github,
            InstallSource::Marketplace { .. } => SourceKind::Marketplace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Package,
    Github,
    Marketplace,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Package => "package",
            SourceKind::Github => "github",
            SourceKind::Marketplace => "marketplace",
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "package" => Ok(SourceKind::Package),
            "github" => Ok(SourceKind::Github),
            "marketplace" => Ok(SourceKind::Marketplace),
            other => anyhow::bail!("unknown source kind: {other}"),
        }
    }
}
