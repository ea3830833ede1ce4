use semver::Version;
use serde::{Deserialize, Serialize};

use super::identifier::PluginIdentifier;

/// Metadata resolved from a package. Produced once per acquisition by the
/// manifest resolver and treated as immutable from then on. Only identity
/// and compatibility matter at this layer; tool/model declarations inside
/// the package are opaque capabilities here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub identifier: PluginIdentifier,
    pub capabilities: Vec<String>,
    pub min_platform_version: Version,
    pub max_platform_version: Option<Version>,
    pub size_bytes: u64,
    pub checksum: String,
}

impl PluginManifest {
    pub fn supports_platform(&self, platform: &Version) -> bool {
        if platform < &self.min_platform_version {
            return false;
        }
        match &self.max_platform_version {
            Some(max) => platform <= max,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(min: &str, max: Option<&str>) -> PluginManifest {
        PluginManifest {
            identifier: PluginIdentifier::parse("acme/translator:1.0.0@9f86d081884c7d65")
                .unwrap(),
            capabilities: vec!["tool".into()],
            min_platform_version: Version::parse(min).unwrap(),
            max_platform_version: max.map(|v| Version::parse(v).unwrap()),
            size_bytes: 42,
            checksum: "9f86d081884c7d65".into(),
        }
    }

    #[test]
    fn open_ended_compatibility() {
        let m = manifest("1.0.0", None);
        assert!(m.supports_platform(&Version::parse("9.9.9").unwrap()));
        assert!(!m.supports_platform(&Version::parse("0.9.0").unwrap()));
    }

    #[test]
    fn bounded_compatibility() {
        let m = manifest("1.0.0", Some("2.0.0"));
        assert!(m.supports_platform(&Version::parse("1.5.0").unwrap()));
        assert!(!m.supports_platform(&Version::parse("2.0.1").unwrap()));
    }

    #[test]
    fn version_bounds_serialize_as_plain_strings() {
        let m = manifest("1.2.0", Some("2.0.0-rc.1"));
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["min_platform_version"], "1.2.0");
        assert_eq!(json["max_platform_version"], "2.0.0-rc.1");
        let back: PluginManifest = serde_json::from_value(json).unwrap();
        assert_eq!(back.min_platform_version, m.min_platform_version);
    }
}
