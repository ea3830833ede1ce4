use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::plugins::identifier::PluginIdentifier;
use crate::domain::plugins::manifest::PluginManifest;

struct CacheEntry {
    bytes: Vec<u8>,
    manifest: PluginManifest,
    inserted_at: Instant,
}

/// Holds uploaded package bytes between the upload call (which resolves and
/// returns the manifest) and the install call (which references the package
/// by identifier alone). Entries are tenant-scoped and expire after a TTL;
/// a background loop prunes them.
pub struct PackageCache {
    ttl: Duration,
    entries: RwLock<HashMap<(Uuid, PluginIdentifier), CacheEntry>>,
}

impl PackageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn put(
        &self,
        tenant_id: Uuid,
        identifier: PluginIdentifier,
        bytes: Vec<u8>,
        manifest: PluginManifest,
    ) {
        let mut entries = self.entries.write().await;
        entries.insert(
            (tenant_id, identifier),
            CacheEntry {
                bytes,
                manifest,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn package(
        &self,
        tenant_id: Uuid,
        identifier: &PluginIdentifier,
    ) -> Option<Vec<u8>> {
        let entries = self.entries.read().await;
        entries
            .get(&(tenant_id, identifier.clone()))
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .map(|e| e.bytes.clone())
    }

    pub async fn manifest(
        &self,
        tenant_id: Uuid,
        identifier: &PluginIdentifier,
    ) -> Option<PluginManifest> {
        let entries = self.entries.read().await;
        entries
            .get(&(tenant_id, identifier.clone()))
            .filter(|e| e.inserted_at.elapsed() < self.ttl)
            .map(|e| e.manifest.clone())
    }

    /// Drops expired entries; returns how many were evicted.
    pub async fn prune_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.inserted_at.elapsed() < self.ttl);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::resolver::ManifestResolver;
    use crate::application::services::resolver::tests::package_bytes;

    #[tokio::test]
    async fn round_trips_within_ttl() {
        let cache = PackageCache::new(Duration::from_secs(60));
        let tenant = Uuid::new_v4();
        let bytes = package_bytes("acme", "translator", "1.0.0");
        let (id, manifest) = ManifestResolver.resolve(&bytes, None).unwrap();

        cache.put(tenant, id.clone(), bytes.clone(), manifest).await;
        assert_eq!(cache.package(tenant, &id).await, Some(bytes));
        // Another tenant cannot see the upload.
        assert!(cache.package(Uuid::new_v4(), &id).await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_invisible_and_pruned() {
        let cache = PackageCache::new(Duration::from_millis(0));
        let tenant = Uuid::new_v4();
        let bytes = package_bytes("acme", "translator", "1.0.0");
        let (id, manifest) = ManifestResolver.resolve(&bytes, None).unwrap();

        cache.put(tenant, id.clone(), bytes, manifest).await;
        assert!(cache.package(tenant, &id).await.is_none());
        assert_eq!(cache.prune_expired().await, 1);
        assert_eq!(cache.prune_expired().await, 0);
    }
}
