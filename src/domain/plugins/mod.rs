pub mod identifier;
pub mod manifest;
pub mod permission;
pub mod source;
pub mod task;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use identifier::PluginIdentifier;
use source::SourceKind;

/// Durable registry row: what is installed for a tenant right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInstallation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub identifier: PluginIdentifier,
    pub source: SourceKind,
    pub checksum: String,
    pub installed_at: DateTime<Utc>,
}

/// Remote-debugging credentials for a tenant. The key is regenerable and
/// carries no expiry at this layer.
#[derive(Debug, Clone, Serialize)]
pub struct DebuggingKey {
    pub key: String,
    pub host: String,
    pub port: u16,
}
