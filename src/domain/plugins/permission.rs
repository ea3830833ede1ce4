use serde::{Deserialize, Serialize};

/// Role the platform's token layer asserts for the caller within the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantRole {
    Owner,
    Admin,
    Member,
}

impl TenantRole {
    pub fn is_admin_or_owner(&self) -> bool {
        matches!(self, TenantRole::Owner | TenantRole::Admin)
    }
}

impl std::str::FromStr for TenantRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(TenantRole::Owner),
            "admin" => Ok(TenantRole::Admin),
            "member" => Ok(TenantRole::Member),
            other => anyhow::bail!("unknown tenant role: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Everyone,
    Admins,
    Nobody,
}

impl PermissionLevel {
    pub fn permits(&self, role: TenantRole) -> bool {
        match self {
            PermissionLevel::Everyone => true,
            PermissionLevel::Admins => role.is_admin_or_owner(),
            PermissionLevel::Nobody => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Everyone => "everyone",
            PermissionLevel::Admins => "admins",
            PermissionLevel::Nobody => "nobody",
        }
    }
}

impl std::str::FromStr for PermissionLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "everyone" => Ok(PermissionLevel::Everyone),
            "admins" => Ok(PermissionLevel::Admins),
            "nobody" => Ok(PermissionLevel::Nobody),
            other => anyhow::bail!("unknown permission level: {other}"),
        }
    }
}

/// Per-tenant policy row. Absence of a row means the default applies, which
/// is permissive so existing tenants are unaffected until an admin tightens
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantPluginPermission {
    pub install_permission: PermissionLevel,
    pub debug_permission: PermissionLevel,
}

impl Default for TenantPluginPermission {
    fn default() -> Self {
        Self {
            install_permission: PermissionLevel::Everyone,
            debug_permission: PermissionLevel::Everyone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admins_level_excludes_members() {
        assert!(PermissionLevel::Admins.permits(TenantRole::Owner));
        assert!(PermissionLevel::Admins.permits(TenantRole::Admin));
        assert!(!PermissionLevel::Admins.permits(TenantRole::Member));
    }

    #[test]
    fn default_policy_is_open() {
        let p = TenantPluginPermission::default();
        assert!(p.install_permission.permits(TenantRole::Member));
        assert!(p.debug_permission.permits(TenantRole::Member));
    }
}
