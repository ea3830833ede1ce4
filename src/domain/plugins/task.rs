use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identifier::PluginIdentifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Succeeded | ItemStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Running => "running",
            ItemStatus::Succeeded => "succeeded",
            ItemStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "running" => Ok(ItemStatus::Running),
            "succeeded" => Ok(ItemStatus::Succeeded),
            "failed" => Ok(ItemStatus::Failed),
            other => anyhow::bail!("unknown item status: {other}"),
        }
    }
}

/// Aggregate status, always derived from the items and never stored on its
/// own row. Terminal iff every item is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    PartiallySucceeded,
    Failed,
}

/// One unit of install work: a single plugin identifier within a task.
/// Mutated only by the worker dispatched for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallTaskItem {
    pub identifier: PluginIdentifier,
    pub status: ItemStatus,
    /// Present iff the item failed; the causing error captured verbatim.
    pub error: Option<String>,
    /// Secondary notice that does not affect the status, e.g. an upgrade
    /// whose old registration could not be removed.
    pub warning: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl InstallTaskItem {
    pub fn pending(identifier: PluginIdentifier, now: DateTime<Utc>) -> Self {
        Self {
            identifier,
            status: ItemStatus::Pending,
            error: None,
            warning: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallTask {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub items: Vec<InstallTaskItem>,
}

impl InstallTask {
    pub fn new(tenant_id: Uuid, items: Vec<InstallTaskItem>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            created_at: Utc::now(),
            items,
        }
    }

    pub fn status(&self) -> TaskStatus {
        if self.items.iter().all(|i| i.status == ItemStatus::Pending) {
            return TaskStatus::Pending;
        }
        if !self.is_terminal() {
            return TaskStatus::Running;
        }
        let failed = self
            .items
            .iter()
            .filter(|i| i.status == ItemStatus::Failed)
            .count();
        if failed == 0 {
            TaskStatus::Succeeded
        } else if failed == self.items.len() {
            TaskStatus::Failed
        } else {
            TaskStatus::PartiallySucceeded
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.items.iter().all(|i| i.status.is_terminal())
    }

    pub fn item(&self, identifier: &PluginIdentifier) -> Option<&InstallTaskItem> {
        self.items.iter().find(|i| &i.identifier == identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(n: u32) -> PluginIdentifier {
        PluginIdentifier::parse(&format!("acme/plug{n}:1.0.0@9f86d081884c7d65")).unwrap()
    }

    fn task(statuses: &[ItemStatus]) -> InstallTask {
        let now = Utc::now();
        let items = statuses
            .iter()
            .enumerate()
            .map(|(n, s)| {
                let mut item = InstallTaskItem::pending(ident(n as u32), now);
                item.status = *s;
                item
            })
            .collect();
        InstallTask::new(Uuid::new_v4(), items)
    }

    #[test]
    fn all_pending_is_pending() {
        assert_eq!(
            task(&[ItemStatus::Pending, ItemStatus::Pending]).status(),
            TaskStatus::Pending
        );
    }

    #[test]
    fn any_nonterminal_is_running() {
        let t = task(&[ItemStatus::Succeeded, ItemStatus::Running]);
        assert_eq!(t.status(), TaskStatus::Running);
        assert!(!t.is_terminal());
    }

    #[test]
    fn terminal_iff_all_items_terminal() {
        let t = task(&[ItemStatus::Succeeded, ItemStatus::Failed]);
        assert!(t.is_terminal());
        assert_eq!(t.status(), TaskStatus::PartiallySucceeded);

        let t = task(&[ItemStatus::Failed, ItemStatus::Failed]);
        assert_eq!(t.status(), TaskStatus::Failed);

        let t = task(&[ItemStatus::Succeeded]);
        assert_eq!(t.status(), TaskStatus::Succeeded);
    }
}
