use std::sync::Arc;

use crate::application::ports::debugging_key_repository::DebuggingKeyRepository;
use crate::application::ports::permission_repository::PermissionRepository;
use crate::application::services::install::InstallOrchestrator;
use crate::bootstrap::config::Config;

#[derive(Clone)]
pub struct AppContext {
    pub cfg: Config,
    services: Arc<AppServices>,
}

pub struct AppServices {
    permission_repo: Arc<dyn PermissionRepository>,
    debugging_keys: Arc<dyn DebuggingKeyRepository>,
    orchestrator: Arc<InstallOrchestrator>,
}

impl AppServices {
    pub fn new(
        permission_repo: Arc<dyn PermissionRepository>,
        debugging_keys: Arc<dyn DebuggingKeyRepository>,
        orchestrator: Arc<InstallOrchestrator>,
    ) -> Self {
        Self {
            permission_repo,
            debugging_keys,
            orchestrator,
        }
    }
}

impl AppContext {
    pub fn new(cfg: Config, services: AppServices) -> Self {
        Self {
            cfg,
            services: Arc::new(services),
        }
    }

    pub fn permission_repo(&self) -> Arc<dyn PermissionRepository> {
        self.services.permission_repo.clone()
    }

    pub fn debugging_keys(&self) -> Arc<dyn DebuggingKeyRepository> {
        self.services.debugging_keys.clone()
    }

    pub fn orchestrator(&self) -> Arc<InstallOrchestrator> {
        self.services.orchestrator.clone()
    }
}
