pub mod debugging_key_repository;
pub mod install_task_repository;
pub mod package_sources;
pub mod permission_repository;
pub mod plugin_registry_repository;
