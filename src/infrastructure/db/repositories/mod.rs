pub mod debugging_key_repository_sqlx;
pub mod install_task_repository_sqlx;
pub mod permission_repository_sqlx;
pub mod plugin_registry_repository_sqlx;
