pub mod debugging;
pub mod install;
pub mod list;
pub mod permissions;
pub mod tasks;
pub mod uninstall;
pub mod upgrade;
pub mod upload;
