pub mod install;
pub mod resolver;
