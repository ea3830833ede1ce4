pub mod db;
pub mod sources;
