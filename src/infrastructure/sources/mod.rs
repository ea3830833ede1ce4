pub mod github_reqwest;
pub mod marketplace_reqwest;
