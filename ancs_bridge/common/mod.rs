pub mod apis;
pub mod config;
pub mod error;
pub mod external_apis;
