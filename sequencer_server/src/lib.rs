pub mod actor;
pub mod config;
pub mod error;
pub mod metrics;
pub mod persistence;
pub mod registry;
pub mod rest;
pub mod router;

pub use config::Config;
pub use router::AppState;
