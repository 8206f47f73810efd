// DeltaSync - multi-tenant delta-sync backend
// Core library module

pub mod accounts;
pub mod api;
pub mod config;
pub mod coord;
pub mod domain;
pub mod error;
pub mod journal;
pub mod sync;
pub mod tenant;

pub use config::Config;
pub use error::{Result, SyncError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
