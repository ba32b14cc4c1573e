//! Database module: entity models and SQL repositories.
//!
//! - `model`: view models returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `fastwork_sync::db` — the repository
//! API and commonly used models are re-exported here.

pub mod model;
pub mod repo;

pub use model::NotificationEntry;
pub use repo::*;
