//! # Cifonauta Common Library
//!
//! Catalog core shared by the Cifonauta tools:
//! - Database initialization, models and queries
//! - Taxon ancestor closure over nested-set coordinates
//! - Denormalized counter and tour position maintenance
//! - Catalog mutation API and event types (CatalogEvent, EventBus)
//! - Configuration loading
//! - Slug generation

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod maintenance;
pub mod slug;
pub mod taxonomy;

pub use catalog::Catalog;
pub use error::{Error, Result};
pub use maintenance::{MaintenanceReport, Maintainer};
pub use taxonomy::{resolve_ancestor_closure, TreeNode};
