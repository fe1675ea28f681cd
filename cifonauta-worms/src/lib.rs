//! # Cifonauta WoRMS client
//!
//! Async client for the World Register of Marine Species REST service
//! and import of its classifications into the catalog taxonomy.

pub mod client;
pub mod error;
pub mod import;
pub mod records;

pub use client::AphiaClient;
pub use error::{Result, WormsError};
pub use import::catalog_rank;
pub use records::{AphiaRecord, Classification, Distribution, ExternalIdType, Source, Vernacular};
