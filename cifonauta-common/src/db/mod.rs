//! Database models and queries

pub mod entities;
pub mod init;
pub mod media;
pub mod models;
pub mod persons;
pub mod retry;
pub mod tags;
pub mod taxa;
pub mod tours;

pub use init::*;
pub use models::*;
pub use retry::{retry_on_lock, WRITE_LOCK_WAIT_MS};
