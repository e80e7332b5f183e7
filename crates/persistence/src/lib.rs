//! Persistence layer for the AuraClub backend.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - Repository implementations, including the atomic ledger writes
//! - Query timing metrics

pub mod db;
pub mod entities;
pub mod error;
pub mod metrics;
pub mod repositories;

pub use error::RepositoryError;
