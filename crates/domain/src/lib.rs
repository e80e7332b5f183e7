//! Domain layer for the AuraClub backend.
//!
//! This crate contains:
//! - Domain models (User, Transaction, Event, Promotion) and request DTOs
//! - Role clearance ordering
//! - Point-ledger and scheduling rules as pure functions
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::DomainError;
