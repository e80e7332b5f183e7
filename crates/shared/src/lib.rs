//! Shared utilities and common types for the AuraClub backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Token hashing and generation
//! - Password hashing with Argon2id
//! - JWT issue and verification
//! - Field validators (utorid, university email, password policy)
//! - Page/limit pagination

pub mod crypto;
pub mod jwt;
pub mod pagination;
pub mod password;
pub mod validation;
