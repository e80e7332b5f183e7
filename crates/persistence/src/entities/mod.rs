//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod auth_token;
pub mod event;
pub mod promotion;
pub mod transaction;
pub mod user;

pub use auth_token::{LoginTokenEntity, ResetTokenEntity};
pub use event::{EventEntity, EventGuestEntity, EventPersonEntity};
pub use promotion::PromotionEntity;
pub use transaction::TransactionEntity;
pub use user::UserEntity;
