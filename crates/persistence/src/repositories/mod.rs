//! Repository implementations for database operations.

pub mod auth_token;
pub mod event;
pub mod promotion;
pub mod transaction;
pub mod user;

pub use auth_token::AuthTokenRepository;
pub use event::{EventFilter, EventRepository};
pub use promotion::{PromotionFilter, PromotionRepository};
pub use transaction::{
    Actor, AmountOperator, NewAdjustment, NewPurchase, TransactionFilter, TransactionRepository,
};
pub use user::{UserFilter, UserRepository};
