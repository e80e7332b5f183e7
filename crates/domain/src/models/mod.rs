//! Domain models for AuraClub.

pub mod auth;
pub mod event;
pub mod promotion;
pub mod role;
pub mod transaction;
pub mod user;

pub use event::{Event, EventGuest, EventPerson, RsvpStatus};
pub use promotion::{Promotion, PromotionType, PromotionWindow};
pub use role::{EventClearance, Role};
pub use transaction::{Transaction, TransactionCommand, TransactionType};
pub use user::User;
