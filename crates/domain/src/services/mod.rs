//! Domain services for AuraClub.
//!
//! Services contain business logic that operates on domain models.

pub mod ledger;

pub use ledger::{EarnRate, PurchaseQuote};
