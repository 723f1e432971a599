//! Authentication service models

pub mod account;
pub mod user;

// Re-export for convenience
pub use account::{Account, is_valid_account_kind};
pub use user::{NewUser, User, UserProfile};
