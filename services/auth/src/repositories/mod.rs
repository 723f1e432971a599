//! Database repositories for the authentication service

pub mod user;

pub use user::{UserRepository, is_unique_violation};
