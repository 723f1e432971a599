//! Shared infrastructure for the Tradewinds platform services
//!
//! This crate holds the pieces every service needs: PostgreSQL connection
//! pooling, Redis access, and the common error types.

pub mod cache;
pub mod database;
pub mod error;
