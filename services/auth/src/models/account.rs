//! Trading account model
//!
//! Accounts are dependent records created with the user at registration
//! and activated when the email is verified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account kinds a registration may request
pub const ACCOUNT_KINDS: [&str; 2] = ["cash", "margin"];

/// Default account kind when a registration requests none
pub const DEFAULT_ACCOUNT_KIND: &str = "cash";

/// Account entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub status: String,
    pub balance_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether a requested account kind is one we support
pub fn is_valid_account_kind(kind: &str) -> bool {
    ACCOUNT_KINDS.contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_kinds() {
        assert!(is_valid_account_kind("cash"));
        assert!(is_valid_account_kind("margin"));
        assert!(!is_valid_account_kind("crypto"));
        assert!(!is_valid_account_kind(""));
    }
}
