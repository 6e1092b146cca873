//! Session Identity
//!
//! The identity the gateway announces to the order-management service at
//! the start of every connection epoch. The session id is stable across
//! reconnects; the account list may be refreshed each epoch.

use serde::{Deserialize, Serialize};

/// Gateway session: a stable id plus the ordered set of known accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Stable session identifier.
    pub session_id: String,
    /// Known accounts, first-seen order, no duplicates.
    pub accounts: Vec<String>,
}

impl Session {
    /// Create a session, deduplicating accounts while preserving order.
    #[must_use]
    pub fn new(session_id: String, accounts: Vec<String>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let accounts = accounts
            .into_iter()
            .filter(|a| !a.is_empty() && seen.insert(a.clone()))
            .collect();
        Self {
            session_id,
            accounts,
        }
    }
}
