//! Session account lookup.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

use crate::types::Ledger;

/// Lookup of session account records by ledger.
pub trait AccountStore: Send + Sync {
    /// Accounts visible for `ledger`. `Value::Null` when the session has none.
    fn accounts(&self, ledger: Ledger) -> Value;
}

/// In-memory session populated by the extension after login.
#[derive(Debug, Default)]
pub struct SessionAccountStore {
    session: RwLock<HashMap<Ledger, Value>>,
}

impl SessionAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the account listing for `ledger`.
    pub fn set_accounts(&self, ledger: Ledger, accounts: Value) {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ledger, accounts);
    }

    /// Drop every listing, e.g. on logout.
    pub fn clear(&self) {
        self.session.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl AccountStore for SessionAccountStore {
    fn accounts(&self, ledger: Ledger) -> Value {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ledger)
            .cloned()
            .unwrap_or(Value::Null)
    }
}
