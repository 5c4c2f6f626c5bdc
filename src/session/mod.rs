pub mod store;

pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};

use std::sync::Arc;

use log::info;

use crate::error::Result;

/// Explicitly constructed session handle, passed to every component that
/// needs the credential. Replaces the old module-level token global.
#[derive(Clone)]
pub struct SessionContext {
    store: Arc<dyn TokenStore>,
}

impl SessionContext {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTokenStore::new()))
    }

    /// Current session token, if any. A missing value, an empty value, or
    /// the literal string "null" (a stringified empty slot left behind by
    /// older console builds) all count as unauthenticated.
    pub fn token(&self) -> Option<String> {
        self.store
            .load()
            .filter(|token| !token.is_empty() && token != "null")
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn store_token(&self, token: &str) -> Result<()> {
        self.store.save(token)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear()?;
        info!("Session token cleared");
        Ok(())
    }
}
