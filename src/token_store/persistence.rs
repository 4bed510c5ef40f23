//! The persistence triple: local storage slot, cookie, in-memory variable.
//!
//! Writes go to all three holders in one call. Reads follow the precedence
//! local storage → cookie → memory and return the first non-empty value. A failing holder is
//! logged and skipped; it never stops the others.

use crate::config::BridgeConfig;
use crate::cookies::CookieAttributes;
use crate::messages::redact;
use crate::window::BrowsingContext;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct TokenPersistence {
    context: Arc<BrowsingContext>,
    storage_key: String,
    cookie_name: String,
    cookie: CookieAttributes,
    memory: Mutex<Option<String>>,
}

impl std::fmt::Debug for TokenPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPersistence")
            .field("storage_key", &self.storage_key)
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

impl TokenPersistence {
    pub fn new(context: Arc<BrowsingContext>, config: &BridgeConfig) -> Self {
        Self {
            context,
            storage_key: config.storage_key.clone(),
            cookie_name: config.cookie_name.clone(),
            cookie: config.cookie_attributes(),
            memory: Mutex::new(None),
        }
    }

    fn memory_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current token by read precedence.
    pub fn read(&self) -> Option<String> {
        self.stored().or_else(|| self.cookie()).or_else(|| self.memory())
    }

    /// Token in local storage, if readable and non-empty.
    pub fn stored(&self) -> Option<String> {
        match self.context.local_storage().get_item(&self.storage_key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                log::warn!("local storage read of {:?} failed: {e}", self.storage_key);
                None
            }
        }
    }

    /// Token in the cookie, if readable and non-empty.
    pub fn cookie(&self) -> Option<String> {
        match self.context.cookie_value(&self.cookie_name) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                log::warn!("cookie read of {:?} failed: {e}", self.cookie_name);
                None
            }
        }
    }

    /// Token held in memory for the life of the document.
    pub fn memory(&self) -> Option<String> {
        self.memory_slot().clone()
    }

    /// Writes `token` to all three holders. Empty tokens are ignored.
    pub fn write(&self, token: &str) {
        if token.is_empty() {
            return;
        }

        if let Err(e) = self.context.local_storage().set_item(&self.storage_key, token) {
            log::warn!("local storage write of {:?} failed: {e}", self.storage_key);
        }
        let assignment = self.cookie.assignment(&self.cookie_name, token);
        if let Err(e) = self.context.set_document_cookie(&assignment) {
            log::warn!("cookie write of {:?} failed: {e}", self.cookie_name);
        }
        *self.memory_slot() = Some(token.to_string());
    }

    /// Empties all three holders.
    pub fn clear(&self) {
        if let Err(e) = self.context.local_storage().remove_item(&self.storage_key) {
            log::warn!("local storage removal of {:?} failed: {e}", self.storage_key);
        }
        let assignment = self.cookie.deletion(&self.cookie_name);
        if let Err(e) = self.context.set_document_cookie(&assignment) {
            log::warn!("cookie removal of {:?} failed: {e}", self.cookie_name);
        }
        *self.memory_slot() = None;
    }

    /// Copies the memory token back into local storage when storage lost it.
    ///
    /// Returns true when a value was restored.
    pub fn restore_storage(&self) -> bool {
        let Some(token) = self.memory() else {
            return false;
        };

        match self.context.local_storage().get_item(&self.storage_key) {
            Ok(Some(current)) if !current.is_empty() => false,
            Ok(_) => match self.context.local_storage().set_item(&self.storage_key, &token) {
                Ok(()) => {
                    log::info!("restored token {} into local storage", redact(&token));
                    true
                }
                Err(e) => {
                    log::warn!("local storage restore failed: {e}");
                    false
                }
            },
            // Storage is unusable; memory keeps the token for this document.
            Err(_) => false,
        }
    }
}
