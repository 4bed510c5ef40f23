//! Token Store: the agent running inside the hidden iframe.
//!
//! The store owns the visitor token for its origin. On [`TokenStore::initialize`] it resolves
//! the token (local storage, then cookie, then memory), generates one when none exists,
//! persists it to all three holders and spawns a worker that
//!
//! - answers `GET_TOKEN` from the parent window with `TOKEN_READY`,
//! - applies `RESET_TOKEN` and `SET_TOKEN`,
//! - rewrites the token into local storage every check interval when storage lost it.
//!
//! The worker stops when the document unloads.

mod persistence;
mod token;
mod worker;

pub use persistence::TokenPersistence;
pub use token::generate_token;

use crate::config::BridgeConfig;
use crate::messages::{is_well_formed_token, redact, Message, TokenReady};
use crate::token_store::worker::StoreWorker;
use crate::window::{BrowsingContext, MessageEvent, TargetOrigin};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

/// Handle to a Token Store. Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: BridgeConfig,
    context: Arc<BrowsingContext>,
    persistence: TokenPersistence,
    initialized: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("context", &self.inner.context)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn new(config: BridgeConfig, context: Arc<BrowsingContext>) -> Self {
        let persistence = TokenPersistence::new(context.clone(), &config);
        Self {
            inner: Arc::new(StoreInner {
                config,
                context,
                persistence,
                initialized: AtomicBool::new(false),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Brings the store up. Only the first call has any effect.
    ///
    /// The message listener and reconciliation timer need a Tokio runtime; without one the
    /// store still resolves and persists its token but does not listen.
    pub fn initialize(&self) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            log::debug!("token store {} already initialized", self.inner.context.id());
            return;
        }

        match self.resolve_or_generate() {
            Some(token) => log::info!("token store ready with token {}", redact(&token)),
            None => log::warn!("token store started without a token"),
        }

        // Checked before claiming the inbox so a missing runtime leaves it in place.
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("no async runtime, token store listener disabled: {e}");
                return;
            }
        };

        let inbox = self.inner.context.take_inbox();
        if inbox.is_none() {
            log::warn!("inbox of {} already claimed; messages will not be answered", self.inner.context.id());
        }

        let worker = StoreWorker::new(
            self.clone(),
            inbox,
            self.inner.config.check_interval,
            self.inner.context.unload_token(),
        );
        let join = handle.spawn(worker.run());
        *self.inner.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(join);
    }

    #[cfg(test)]
    fn worker_id(&self) -> Option<tokio::task::Id> {
        self.inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(JoinHandle::id)
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// True while the listener/reconciliation task is alive.
    pub fn is_running(&self) -> bool {
        self.inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|join| !join.is_finished())
    }

    /// Current token by read precedence, without generating one.
    pub fn get_token(&self) -> Option<String> {
        self.inner.persistence.read()
    }

    /// Adopts `token` in all holders.
    ///
    /// Only well-formed tokens (1 to 128 characters of `[A-Za-z0-9._-]`) are stored, so
    /// `set_token(t)` followed by [`get_token`](Self::get_token) returns `t` for those tokens
    /// only. Empty input is a silent no-op; any other malformed value is ignored with a warning.
    pub fn set_token(&self, token: &str) {
        if token.is_empty() {
            return;
        }
        if !is_well_formed_token(token) {
            log::warn!("ignoring malformed token ({} bytes)", token.len());
            return;
        }

        self.inner.persistence.write(token);
        log::info!("token set to {}", redact(token));
    }

    /// Forgets the token everywhere. The next `GET_TOKEN` mints a fresh one.
    pub fn reset_token(&self) {
        self.inner.persistence.clear();
        log::info!("token reset");
    }

    /// Restores local storage from memory when it lost the token. Returns true on restore.
    pub fn reconcile(&self) -> bool {
        self.inner.persistence.restore_storage()
    }

    /// Reacts to one inbound message.
    pub fn handle_message(&self, event: &MessageEvent) {
        let Some(parent) = self.inner.context.parent() else {
            log::debug!("top-level token store ignores messages");
            return;
        };
        if event.source != parent.id() {
            log::debug!(
                "ignoring message from {} ({}): not the embedding page",
                event.source,
                event.origin.ascii_serialization()
            );
            return;
        }

        match Message::decode(&event.data) {
            Some(Message::GetToken) => self.respond(),
            Some(Message::ResetToken) => self.reset_token(),
            Some(Message::SetToken { token }) => self.set_token(&token),
            Some(Message::TokenReady(_)) | None => {
                log::debug!("ignoring unrecognized message from {}", event.origin.ascii_serialization());
            }
        }
    }

    pub fn persistence(&self) -> &TokenPersistence {
        &self.inner.persistence
    }

    pub fn context(&self) -> &Arc<BrowsingContext> {
        &self.inner.context
    }

    fn resolve_or_generate(&self) -> Option<String> {
        let token = self.inner.persistence.read().or_else(generate_token)?;
        self.inner.persistence.write(&token);
        Some(token)
    }

    fn respond(&self) {
        let Some(parent) = self.inner.context.parent() else {
            return;
        };
        let Some(token) = self.resolve_or_generate() else {
            log::warn!("no token available, GET_TOKEN left unanswered");
            return;
        };

        let reply = Message::TokenReady(TokenReady::new(token)).encode();
        // The store does not know who embeds it, so replies go to any origin.
        self.inner.context.post_message(parent, reply, &TargetOrigin::Any);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::DefaultCookieJar;
    use crate::storage::{InMemoryLocalStore, LocalStore, PartitionKey};
    use crate::window::MessageEvent;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use url::Url;

    struct Fixture {
        page: Arc<BrowsingContext>,
        page_inbox: UnboundedReceiver<MessageEvent>,
        frame: Arc<BrowsingContext>,
        store: TokenStore,
    }

    fn fixture() -> Fixture {
        let storage = InMemoryLocalStore::new();
        let jar = DefaultCookieJar::new().into_handle();

        let page_url = Url::parse("https://shop.example/").unwrap();
        let page_area = storage.area(&PartitionKey::None, &page_url.origin()).unwrap();
        let page = Arc::new(BrowsingContext::new(page_url, None, page_area, jar.clone()));
        let page_inbox = page.take_inbox().unwrap();

        let frame_url = Url::parse("https://id.example.net/frame").unwrap();
        let frame_area = storage.area(&PartitionKey::None, &frame_url.origin()).unwrap();
        let frame = Arc::new(BrowsingContext::new(frame_url.clone(), Some(page.handle()), frame_area, jar));

        let config = BridgeConfig::builder(frame_url)
            .check_interval(Duration::from_millis(200))
            .build()
            .unwrap();
        let store = TokenStore::new(config, frame.clone());

        Fixture { page, page_inbox, frame, store }
    }

    fn send(from: &BrowsingContext, to: &BrowsingContext, data: serde_json::Value) {
        from.post_message(&to.handle(), data, &TargetOrigin::Any);
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn initialize_generates_and_persists() {
        let f = fixture();
        f.store.initialize();

        let token = f.store.get_token().unwrap();
        assert_eq!(token.len(), 36);
        assert_eq!(f.store.persistence().stored().as_deref(), Some(token.as_str()));
        assert_eq!(f.store.persistence().cookie().as_deref(), Some(token.as_str()));
        assert_eq!(f.store.persistence().memory().as_deref(), Some(token.as_str()));
        assert!(f.store.is_running());
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let mut f = fixture();
        f.store.initialize();
        let first = f.store.get_token();
        let worker = f.store.worker_id().unwrap();

        f.store.initialize();
        assert!(f.store.is_initialized());
        assert_eq!(f.store.get_token(), first);
        assert_eq!(f.store.worker_id(), Some(worker));
        assert!(f.store.is_running());

        // one listener: one request gets exactly one answer
        send(&f.page, &f.frame, json!({"type": "GET_TOKEN"}));
        settle().await;
        assert!(f.page_inbox.try_recv().is_ok());
        assert!(f.page_inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn initialize_adopts_existing_token() {
        let f = fixture();
        f.frame.local_storage().set_item("visitor_token", "existing-token").unwrap();
        f.store.initialize();
        assert_eq!(f.store.get_token().as_deref(), Some("existing-token"));
        assert_eq!(f.store.persistence().cookie().as_deref(), Some("existing-token"));
    }

    #[tokio::test]
    async fn get_token_is_answered_to_parent() {
        let mut f = fixture();
        f.store.initialize();
        let token = f.store.get_token().unwrap();

        send(&f.page, &f.frame, json!({"type": "GET_TOKEN"}));
        settle().await;

        let reply = f.page_inbox.try_recv().unwrap();
        assert_eq!(reply.source, f.frame.id());
        let ready = TokenReady::from_payload(&reply.data).unwrap();
        assert_eq!(ready.token, token);
        assert_eq!(ready.source, "session-tracker");
    }

    #[tokio::test]
    async fn get_token_after_reset_mints_new_token() {
        let mut f = fixture();
        f.store.initialize();
        let old = f.store.get_token().unwrap();

        send(&f.page, &f.frame, json!({"type": "RESET_TOKEN"}));
        settle().await;
        assert_eq!(f.store.get_token(), None);

        send(&f.page, &f.frame, json!({"type": "GET_TOKEN"}));
        settle().await;
        let ready = TokenReady::from_payload(&f.page_inbox.try_recv().unwrap().data).unwrap();
        assert_ne!(ready.token, old);
        assert_eq!(f.store.get_token(), Some(ready.token));
    }

    #[tokio::test]
    async fn set_token_message_is_applied() {
        let f = fixture();
        f.store.initialize();

        send(&f.page, &f.frame, json!({"type": "SET_TOKEN", "token": "merchant-supplied-1"}));
        settle().await;
        assert_eq!(f.store.get_token().as_deref(), Some("merchant-supplied-1"));

        // malformed and empty tokens are ignored
        send(&f.page, &f.frame, json!({"type": "SET_TOKEN", "token": "has spaces; path=/"}));
        send(&f.page, &f.frame, json!({"type": "SET_TOKEN", "token": ""}));
        settle().await;
        assert_eq!(f.store.get_token().as_deref(), Some("merchant-supplied-1"));
    }

    #[tokio::test]
    async fn messages_from_other_windows_are_ignored() {
        let mut f = fixture();
        f.store.initialize();
        let token = f.store.get_token().unwrap();

        let storage = InMemoryLocalStore::new();
        let url = Url::parse("https://evil.example/").unwrap();
        let area = storage.area(&PartitionKey::None, &url.origin()).unwrap();
        let evil = BrowsingContext::new(url, None, area, DefaultCookieJar::new().into_handle());

        send(&evil, &f.frame, json!({"type": "RESET_TOKEN"}));
        send(&evil, &f.frame, json!({"type": "GET_TOKEN"}));
        settle().await;

        assert_eq!(f.store.get_token(), Some(token));
        assert!(f.page_inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_messages_are_ignored() {
        let mut f = fixture();
        f.store.initialize();
        let token = f.store.get_token();

        send(&f.page, &f.frame, json!({"type": "SOMETHING_ELSE"}));
        send(&f.page, &f.frame, json!("GET_TOKEN"));
        send(&f.page, &f.frame, json!(null));
        settle().await;

        assert_eq!(f.store.get_token(), token);
        assert!(f.page_inbox.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn reconciliation_restores_cleared_storage() {
        let f = fixture();
        f.store.initialize();
        let token = f.store.get_token().unwrap();

        f.frame.local_storage().clear().unwrap();
        assert_eq!(f.store.persistence().stored(), None);

        tokio::time::sleep(Duration::from_millis(250)).await;
        settle().await;

        assert_eq!(f.store.persistence().stored(), Some(token));
    }

    #[tokio::test]
    async fn unload_stops_worker() {
        let f = fixture();
        f.store.initialize();
        assert!(f.store.is_running());

        f.frame.unload();
        settle().await;
        assert!(!f.store.is_running());
    }

    #[test]
    fn initialize_without_runtime_still_persists() {
        let f = fixture();
        f.store.initialize();
        assert!(f.store.get_token().is_some());
        assert!(!f.store.is_running());
        assert_eq!(f.store.worker_id(), None);

        // the frame's inbox stays available
        assert!(f.frame.take_inbox().is_some());
    }
}
