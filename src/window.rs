//! Browsing contexts and cross-document messaging.
//!
//! A [`BrowsingContext`] is one document: a URL, its origin's `localStorage` area, access to
//! `document.cookie`, and an inbox of [`MessageEvent`]s. Other contexts address it through a
//! cloneable [`WindowHandle`], the equivalent of a `Window` reference (`iframe.contentWindow`,
//! `window.parent`).
//!
//! [`BrowsingContext::post_message`] behaves like `window.postMessage`: the event is stamped with
//! the sender's origin and window id (the sender cannot choose them), the payload is cloned, and
//! delivery silently does nothing when the target origin does not match or the target is gone.

use crate::cookies::CookieJarHandle;
use crate::storage::StorageArea;
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::{Origin, Url};
use uuid::Uuid;

/// A unique identifier for a window, represented as a UUID.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(Uuid);

impl WindowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message delivered to a window.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Origin of the sending document
    pub origin: Origin,
    /// Window that sent the message (`event.source`)
    pub source: WindowId,
    /// Cloned payload (`event.data`)
    pub data: Value,
}

/// `targetOrigin` argument of `postMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    /// `"*"`: deliver whatever the recipient's origin is
    Any,
    /// Deliver only if the recipient has exactly this origin
    Exact(Origin),
}

impl TargetOrigin {
    pub fn matches(&self, origin: &Origin) -> bool {
        match self {
            TargetOrigin::Any => true,
            TargetOrigin::Exact(expected) => expected == origin,
        }
    }
}

/// Reference to another window through which messages can be posted.
#[derive(Clone, Debug)]
pub struct WindowHandle {
    id: WindowId,
    origin: Origin,
    tx: mpsc::UnboundedSender<MessageEvent>,
}

impl WindowHandle {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }
}

/// One document and the browser facilities scripts inside it can reach.
pub struct BrowsingContext {
    url: Url,
    handle: WindowHandle,
    parent: Option<WindowHandle>,
    /// Receiving end of the inbox until a listener claims it
    inbox: Mutex<Option<mpsc::UnboundedReceiver<MessageEvent>>>,
    local_storage: Arc<dyn StorageArea>,
    cookie_jar: CookieJarHandle,
    unload: CancellationToken,
}

impl std::fmt::Debug for BrowsingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowsingContext")
            .field("id", &self.handle.id)
            .field("url", &self.url.as_str())
            .field("parent", &self.parent.as_ref().map(WindowHandle::id))
            .finish_non_exhaustive()
    }
}

impl BrowsingContext {
    pub fn new(
        url: Url,
        parent: Option<WindowHandle>,
        local_storage: Arc<dyn StorageArea>,
        cookie_jar: CookieJarHandle,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = WindowHandle {
            id: WindowId::new(),
            origin: url.origin(),
            tx,
        };

        Self {
            url,
            handle,
            parent,
            inbox: Mutex::new(Some(rx)),
            local_storage,
            cookie_jar,
            unload: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> WindowId {
        self.handle.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn origin(&self) -> &Origin {
        &self.handle.origin
    }

    /// Handle other windows use to reach this one.
    pub fn handle(&self) -> WindowHandle {
        self.handle.clone()
    }

    /// `window.parent`; `None` for top-level documents.
    pub fn parent(&self) -> Option<&WindowHandle> {
        self.parent.as_ref()
    }

    /// `window.localStorage`
    pub fn local_storage(&self) -> &Arc<dyn StorageArea> {
        &self.local_storage
    }

    /// Reads `document.cookie`.
    pub fn document_cookie(&self) -> Result<String> {
        let jar = self.cookie_jar.read().map_err(|_| anyhow!("cookie jar lock poisoned"))?;
        jar.document_cookie(&self.url)
    }

    /// Assigns `document.cookie = assignment`.
    pub fn set_document_cookie(&self, assignment: &str) -> Result<()> {
        let mut jar = self.cookie_jar.write().map_err(|_| anyhow!("cookie jar lock poisoned"))?;
        jar.set_document_cookie(&self.url, assignment)
    }

    /// Value of cookie `name` as visible to this document.
    pub fn cookie_value(&self, name: &str) -> Result<Option<String>> {
        let all = self.document_cookie()?;
        Ok(all
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string()))
    }

    /// `target.postMessage(data, targetOrigin)` from this document.
    pub fn post_message(&self, target: &WindowHandle, data: Value, target_origin: &TargetOrigin) {
        if !target_origin.matches(&target.origin) {
            log::debug!(
                "postMessage from {} dropped: target origin {:?} does not match {}",
                self.handle.id,
                target_origin,
                target.origin.ascii_serialization()
            );
            return;
        }

        let event = MessageEvent {
            origin: self.handle.origin.clone(),
            source: self.handle.id,
            data,
        };

        // send() only fails when the target document is gone, which a browser ignores too.
        let _ = target.tx.send(event);
    }

    /// Claims the message inbox. Returns `None` once a listener already holds it.
    pub fn take_inbox(&self) -> Option<mpsc::UnboundedReceiver<MessageEvent>> {
        self.inbox.lock().ok()?.take()
    }

    /// Token cancelled when the document unloads; timers and listeners stop on it.
    pub fn unload_token(&self) -> CancellationToken {
        self.unload.clone()
    }

    pub fn unload(&self) {
        self.unload.cancel();
    }

    pub fn is_unloaded(&self) -> bool {
        self.unload.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::DefaultCookieJar;
    use crate::storage::{InMemoryLocalStore, LocalStore, PartitionKey};
    use serde_json::json;

    fn context(url: &str, parent: Option<WindowHandle>) -> BrowsingContext {
        let url = Url::parse(url).unwrap();
        let store = InMemoryLocalStore::new();
        let area = store.area(&PartitionKey::None, &url.origin()).unwrap();
        BrowsingContext::new(url, parent, area, DefaultCookieJar::new().into_handle())
    }

    #[test]
    fn post_message_stamps_sender_origin_and_id() {
        let page = context("https://shop.example/", None);
        let frame = context("https://id.example.net/frame", Some(page.handle()));
        let mut inbox = page.take_inbox().unwrap();

        frame.post_message(frame.parent().unwrap(), json!({"hello": 1}), &TargetOrigin::Any);

        let ev = inbox.try_recv().unwrap();
        assert_eq!(ev.origin.ascii_serialization(), "https://id.example.net");
        assert_eq!(ev.source, frame.id());
        assert_eq!(ev.data, json!({"hello": 1}));
    }

    #[test]
    fn mismatched_target_origin_is_not_delivered() {
        let page = context("https://shop.example/", None);
        let other = context("https://evil.example/", None);
        let mut inbox = page.take_inbox().unwrap();

        let wrong = TargetOrigin::Exact(Url::parse("https://other.example").unwrap().origin());
        other.post_message(&page.handle(), json!(1), &wrong);
        assert!(inbox.try_recv().is_err());

        let right = TargetOrigin::Exact(page.origin().clone());
        other.post_message(&page.handle(), json!(2), &right);
        assert_eq!(inbox.try_recv().unwrap().data, json!(2));
    }

    #[test]
    fn inbox_can_be_taken_once() {
        let page = context("https://shop.example/", None);
        assert!(page.take_inbox().is_some());
        assert!(page.take_inbox().is_none());
    }

    #[test]
    fn posting_to_a_gone_window_is_silent() {
        let page = context("https://shop.example/", None);
        let handle = page.handle();
        drop(page.take_inbox());

        let other = context("https://a.example/", None);
        other.post_message(&handle, json!("late"), &TargetOrigin::Any);
    }

    #[test]
    fn cookie_value_reads_single_cookie() {
        let page = context("https://shop.example/", None);
        page.set_document_cookie("a=1; path=/").unwrap();
        page.set_document_cookie("vt=abc; path=/").unwrap();
        assert_eq!(page.cookie_value("vt").unwrap().as_deref(), Some("abc"));
        assert_eq!(page.cookie_value("missing").unwrap(), None);
    }

    #[test]
    fn unload_cancels_token() {
        let page = context("https://shop.example/", None);
        let token = page.unload_token();
        assert!(!page.is_unloaded());
        page.unload();
        assert!(token.is_cancelled());
        assert!(page.is_unloaded());
    }
}
