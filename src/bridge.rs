//! Bridge Client: the agent running in the embedding page.
//!
//! The client appends a hidden, sandboxed iframe pointing at the Token Store, listens for the
//! store's `TOKEN_READY` responses, caches the token for the page and hands it out through
//! [`BridgeClient::get_token`]. Responses pass a trust-boundary check before they are accepted:
//!
//! 1. the managed iframe exists,
//! 2. the event origin equals the Token Store origin exactly,
//! 3. the event source is the iframe's content window,
//! 4. the payload is a well-formed `TOKEN_READY` envelope.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized -> IframeCreated -> ListenerAttached -> AwaitingFirstToken -> Ready
//! ```
//!
//! `Ready` is terminal. The page itself is reached through a [`PageHost`], which appends the
//! element, navigates and exposes page globals.

mod client;
mod iframe;
mod redirect;

pub use client::{BridgeClient, ReadyCallback};
pub use iframe::{IframeElement, SandboxFlags, HIDDEN_STYLE};
pub use redirect::redirect_target;

use crate::messages::{is_well_formed_token, Message};
use crate::window::{BrowsingContext, TargetOrigin, WindowHandle};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::oneshot;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    IframeCreated,
    ListenerAttached,
    AwaitingFirstToken,
    Ready,
}

impl Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BridgeState::Uninitialized => "uninitialized",
            BridgeState::IframeCreated => "iframe-created",
            BridgeState::ListenerAttached => "listener-attached",
            BridgeState::AwaitingFirstToken => "awaiting-first-token",
            BridgeState::Ready => "ready",
        };
        write!(f, "{s}")
    }
}

/// A frame appended to the page by the host.
pub struct FrameAttachment {
    /// `iframe.contentWindow`
    pub content_window: WindowHandle,
    /// Resolves when the frame's `load` event fires
    pub loaded: oneshot::Receiver<()>,
}

/// The document surface the Bridge Client drives.
pub trait PageHost: Send + Sync {
    /// Appends `iframe` to the document and starts loading it.
    fn append_iframe(&self, iframe: IframeElement) -> anyhow::Result<FrameAttachment>;

    /// `window.location.href = url`
    fn navigate(&self, url: Url);

    /// `window[name] = token`
    fn expose_global(&self, name: &str, token: &str);

    /// `delete window[name]`
    fn remove_global(&self, name: &str);
}

/// Helpers handed to the ready callback for steering the Token Store.
#[derive(Clone)]
pub struct TokenControls {
    client: BridgeClient,
    page: Arc<BrowsingContext>,
    frame: Option<WindowHandle>,
}

impl TokenControls {
    pub(crate) fn new(client: BridgeClient, page: Arc<BrowsingContext>, frame: Option<WindowHandle>) -> Self {
        Self { client, page, frame }
    }

    /// Asks the store to forget the token and drops the page's copies: the cache, the page
    /// global and, with parent sync, the page's storage slot and cookie.
    pub fn reset_token(&self) {
        self.client.discard_token();
        self.post(Message::ResetToken);
    }

    /// Asks the store to adopt `token` and adopts it on the page side the same way an accepted
    /// `TOKEN_READY` is adopted. Only well-formed tokens (1 to 128 characters of
    /// `[A-Za-z0-9._-]`) are accepted; anything else is dropped with a warning.
    pub fn set_token(&self, token: &str) {
        if !is_well_formed_token(token) {
            log::warn!("not sending malformed token ({} bytes)", token.len());
            return;
        }
        self.client.adopt_token(token);
        self.post(Message::SetToken { token: token.to_string() });
    }

    fn post(&self, message: Message) {
        match &self.frame {
            Some(frame) => self.page.post_message(frame, message.encode(), &TargetOrigin::Any),
            None => log::debug!("no token store frame yet, {message:?} dropped"),
        }
    }
}
