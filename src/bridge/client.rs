use crate::bridge::redirect::redirect_target;
use crate::bridge::{BridgeState, IframeElement, PageHost, TokenControls};
use crate::config::BridgeConfig;
use crate::errors::BridgeError;
use crate::messages::{redact, Message, TokenReady};
use crate::token_store::TokenPersistence;
use crate::window::{BrowsingContext, MessageEvent, TargetOrigin, WindowHandle};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot};

const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// User initialization callback, invoked with every accepted token.
pub type ReadyCallback = Arc<dyn Fn(&TokenReady, &TokenControls) + Send + Sync>;

/// Handle to the page's Bridge Client. Cheap to clone; clones share the same client.
#[derive(Clone)]
pub struct BridgeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: BridgeConfig,
    page: Arc<BrowsingContext>,
    host: Arc<dyn PageHost>,
    /// Guards against a second `start()` on the same page
    started: AtomicBool,
    shared: Mutex<Shared>,
    events: broadcast::Sender<TokenReady>,
    /// Page-side triple for parent sync
    page_persistence: TokenPersistence,
}

struct Shared {
    state: BridgeState,
    iframe: Option<IframeElement>,
    content_window: Option<WindowHandle>,
    loaded: Option<oneshot::Receiver<()>>,
    token: Option<String>,
    waiters: Vec<oneshot::Sender<String>>,
    callback: Option<ReadyCallback>,
    redirected: bool,
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("page", &self.inner.page)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl BridgeClient {
    pub fn new(config: BridgeConfig, page: Arc<BrowsingContext>, host: Arc<dyn PageHost>) -> Self {
        let (events, _first_rx) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        let page_persistence = TokenPersistence::new(page.clone(), &config);

        Self {
            inner: Arc::new(ClientInner {
                config,
                page,
                host,
                started: AtomicBool::new(false),
                shared: Mutex::new(Shared {
                    state: BridgeState::Uninitialized,
                    iframe: None,
                    content_window: None,
                    loaded: None,
                    token: None,
                    waiters: Vec::new(),
                    callback: None,
                    redirected: false,
                }),
                events,
                page_persistence,
            }),
        }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: BridgeState) {
        let mut shared = self.shared();
        if shared.state == BridgeState::Ready || shared.state == next {
            return;
        }
        log::info!("bridge {} -> {}", shared.state, next);
        shared.state = next;
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn state(&self) -> BridgeState {
        self.shared().state
    }

    /// Token accepted most recently, if any.
    pub fn cached_token(&self) -> Option<String> {
        self.shared().token.clone()
    }

    pub fn iframe(&self) -> Option<IframeElement> {
        self.shared().iframe.clone()
    }

    /// Receiver of `visitor:token-ready` notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TokenReady> {
        self.inner.events.subscribe()
    }

    /// Registers the initialization callback, replacing any previous one.
    pub fn on_ready<F>(&self, callback: F)
    where
        F: Fn(&TokenReady, &TokenControls) + Send + Sync + 'static,
    {
        self.shared().callback = Some(Arc::new(callback));
    }

    pub fn controls(&self) -> TokenControls {
        let frame = self.shared().content_window.clone();
        TokenControls::new(self.clone(), self.inner.page.clone(), frame)
    }

    /// Runs the whole handshake: creates the frame, attaches the listener, waits for the frame
    /// to load, fetches the first token and performs the redirect if the page asks for one.
    ///
    /// Only the first call does anything; later calls return `Ok(())` at once. If the frame
    /// cannot be created the guard is released and `start` may be called again.
    pub async fn start(&self) -> Result<(), BridgeError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            log::debug!("bridge already started on {}", self.inner.page.url());
            return Ok(());
        }

        if let Err(e) = self.create_secure_iframe() {
            self.inner.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.setup_secure_message_listener()?;

        let loaded = self.shared().loaded.take();
        if let Some(loaded) = loaded {
            loaded.await.map_err(|_| BridgeError::IframeLoadAborted)?;
        }

        self.set_state(BridgeState::AwaitingFirstToken);
        let token = self.get_token().await?;
        self.redirect_once(&token);
        Ok(())
    }

    /// Appends the hidden Token Store frame to the page.
    pub fn create_secure_iframe(&self) -> Result<IframeElement, BridgeError> {
        let element = IframeElement::secure(self.inner.config.store_url.clone());
        let attachment = self
            .inner
            .host
            .append_iframe(element.clone())
            .map_err(|e| BridgeError::IframeUnavailable(e.to_string()))?;

        {
            let mut shared = self.shared();
            shared.iframe = Some(element.clone());
            shared.content_window = Some(attachment.content_window);
            shared.loaded = Some(attachment.loaded);
        }
        self.set_state(BridgeState::IframeCreated);
        Ok(element)
    }

    /// Claims the page inbox and spawns the task that screens incoming messages.
    ///
    /// Needs a Tokio runtime; without one the inbox is left unclaimed.
    pub fn setup_secure_message_listener(&self) -> Result<(), BridgeError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;
        let inbox = self.inner.page.take_inbox().ok_or(BridgeError::ListenerAlreadyAttached)?;
        let client = self.clone();
        runtime.spawn(client.listen(inbox));
        self.set_state(BridgeState::ListenerAttached);
        Ok(())
    }

    async fn listen(self, mut inbox: mpsc::UnboundedReceiver<MessageEvent>) {
        let unload = self.inner.page.unload_token();
        loop {
            tokio::select! {
                _ = unload.cancelled() => break,
                msg = inbox.recv() => {
                    let Some(event) = msg else {
                        break;
                    };
                    if let Some(ready) = self.accept(&event) {
                        self.handle_token_ready(ready);
                    }
                }
            }
        }
    }

    /// Trust-boundary check. Returns the payload only for a well-formed `TOKEN_READY` sent by
    /// the managed frame from the Token Store origin.
    pub fn accept(&self, event: &MessageEvent) -> Option<TokenReady> {
        let frame = self.shared().content_window.clone();
        let Some(frame) = frame else {
            log::debug!("message dropped: no token store frame");
            return None;
        };

        let expected = self.inner.config.store_origin();
        if event.origin != expected {
            log::debug!(
                "message dropped: origin {} is not {}",
                event.origin.ascii_serialization(),
                expected.ascii_serialization()
            );
            return None;
        }
        if event.source != frame.id() {
            log::debug!("message dropped: source {} is not the token store frame", event.source);
            return None;
        }

        let ready = TokenReady::from_payload(&event.data);
        if ready.is_none() {
            log::debug!("message dropped: not a TOKEN_READY envelope");
        }
        ready
    }

    /// Resolves with the page's token, asking the Token Store when nothing is cached.
    pub fn get_token(&self) -> BoxFuture<'static, Result<String, BridgeError>> {
        let (rx, frame) = {
            let mut shared = self.shared();
            if let Some(token) = &shared.token {
                return futures::future::ready(Ok(token.clone())).boxed();
            }
            let (tx, rx) = oneshot::channel();
            shared.waiters.push(tx);
            (rx, shared.content_window.clone())
        };

        match frame {
            Some(frame) => self.inner.page.post_message(&frame, Message::GetToken.encode(), &TargetOrigin::Any),
            None => log::debug!("token requested before the frame exists; waiting"),
        }

        async move { rx.await.map_err(|_| BridgeError::ChannelClosed) }.boxed()
    }

    /// Adopts an accepted token: caches it, exposes it, mirrors it into the page when parent
    /// sync is on, notifies subscribers, releases every waiter and runs the callback.
    pub fn handle_token_ready(&self, ready: TokenReady) {
        self.adopt_token(&ready.token);
        let (waiters, callback) = {
            let mut shared = self.shared();
            (std::mem::take(&mut shared.waiters), shared.callback.clone())
        };
        self.set_state(BridgeState::Ready);
        log::info!("token {} ready on {}", redact(&ready.token), self.inner.page.url());

        // No subscribers is fine.
        let _ = self.inner.events.send(ready.clone());

        for waiter in waiters {
            let _ = waiter.send(ready.token.clone());
        }

        if let Some(callback) = callback {
            callback(&ready, &self.controls());
        }
    }

    fn redirect_once(&self, token: &str) {
        {
            let mut shared = self.shared();
            if shared.redirected {
                return;
            }
            shared.redirected = true;
        }

        if let Some(target) = redirect_target(self.inner.page.url(), &self.inner.config, token) {
            log::info!("redirecting to {}", target.origin().ascii_serialization());
            self.inner.host.navigate(target);
        }
    }

    /// Makes `token` the page's token: cache, page global and, with parent sync, the page's
    /// own triple.
    pub(crate) fn adopt_token(&self, token: &str) {
        self.shared().token = Some(token.to_string());
        self.inner.host.expose_global(&self.inner.config.global_name, token);
        if self.inner.config.parent_sync {
            self.inner.page_persistence.write(token);
        }
    }

    /// Drops the page's token from every place [`adopt_token`](Self::adopt_token) put it.
    pub(crate) fn discard_token(&self) {
        self.shared().token = None;
        self.inner.host.remove_global(&self.inner.config.global_name);
        if self.inner.config.parent_sync {
            self.inner.page_persistence.clear();
        }
    }
}
