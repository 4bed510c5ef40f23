//! In-process user agent.
//!
//! A [`Browser`] owns the storage and cookie state shared by every document it opens, the way
//! a browser profile does. Pages opened with [`Browser::open_page`] act as the [`PageHost`] of
//! their Bridge Client: appended iframes are loaded as child browsing contexts running a
//! [`TokenStore`], navigations and exposed globals are recorded.
//!
//! What a Token Store URL serves is configured per origin with [`Browser::serve_token_store`];
//! origins without an explicit configuration serve a store with default settings.

use crate::bridge::{BridgeClient, FrameAttachment, IframeElement, PageHost};
use crate::config::BridgeConfig;
use crate::cookies::{CookieJarHandle, DefaultCookieJar, DisabledCookieJar};
use crate::storage::{compute_partition_key, DisabledStorageArea, InMemoryLocalStore, LocalStore, PartitionPolicy, StorageArea};
use crate::token_store::TokenStore;
use crate::window::{BrowsingContext, WindowHandle};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::oneshot;
use url::Url;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct Browser {
    inner: Arc<BrowserInner>,
}

struct BrowserInner {
    local: InMemoryLocalStore,
    cookie_jar: CookieJarHandle,
    partition_policy: PartitionPolicy,
    storage_enabled: bool,
    /// Token Store configuration by store origin
    stores: Mutex<HashMap<String, BridgeConfig>>,
}

#[derive(Default)]
pub struct BrowserBuilder {
    partition_policy: PartitionPolicy,
    block_storage: bool,
    block_cookies: bool,
}

impl BrowserBuilder {
    pub fn partition_policy(mut self, policy: PartitionPolicy) -> Self {
        self.partition_policy = policy;
        self
    }

    /// Every `localStorage` access throws.
    pub fn block_storage(mut self) -> Self {
        self.block_storage = true;
        self
    }

    /// Every `document.cookie` access throws.
    pub fn block_cookies(mut self) -> Self {
        self.block_cookies = true;
        self
    }

    pub fn build(self) -> Browser {
        let cookie_jar = if self.block_cookies {
            DisabledCookieJar.into_handle()
        } else {
            DefaultCookieJar::new().into_handle()
        };

        Browser {
            inner: Arc::new(BrowserInner {
                local: InMemoryLocalStore::new(),
                cookie_jar,
                partition_policy: self.partition_policy,
                storage_enabled: !self.block_storage,
                stores: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl Default for Browser {
    fn default() -> Self {
        Self::new()
    }
}

impl Browser {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> BrowserBuilder {
        BrowserBuilder::default()
    }

    /// Configures the Token Store served from `config.store_url`'s origin.
    pub fn serve_token_store(&self, config: BridgeConfig) {
        let origin = config.store_url.origin().ascii_serialization();
        lock(&self.inner.stores).insert(origin, config);
    }

    fn store_config(&self, src: &Url) -> BridgeConfig {
        lock(&self.inner.stores)
            .get(&src.origin().ascii_serialization())
            .cloned()
            .unwrap_or_else(|| BridgeConfig::new(src.clone()))
    }

    /// Creates a context for `url`, embedded under `top_level`.
    fn context_for(&self, url: &Url, parent: Option<WindowHandle>, top_level: &Url) -> Result<Arc<BrowsingContext>> {
        let area: Arc<dyn StorageArea> = if self.inner.storage_enabled {
            let part = compute_partition_key(top_level, self.inner.partition_policy);
            self.inner.local.area(&part, &url.origin())?
        } else {
            Arc::new(DisabledStorageArea)
        };

        Ok(Arc::new(BrowsingContext::new(
            url.clone(),
            parent,
            area,
            self.inner.cookie_jar.clone(),
        )))
    }

    /// Opens a top-level page.
    pub fn open_page(&self, url: Url) -> Result<Page> {
        let context = self.context_for(&url, None, &url)?;
        log::debug!("opened page {} at {}", context.id(), url);

        Ok(Page {
            surface: Arc::new(PageSurface {
                browser: self.clone(),
                context,
                frames: Mutex::new(Vec::new()),
                navigations: Mutex::new(Vec::new()),
                globals: Mutex::new(HashMap::new()),
            }),
            bridge: OnceLock::new(),
        })
    }

    /// Opens a free-standing top-level window, e.g. another tab that may post messages to pages.
    pub fn open_window(&self, url: Url) -> Result<Arc<BrowsingContext>> {
        self.context_for(&url, None, &url)
    }
}

/// An iframe the page loaded, together with the Token Store running in it.
#[derive(Clone, Debug)]
pub struct LoadedFrame {
    pub element: IframeElement,
    pub context: Arc<BrowsingContext>,
    pub store: TokenStore,
}

struct PageSurface {
    browser: Browser,
    context: Arc<BrowsingContext>,
    frames: Mutex<Vec<LoadedFrame>>,
    navigations: Mutex<Vec<Url>>,
    globals: Mutex<HashMap<String, String>>,
}

impl PageHost for PageSurface {
    fn append_iframe(&self, iframe: IframeElement) -> Result<FrameAttachment> {
        if !matches!(iframe.src.scheme(), "http" | "https") {
            bail!("refusing to load frame from {}", iframe.src);
        }
        let runtime = tokio::runtime::Handle::try_current()?;

        let context = self
            .browser
            .context_for(&iframe.src, Some(self.context.handle()), self.context.url())?;
        let store = TokenStore::new(self.browser.store_config(&iframe.src), context.clone());

        let (loaded_tx, loaded_rx) = oneshot::channel();
        let loading = store.clone();
        runtime.spawn(async move {
            // the frame document loads after the append returns
            tokio::task::yield_now().await;
            loading.initialize();
            let _ = loaded_tx.send(());
        });

        let content_window = context.handle();
        lock(&self.frames).push(LoadedFrame {
            element: iframe,
            context,
            store,
        });

        Ok(FrameAttachment {
            content_window,
            loaded: loaded_rx,
        })
    }

    fn navigate(&self, url: Url) {
        log::info!("page {} navigating to {}", self.context.id(), url.origin().ascii_serialization());
        lock(&self.navigations).push(url);
    }

    fn expose_global(&self, name: &str, token: &str) {
        lock(&self.globals).insert(name.to_string(), token.to_string());
    }

    fn remove_global(&self, name: &str) {
        lock(&self.globals).remove(name);
    }
}

/// A top-level document.
pub struct Page {
    surface: Arc<PageSurface>,
    bridge: OnceLock<BridgeClient>,
}

impl Page {
    pub fn url(&self) -> &Url {
        self.surface.context.url()
    }

    pub fn context(&self) -> &Arc<BrowsingContext> {
        &self.surface.context
    }

    /// Returns the page's Bridge Client, constructing it on first use. Later calls return the
    /// same client and ignore `config`.
    pub fn install_bridge(&self, config: BridgeConfig) -> &BridgeClient {
        self.bridge.get_or_init(|| {
            let host: Arc<dyn PageHost> = self.surface.clone();
            BridgeClient::new(config, self.surface.context.clone(), host)
        })
    }

    pub fn bridge(&self) -> Option<&BridgeClient> {
        self.bridge.get()
    }

    pub fn frames(&self) -> Vec<LoadedFrame> {
        lock(&self.surface.frames).clone()
    }

    pub fn navigations(&self) -> Vec<Url> {
        lock(&self.surface.navigations).clone()
    }

    /// Value of a page global set through [`PageHost::expose_global`].
    pub fn global(&self, name: &str) -> Option<String> {
        lock(&self.surface.globals).get(name).cloned()
    }

    /// Unloads the page and every frame in it.
    pub fn unload(&self) {
        for frame in lock(&self.surface.frames).iter() {
            frame.context.unload();
        }
        self.surface.context.unload();
    }
}
