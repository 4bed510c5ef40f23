use std::time::Duration;
use url::Url;
use visitor_bridge::headers::token_store_headers;
use visitor_bridge::{BridgeConfig, BridgeError, Browser, SameSite};

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Configure the pair. The same configuration is used by the store frame and the page.
    let store_url = Url::parse("https://id.example.net/store.html").expect("static url");
    let config = BridgeConfig::builder(store_url)
        .same_site(SameSite::None)
        .secure(false) // corrected to secure=true, with a warning
        .check_interval(Duration::from_secs(2))
        .parent_sync(true)
        .frame_ancestor("https://shop.example")
        .build()?;

    // Headers the store document would be served with.
    for (name, value) in token_store_headers(&config).iter() {
        println!("{name}: {}", value.to_str().unwrap_or("<binary>"));
    }

    // A browser profile: storage and cookies are shared by every page opened from it.
    let browser = Browser::new();
    browser.serve_token_store(config.clone());

    let page = browser
        .open_page(Url::parse("https://shop.example/welcome?redirect=https://dest.example/thanks").expect("static url"))
        .map_err(|e| BridgeError::IframeUnavailable(e.to_string()))?;

    let bridge = page.install_bridge(config.clone());
    let mut events = bridge.subscribe();
    bridge.on_ready(|ready, _controls| {
        println!("ready callback: token {} at {}", ready.token, ready.timestamp);
    });

    bridge.start().await?;

    let event = events.recv().await.map_err(|_| BridgeError::ChannelClosed)?;
    println!("visitor:token-ready -> {}", event.token);
    println!("window.visitorToken = {:?}", page.global(&config.global_name));
    println!("page cookie         = {:?}", page.context().document_cookie().ok());
    for url in page.navigations() {
        println!("navigated to {url}");
    }

    // Reloading the page yields the same token.
    page.unload();
    let again = browser
        .open_page(Url::parse("https://shop.example/").expect("static url"))
        .map_err(|e| BridgeError::IframeUnavailable(e.to_string()))?;
    let token = again.install_bridge(config).get_token();
    again.bridge().expect("installed above").start().await?;
    println!("after reload: {}", token.await?);

    Ok(())
}
