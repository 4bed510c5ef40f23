use crate::config::BridgeConfig;
use url::Url;

/// Computes the one-shot redirect destination for `page_url`.
///
/// The destination is the value of the configured redirect parameter, which must be an absolute
/// `http`/`https` URL. The token is appended to it under the configured redirect key. Returns
/// `None` when the parameter is absent or unusable; a bad value is logged.
pub fn redirect_target(page_url: &Url, config: &BridgeConfig, token: &str) -> Option<Url> {
    let raw = page_url
        .query_pairs()
        .find(|(name, _)| name == config.redirect_param.as_str())
        .map(|(_, value)| value.into_owned())?;

    let mut target = match Url::parse(&raw) {
        Ok(url) => url,
        Err(e) => {
            log::warn!("ignoring redirect target {raw:?}: {e}");
            return None;
        }
    };

    if !matches!(target.scheme(), "http" | "https") {
        log::warn!("ignoring redirect target with scheme {:?}", target.scheme());
        return None;
    }

    target.query_pairs_mut().append_pair(&config.redirect_key, token);
    Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BridgeConfig {
        BridgeConfig::new(Url::parse("https://id.example.net/store.html").unwrap())
    }

    fn page(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn appends_token_under_redirect_key() {
        let target = redirect_target(&page("https://shop.example/?redirect=https://dest.example/path"), &config(), "tok-1");
        assert_eq!(target.unwrap().as_str(), "https://dest.example/path?visitor_id=tok-1");
    }

    #[test]
    fn keeps_existing_query() {
        let target = redirect_target(
            &page("https://shop.example/?redirect=https%3A%2F%2Fdest.example%2Fp%3Fa%3D1"),
            &config(),
            "tok-1",
        );
        assert_eq!(target.unwrap().as_str(), "https://dest.example/p?a=1&visitor_id=tok-1");
    }

    #[test]
    fn custom_param_and_key() {
        let cfg = BridgeConfig::builder(Url::parse("https://id.example.net/").unwrap())
            .redirect_param("next")
            .redirect_key("vid")
            .build()
            .unwrap();
        let target = redirect_target(&page("https://shop.example/?next=http://dest.example/"), &cfg, "t");
        assert_eq!(target.unwrap().as_str(), "http://dest.example/?vid=t");

        // the default parameter name is not consulted
        assert!(redirect_target(&page("https://shop.example/?redirect=http://dest.example/"), &cfg, "t").is_none());
    }

    #[test]
    fn absent_or_unusable_targets() {
        assert!(redirect_target(&page("https://shop.example/"), &config(), "t").is_none());
        assert!(redirect_target(&page("https://shop.example/?redirect="), &config(), "t").is_none());
        assert!(redirect_target(&page("https://shop.example/?redirect=not%20a%20url"), &config(), "t").is_none());
        assert!(redirect_target(&page("https://shop.example/?redirect=/relative"), &config(), "t").is_none());
        assert!(redirect_target(&page("https://shop.example/?redirect=javascript:alert(1)"), &config(), "t").is_none());
    }
}
