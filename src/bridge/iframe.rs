use bitflags::bitflags;
use std::fmt::Display;
use url::Url;

bitflags! {
    /// Tokens of the iframe `sandbox` attribute.
    pub struct SandboxFlags: u8 {
        const ALLOW_SCRIPTS     = 0b0001;
        const ALLOW_SAME_ORIGIN = 0b0010;
    }
}

impl Display for SandboxFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();

        if self.contains(SandboxFlags::ALLOW_SCRIPTS) {
            parts.push("allow-scripts");
        }
        if self.contains(SandboxFlags::ALLOW_SAME_ORIGIN) {
            parts.push("allow-same-origin");
        }

        write!(f, "{}", parts.join(" "))
    }
}

/// Inline style keeping the frame invisible, off-screen and out of the hit-test path.
pub const HIDDEN_STYLE: &str = "position:absolute;left:-9999px;top:-9999px;width:0;height:0;\
border:0;visibility:hidden;pointer-events:none";

/// The `<iframe>` element the Bridge Client appends to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IframeElement {
    pub src: Url,
    pub sandbox: SandboxFlags,
    pub hidden: bool,
    pub width: u32,
    pub height: u32,
    pub referrer_policy: &'static str,
    pub loading: &'static str,
    pub fetch_priority: &'static str,
    pub style: &'static str,
}

impl IframeElement {
    /// A hidden, zero-size, sandboxed frame loading `src`.
    pub fn secure(src: Url) -> Self {
        Self {
            src,
            sandbox: SandboxFlags::ALLOW_SCRIPTS | SandboxFlags::ALLOW_SAME_ORIGIN,
            hidden: true,
            width: 0,
            height: 0,
            referrer_policy: "no-referrer",
            loading: "lazy",
            fetch_priority: "low",
            style: HIDDEN_STYLE,
        }
    }

    /// DOM attributes in the order they are set on the element.
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![
            ("sandbox", self.sandbox.to_string()),
            ("width", self.width.to_string()),
            ("height", self.height.to_string()),
            ("referrerpolicy", self.referrer_policy.to_string()),
            ("loading", self.loading.to_string()),
            ("fetchpriority", self.fetch_priority.to_string()),
            ("style", self.style.to_string()),
            ("aria-hidden", "true".to_string()),
            ("tabindex", "-1".to_string()),
        ];
        if self.hidden {
            attrs.push(("hidden", String::new()));
        }
        attrs.push(("src", self.src.to_string()));
        attrs
    }
}
