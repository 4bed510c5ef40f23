use crate::config::BridgeConfigError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] BridgeConfigError),

    #[error("Token store iframe could not be created: {0}")]
    IframeUnavailable(String),

    #[error("Token store iframe never finished loading")]
    IframeLoadAborted,

    #[error("Message listener is already attached to this page")]
    ListenerAlreadyAttached,

    #[error("No async runtime available to run the message listener")]
    NoRuntime,

    #[error("Bridge client was dropped before a token arrived")]
    ChannelClosed,
}
