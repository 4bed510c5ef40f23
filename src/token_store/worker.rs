use crate::token_store::TokenStore;
use crate::window::MessageEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Task driving one Token Store: answers inbound messages and runs the reconciliation timer
/// until the document unloads.
pub(crate) struct StoreWorker {
    store: TokenStore,
    inbox: Option<mpsc::UnboundedReceiver<MessageEvent>>,
    check_interval: Duration,
    unload: CancellationToken,
}

impl StoreWorker {
    pub fn new(
        store: TokenStore,
        inbox: Option<mpsc::UnboundedReceiver<MessageEvent>>,
        check_interval: Duration,
        unload: CancellationToken,
    ) -> Self {
        Self {
            store,
            inbox,
            check_interval,
            unload,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; initialization has just persisted the token.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.unload.cancelled() => {
                    log::debug!("token store {} unloading", self.store.context().id());
                    break;
                }

                msg = next_event(&mut self.inbox) => {
                    match msg {
                        Some(event) => self.store.handle_message(&event),
                        // Every sender is gone; keep reconciling until unload.
                        None => self.inbox = None,
                    }
                }

                _ = ticker.tick() => {
                    self.store.reconcile();
                }
            }
        }
    }
}

async fn next_event(inbox: &mut Option<mpsc::UnboundedReceiver<MessageEvent>>) -> Option<MessageEvent> {
    match inbox {
        Some(rx) => rx.recv().await,
        None => futures::future::pending().await,
    }
}
