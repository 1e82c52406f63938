//! Binance adapter
//!
//! Serves ticker subscriptions from the `!ticker@arr` stream. One wildcard
//! stream covers every pair, so the venue is only asked to subscribe when the
//! first ticker subscription arrives, and to unsubscribe when the last one
//! leaves.

pub mod client;
pub mod message;

pub use client::BinanceClient;
pub use message::{BinanceFrame, BinanceTicker, normalize_tickers};

use super::{MessageDispatch, SubscriptionProvider};
use crate::config::BinanceConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::subscription::{Subscription, SubscriptionId, SubscriptionState, Topic};
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Provider id subscriptions use to select Binance
pub const BINANCE_PROVIDER_ID: &str = "binance";

/// Subscription provider backed by the Binance websocket
#[derive(Debug)]
pub struct BinanceProvider {
    client: BinanceClient,
    state: Arc<Mutex<SubscriptionState>>,
}

impl BinanceProvider {
    /// Create a disconnected provider
    pub fn new(config: BinanceConfig) -> Self {
        Self {
            client: BinanceClient::new(config.ws_url),
            state: Arc::new(Mutex::new(SubscriptionState::new())),
        }
    }

    /// Route one decoded frame to the subscriptions watching its pairs
    fn handle_frame(state: &Mutex<SubscriptionState>, dispatch: &MessageDispatch, frame: BinanceFrame) {
        let tickers = match frame.into_tickers() {
            Ok(Some(tickers)) => tickers,
            Ok(None) => {
                debug!("Ignoring Binance control frame");
                return;
            }
            Err(e) => {
                warn!("Malformed Binance ticker payload: {}", e);
                return;
            }
        };

        let messages = normalize_tickers(&state.lock(), &tickers);
        for message in messages {
            dispatch.send(message);
        }
    }
}

impl Default for BinanceProvider {
    fn default() -> Self {
        Self::new(BinanceConfig::default())
    }
}

#[async_trait]
impl SubscriptionProvider for BinanceProvider {
    fn id(&self) -> &str {
        BINANCE_PROVIDER_ID
    }

    fn connected(&self) -> bool {
        self.client.connected()
    }

    async fn connect(&self, dispatch: MessageDispatch) -> ProviderResult<()> {
        info!(provider = BINANCE_PROVIDER_ID, "Binance provider connecting");

        let frame_state = self.state.clone();
        let disconnect_state = self.state.clone();
        self.client
            .connect(
                move |frame| Self::handle_frame(&frame_state, &dispatch, frame),
                move || {
                    info!(provider = BINANCE_PROVIDER_ID, "Binance transport closed, clearing state");
                    disconnect_state.lock().clear();
                },
            )
            .await
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        info!(provider = BINANCE_PROVIDER_ID, "Binance provider disconnecting");
        self.client.disconnect();
        self.state.lock().clear();
        Ok(())
    }

    async fn subscribe(&self, subscription: Subscription) -> ProviderResult<()> {
        if !self.client.connected() {
            return Err(ProviderError::NotConnected {
                provider: BINANCE_PROVIDER_ID.to_string(),
            });
        }
        info!(
            provider = BINANCE_PROVIDER_ID,
            subscription_id = %subscription.id,
            pair = %subscription.pair,
            "Binance provider subscribing"
        );

        let subscription_id = subscription.id.clone();
        let needs_stream = {
            let mut state = self.state.lock();
            let needs_stream = !state.has_subscriptions_for_topic(Topic::Ticker);
            state.add_subscription(subscription);
            needs_stream
        };

        if needs_stream {
            if let Err(e) = self.client.subscribe_to_all_tickers() {
                self.state.lock().remove_subscription(&subscription_id);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn unsubscribe(&self, subscription_id: &str) -> ProviderResult<()> {
        info!(
            provider = BINANCE_PROVIDER_ID,
            subscription_id, "Binance provider unsubscribing"
        );

        let drop_stream = {
            let mut state = self.state.lock();
            state.remove_subscription(subscription_id).is_some()
                && !state.has_subscriptions_for_topic(Topic::Ticker)
        };

        if drop_stream && self.client.connected() {
            self.client.unsubscribe_from_all_tickers()?;
        }
        Ok(())
    }

    fn subscribed_to(&self, subscription_id: &str) -> bool {
        self.state.lock().has_subscription_by_id(subscription_id)
    }

    fn subscription(&self, subscription_id: &str) -> Option<Subscription> {
        self.state.lock().subscription(subscription_id).cloned()
    }

    fn subscription_ids(&self) -> FxHashSet<SubscriptionId> {
        self.state.lock().subscription_ids()
    }
}
