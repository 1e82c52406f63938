//! Provider adapter contract and the lookup table the manager selects from

pub mod binance;

pub use binance::BinanceProvider;

use crate::error::ProviderResult;
use crate::subscription::{Subscription, SubscriptionId, SubscriptionMessage};
use async_trait::async_trait;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// Cloneable handle through which providers deliver normalized messages
///
/// Delivery is fire-and-forget: the callback runs on the provider's reader
/// task and its return is not observed.
#[derive(Clone)]
pub struct MessageDispatch {
    callback: Arc<dyn Fn(SubscriptionMessage) + Send + Sync>,
}

impl MessageDispatch {
    /// Wrap a callback
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(SubscriptionMessage) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Dispatch that drops every message
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Deliver one message
    pub fn send(&self, message: SubscriptionMessage) {
        (self.callback)(message);
    }
}

impl fmt::Debug for MessageDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDispatch").finish_non_exhaustive()
    }
}

/// Adapter for one upstream market-data venue
///
/// Implementations own one transport connection and one
/// [`SubscriptionState`](crate::subscription::SubscriptionState). The state is
/// cleared whenever the transport goes away, so the next reconciliation pass
/// resubscribes from scratch.
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    /// Stable identifier subscriptions refer to
    fn id(&self) -> &str;

    /// Whether the transport is live
    fn connected(&self) -> bool;

    /// Open the transport and route decoded records to `dispatch`
    async fn connect(&self, dispatch: MessageDispatch) -> ProviderResult<()>;

    /// Close the transport
    async fn disconnect(&self) -> ProviderResult<()>;

    /// Start serving `subscription`
    async fn subscribe(&self, subscription: Subscription) -> ProviderResult<()>;

    /// Stop serving `subscription_id`
    async fn unsubscribe(&self, subscription_id: &str) -> ProviderResult<()>;

    /// Whether `subscription_id` is currently served
    fn subscribed_to(&self, subscription_id: &str) -> bool;

    /// The version of `subscription_id` currently served
    ///
    /// Differs from the desired entry after an upsert changed its pair or
    /// topic; the manager then subscribes the new version.
    fn subscription(&self, subscription_id: &str) -> Option<Subscription>;

    /// Ids currently served
    fn subscription_ids(&self) -> FxHashSet<SubscriptionId>;
}

/// Registered providers keyed by id, in registration order
#[derive(Default)]
pub struct ProviderSet {
    providers: IndexMap<String, Arc<dyn SubscriptionProvider>>,
}

impl ProviderSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under its id, returning any provider it displaced
    pub fn insert(
        &mut self,
        provider: Arc<dyn SubscriptionProvider>,
    ) -> Option<Arc<dyn SubscriptionProvider>> {
        self.providers.insert(provider.id().to_string(), provider)
    }

    /// Provider registered under `id`
    pub fn get(&self, id: &str) -> Option<&Arc<dyn SubscriptionProvider>> {
        self.providers.get(id)
    }

    /// Providers in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SubscriptionProvider>> {
        self.providers.values()
    }

    /// Registered provider ids
    pub fn ids(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSet")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
