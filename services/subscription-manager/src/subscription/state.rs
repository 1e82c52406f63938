//! Per-provider subscription state with pair index and reference counts

use super::{CountMap, Subscription, SubscriptionId, Topic};
use rustc_hash::{FxHashMap, FxHashSet};

/// Subscriptions a provider is currently serving
///
/// Keeps three views in step:
/// - id -> subscription
/// - pair -> ids watching the pair, in the order they were added
/// - active counts per topic and per provider
///
/// A pair key exists only while at least one id is listed under it. The type
/// does no locking; owners serialize access.
#[derive(Debug, Default)]
pub struct SubscriptionState {
    subscriptions_by_id: FxHashMap<SubscriptionId, Subscription>,
    subscription_ids_by_pair: FxHashMap<String, Vec<SubscriptionId>>,
    topic_counts: CountMap<Topic>,
    provider_counts: CountMap<String>,
}

impl SubscriptionState {
    /// Create empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any subscription is tracked
    pub fn has_subscriptions(&self) -> bool {
        !self.subscriptions_by_id.is_empty()
    }

    /// Number of tracked subscriptions
    pub fn len(&self) -> usize {
        self.subscriptions_by_id.len()
    }

    /// True when nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.subscriptions_by_id.is_empty()
    }

    /// Ids of all tracked subscriptions
    pub fn subscription_ids(&self) -> FxHashSet<SubscriptionId> {
        self.subscriptions_by_id.keys().cloned().collect()
    }

    pub fn has_subscriptions_for_pair(&self, pair: &str) -> bool {
        self.subscription_ids_by_pair.contains_key(pair)
    }

    pub fn has_subscriptions_for_topic(&self, topic: Topic) -> bool {
        self.topic_counts.contains(&topic)
    }

    pub fn has_subscription_by_id(&self, subscription_id: &str) -> bool {
        self.subscriptions_by_id.contains_key(subscription_id)
    }

    /// Tracked subscription for `subscription_id`
    pub fn subscription(&self, subscription_id: &str) -> Option<&Subscription> {
        self.subscriptions_by_id.get(subscription_id)
    }

    /// Active subscriptions sourced from `provider`
    pub fn subscription_count_for_provider(&self, provider: &str) -> usize {
        self.provider_counts.get(&provider.to_string())
    }

    /// Subscriptions watching `pair`, in the order they were added
    pub fn subscriptions_for_pair(&self, pair: &str) -> Vec<&Subscription> {
        self.subscription_ids_by_pair
            .get(pair)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.subscriptions_by_id.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Track `subscription`
    ///
    /// An id that is already tracked is replaced, so its counters are
    /// released before the new ones are taken.
    pub fn add_subscription(&mut self, subscription: Subscription) {
        if self.subscriptions_by_id.contains_key(&subscription.id) {
            self.remove_subscription(&subscription.id);
        }

        self.subscription_ids_by_pair
            .entry(subscription.pair.clone())
            .or_default()
            .push(subscription.id.clone());
        self.topic_counts.increment(subscription.topic);
        self.provider_counts.increment(subscription.provider.clone());
        self.subscriptions_by_id
            .insert(subscription.id.clone(), subscription);
    }

    /// Stop tracking `subscription_id`, returning the removed subscription
    pub fn remove_subscription(&mut self, subscription_id: &str) -> Option<Subscription> {
        let subscription = self.subscriptions_by_id.remove(subscription_id)?;

        debug_assert!(
            self.topic_counts.contains(&subscription.topic),
            "topic count missing for tracked subscription"
        );
        debug_assert!(
            self.provider_counts.contains(&subscription.provider),
            "provider count missing for tracked subscription"
        );
        self.topic_counts.decrement(&subscription.topic);
        self.provider_counts.decrement(&subscription.provider);

        if let Some(ids) = self.subscription_ids_by_pair.get_mut(&subscription.pair) {
            ids.retain(|id| id != subscription_id);
            if ids.is_empty() {
                self.subscription_ids_by_pair.remove(&subscription.pair);
            }
        }

        Some(subscription)
    }

    /// Drop all state
    pub fn clear(&mut self) {
        self.subscriptions_by_id.clear();
        self.subscription_ids_by_pair.clear();
        self.topic_counts.clear();
        self.provider_counts.clear();
    }
}
