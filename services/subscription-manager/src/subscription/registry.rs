//! Desired-state registry of subscriptions

use super::{Subscription, SubscriptionId};
use indexmap::IndexMap;

/// Subscriptions the manager should converge towards, keyed by id
///
/// Iteration follows insertion order. Overwriting an id keeps its original
/// position.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    subscriptions: IndexMap<SubscriptionId, Subscription>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a subscription by id
    pub fn subscribe(&mut self, subscription: Subscription) {
        self.subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Remove a subscription, returning it if it was present
    pub fn unsubscribe(&mut self, subscription_id: &str) -> Option<Subscription> {
        self.subscriptions.shift_remove(subscription_id)
    }

    /// Subscriptions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    /// Subscription ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = &SubscriptionId> {
        self.subscriptions.keys()
    }

    /// Look up a subscription
    pub fn get(&self, subscription_id: &str) -> Option<&Subscription> {
        self.subscriptions.get(subscription_id)
    }

    /// Whether `subscription_id` is registered
    pub fn contains(&self, subscription_id: &str) -> bool {
        self.subscriptions.contains_key(subscription_id)
    }

    /// Whether any subscription references `provider`
    pub fn references_provider(&self, provider: &str) -> bool {
        self.iter().any(|sub| sub.provider == provider)
    }

    /// Owned copy of all subscriptions in registration order
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.iter().cloned().collect()
    }

    /// Number of registered subscriptions
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::BTreeSet;

    fn ticker(id: &str) -> Subscription {
        Subscription::ticker(id, "BTCUSDT", "binance")
    }

    #[rstest]
    #[case(&["a", "b", "c"], &["b"], &["a", "c"])]
    #[case(&["a", "a", "b"], &["a", "a"], &["b"])]
    #[case(&["a"], &["missing"], &["a"])]
    #[case(&[], &["a"], &[])]
    fn test_id_set_is_added_minus_removed(
        #[case] added: &[&str],
        #[case] removed: &[&str],
        #[case] expected: &[&str],
    ) {
        let mut registry = SubscriptionRegistry::new();
        for id in added {
            registry.subscribe(ticker(id));
        }
        for id in removed {
            registry.unsubscribe(id);
        }

        let ids: BTreeSet<&str> = registry.ids().map(String::as_str).collect();
        let expected: BTreeSet<&str> = expected.iter().copied().collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_iteration_keeps_registration_order() {
        let mut registry = SubscriptionRegistry::new();
        for id in ["t3", "t1", "t2"] {
            registry.subscribe(ticker(id));
        }
        // Overwrite keeps position
        registry.subscribe(Subscription::ticker("t1", "ETHUSDT", "binance"));
        registry.unsubscribe("t3");

        let ids: Vec<&str> = registry.ids().map(String::as_str).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
        assert_eq!(registry.get("t1").map(|s| s.pair.as_str()), Some("ETHUSDT"));
    }

    #[test]
    fn test_unsubscribe_returns_removed() {
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe(ticker("t1"));

        assert_eq!(registry.unsubscribe("t1"), Some(ticker("t1")));
        assert_eq!(registry.unsubscribe("t1"), None);
        assert!(registry.is_empty());
        assert!(!registry.references_provider("binance"));
    }
}
