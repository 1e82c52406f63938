//! Subscription data model and the indexes built on it

pub mod count_map;
pub mod registry;
pub mod state;

pub use count_map::CountMap;
pub use registry::SubscriptionRegistry;
pub use state::SubscriptionState;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-chosen subscription identifier, unique across the manager
pub type SubscriptionId = String;

/// Category of market data stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Best bid / best ask quotes
    Ticker,
}

impl Topic {
    /// Wire name of the topic
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caller-identified binding of (pair, topic, provider)
///
/// Immutable once created. Two subscriptions with the same `id` are the same
/// subscription as far as the manager is concerned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    /// Unique identifier
    pub id: SubscriptionId,
    /// Requested data stream
    pub topic: Topic,
    /// Instrument identifier, e.g. `BTCUSDT`
    pub pair: String,
    /// Identifier of the provider that sources this subscription
    pub provider: String,
}

impl Subscription {
    /// Create a ticker subscription
    pub fn ticker(
        id: impl Into<SubscriptionId>,
        pair: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            topic: Topic::Ticker,
            pair: pair.into(),
            provider: provider.into(),
        }
    }
}

/// Normalized ticker quote for one subscription
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TickerMessage {
    /// Subscription this message is delivered for
    pub subscription_id: SubscriptionId,
    /// Always [`Topic::Ticker`]
    pub topic: Topic,
    /// Best bid price as reported by the venue
    pub bid: String,
    /// Best ask price as reported by the venue
    pub ask: String,
    /// Instrument identifier
    pub pair: String,
    /// Venue event time in milliseconds
    pub time: u64,
}

/// Normalized message handed to the dispatch callback
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SubscriptionMessage {
    /// Ticker quote
    Ticker(TickerMessage),
}

impl SubscriptionMessage {
    /// Subscription the message belongs to
    pub fn subscription_id(&self) -> &str {
        match self {
            Self::Ticker(msg) => &msg.subscription_id,
        }
    }

    /// Topic of the message
    pub fn topic(&self) -> Topic {
        match self {
            Self::Ticker(msg) => msg.topic,
        }
    }
}

impl From<TickerMessage> for SubscriptionMessage {
    fn from(msg: TickerMessage) -> Self {
        Self::Ticker(msg)
    }
}
