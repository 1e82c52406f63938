//! Subscription Manager Service
//!
//! Reconciles caller-declared market-data subscriptions against pluggable
//! upstream providers and delivers normalized messages through one callback.
//!
//! - subscription/: data model, desired-state registry, per-provider state
//! - provider/: adapter contract and the Binance adapter
//! - manager: the reconciliation loop

pub mod config;
pub mod error;
pub mod manager;
pub mod provider;
pub mod subscription;

pub use config::{BinanceConfig, ManagerConfig, TickPolicy};
pub use error::{ProviderError, ProviderResult, SubscriptionError, SubscriptionResult};
pub use manager::{ManagerStatus, SubscriptionManager, TickReport};
pub use provider::{BinanceProvider, MessageDispatch, ProviderSet, SubscriptionProvider};
pub use subscription::{
    CountMap, Subscription, SubscriptionId, SubscriptionMessage, SubscriptionRegistry,
    SubscriptionState, TickerMessage, Topic,
};
