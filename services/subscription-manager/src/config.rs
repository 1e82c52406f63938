//! Manager and provider configuration

use crate::error::{SubscriptionError, SubscriptionResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Default delay between ticks
pub const DEFAULT_INTERVAL_MS: u64 = 2_000;
/// Default pause at the end of every tick
pub const DEFAULT_WAIT_TIME_MS: u64 = 5_000;
/// Public Binance combined-stream endpoint
pub const DEFAULT_BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/stream";

/// How many actions a reconciliation phase may take per tick
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TickPolicy {
    /// At most one connect, subscribe, unsubscribe and disconnect per tick
    #[default]
    OneActionPerPhase,
    /// Every eligible action in each phase
    AllEligible,
}

impl FromStr for TickPolicy {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one" | "one_action_per_phase" => Ok(Self::OneActionPerPhase),
            "all" | "all_eligible" => Ok(Self::AllEligible),
            other => Err(SubscriptionError::Config {
                message: format!("unknown tick policy: {other}"),
            }),
        }
    }
}

/// Reconciliation loop settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Time between the start of consecutive ticks
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
    /// Throttle applied at the end of every tick
    #[serde(rename = "wait_time_ms", with = "millis")]
    pub wait_time: Duration,
    /// Actions per phase per tick
    pub policy: TickPolicy,
    /// Unsubscribe removed subscriptions and disconnect idle providers
    pub reconcile_removals: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            wait_time: Duration::from_millis(DEFAULT_WAIT_TIME_MS),
            policy: TickPolicy::default(),
            reconcile_removals: true,
        }
    }
}

impl ManagerConfig {
    /// Defaults overridden by `SUBSCRIPTION_*` environment variables
    pub fn from_env() -> SubscriptionResult<Self> {
        let defaults = Self::default();

        let interval_ms = env_or("SUBSCRIPTION_TICK_INTERVAL_MS", DEFAULT_INTERVAL_MS)?;
        let wait_time_ms = env_or("SUBSCRIPTION_WAIT_TIME_MS", DEFAULT_WAIT_TIME_MS)?;
        let policy = env_or("SUBSCRIPTION_TICK_POLICY", defaults.policy)?;
        let reconcile_removals =
            env_or("SUBSCRIPTION_RECONCILE_REMOVALS", defaults.reconcile_removals)?;

        let config = Self {
            interval: Duration::from_millis(interval_ms),
            wait_time: Duration::from_millis(wait_time_ms),
            policy,
            reconcile_removals,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> SubscriptionResult<()> {
        if self.interval.is_zero() {
            return Err(SubscriptionError::Config {
                message: "tick interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Binance adapter settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BinanceConfig {
    /// Combined-stream websocket endpoint
    pub ws_url: String,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_BINANCE_WS_URL.to_string(),
        }
    }
}

impl BinanceConfig {
    /// Defaults overridden by `BINANCE_WS_URL`
    pub fn from_env() -> Self {
        match std::env::var("BINANCE_WS_URL") {
            Ok(ws_url) => Self { ws_url },
            Err(_) => Self::default(),
        }
    }
}

fn env_or<T>(key: &str, default: T) -> SubscriptionResult<T>
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val.parse().map_err(|e| SubscriptionError::Config {
            message: format!("invalid {key}: {e}"),
        }),
        Err(e) => {
            tracing::debug!("{} not set, using default {:?}: {}", key, default, e);
            Ok(default)
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
