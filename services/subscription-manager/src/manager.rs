//! Subscription reconciliation loop
//!
//! The manager holds the desired subscriptions and the registered providers.
//! A single task ticks at a fixed interval and, on every tick, moves the
//! providers one step closer to the desired state:
//!
//! 1. connect a provider that has subscriptions but no live transport
//! 2. subscribe a connected provider to a subscription it does not serve yet,
//!    or serves in an older version
//! 3. unsubscribe a provider from a subscription that was removed
//! 4. disconnect a provider nothing refers to any more
//! 5. wait, so upstream venues see a bounded request rate
//!
//! Steps 3 and 4 run only with [`ManagerConfig::reconcile_removals`].

use crate::config::{ManagerConfig, TickPolicy};
use crate::error::{SubscriptionError, SubscriptionResult};
use crate::provider::{MessageDispatch, ProviderSet, SubscriptionProvider};
use crate::subscription::{Subscription, SubscriptionMessage, SubscriptionRegistry};
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, error, info, warn};

/// Lifecycle state of the manager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ManagerStatus {
    /// No loop running
    #[default]
    Offline,
    /// Reserved; the manager never enters it
    Connecting,
    /// Loop running
    Online,
}

impl fmt::Display for ManagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Offline => "offline",
            Self::Connecting => "connecting",
            Self::Online => "online",
        })
    }
}

/// Actions taken by one reconciliation pass
///
/// Counts the calls each provider accepted. A failed call still uses up its
/// phase's budget and is retried on a later pass. Each provider sees at most
/// one connect attempt per pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub connects: usize,
    pub subscribes: usize,
    pub unsubscribes: usize,
    pub disconnects: usize,
}

impl TickReport {
    /// True when the pass found nothing to do
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Keeps providers in line with the desired subscriptions
///
/// Share it behind an [`Arc`]; every method takes `&self`. Log records go to
/// the [`Dispatch`] given at construction, including those emitted by
/// providers while the loop drives them.
pub struct SubscriptionManager {
    config: ManagerConfig,
    logger: Dispatch,
    subscriptions: RwLock<SubscriptionRegistry>,
    providers: RwLock<ProviderSet>,
    callback: Arc<RwLock<MessageDispatch>>,
    status: watch::Sender<ManagerStatus>,
    running: AtomicBool,
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("subscriptions", &self.subscriptions.read().len())
            .field("providers", &*self.providers.read())
            .finish()
    }
}

/// Clears the single-flight flag when the loop task ends, even by panic
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SubscriptionManager {
    /// Create an offline manager
    pub fn new(config: ManagerConfig, logger: Dispatch) -> Self {
        let (status, _) = watch::channel(ManagerStatus::Offline);
        Self {
            config,
            logger,
            subscriptions: RwLock::new(SubscriptionRegistry::new()),
            providers: RwLock::new(ProviderSet::new()),
            callback: Arc::new(RwLock::new(MessageDispatch::noop())),
            status,
            running: AtomicBool::new(false),
        }
    }

    /// Create an offline manager seeded with `subscriptions`
    pub fn with_subscriptions(
        config: ManagerConfig,
        logger: Dispatch,
        subscriptions: impl IntoIterator<Item = Subscription>,
    ) -> Self {
        let manager = Self::new(config, logger);
        for subscription in subscriptions {
            manager.subscribe(subscription);
        }
        manager
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn status(&self) -> ManagerStatus {
        *self.status.borrow()
    }

    /// Watch lifecycle changes
    pub fn status_changes(&self) -> watch::Receiver<ManagerStatus> {
        self.status.subscribe()
    }

    /// Start the loop on the current tokio runtime
    ///
    /// The status is `Online` when this returns. The handle completes once
    /// the status is back to `Offline` and the in-flight tick, if any, has
    /// finished. `cancel` is sampled once per tick; when it reads `true` the
    /// manager stops itself.
    pub fn start(
        self: &Arc<Self>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> SubscriptionResult<JoinHandle<()>> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(SubscriptionError::AlreadyRunning);
        }

        self.log(|| info!("starting subscription manager"));
        self.set_status(ManagerStatus::Online);

        let manager = Arc::clone(self);
        let logger = self.logger.clone();
        Ok(tokio::spawn(
            async move {
                let _running = RunningGuard(&manager.running);
                manager.run(cancel).await;
            }
            .with_subscriber(logger),
        ))
    }

    /// Ask the loop to stop after the in-flight tick
    pub fn stop(&self) {
        self.log(|| info!("stopping subscription manager"));
        self.set_status(ManagerStatus::Offline);
    }

    /// Replace the callback receiving normalized messages
    ///
    /// Providers connected earlier deliver to the new callback as well.
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(SubscriptionMessage) + Send + Sync + 'static,
    {
        *self.callback.write() = MessageDispatch::new(callback);
    }

    /// Register a provider under its id
    pub fn add_provider(&self, provider: Arc<dyn SubscriptionProvider>) {
        let id = provider.id().to_string();
        if self.providers.write().insert(provider).is_some() {
            self.log(|| warn!(provider = %id, "provider replaced"));
        } else {
            self.log(|| info!(provider = %id, "provider registered"));
        }
    }

    /// Ids of registered providers, in registration order
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers.read().ids()
    }

    /// Add or overwrite a subscription
    pub fn subscribe(&self, subscription: Subscription) {
        self.log(|| debug!(subscription_id = %subscription.id, "subscription added"));
        self.subscriptions.write().subscribe(subscription);
    }

    /// Remove a subscription; unknown ids are ignored
    pub fn unsubscribe(&self, subscription_id: &str) {
        if self.subscriptions.write().unsubscribe(subscription_id).is_some() {
            self.log(|| debug!(subscription_id, "subscription removed"));
        }
    }

    /// Desired subscriptions in registration order
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.read().snapshot()
    }

    /// Look up one desired subscription
    pub fn subscription(&self, subscription_id: &str) -> Option<Subscription> {
        self.subscriptions.read().get(subscription_id).cloned()
    }

    /// Run one reconciliation pass without the trailing wait
    pub async fn reconcile(&self) -> TickReport {
        async {
            let mut report = TickReport {
                connects: self.handle_connects().await,
                subscribes: self.handle_subscribes().await,
                ..TickReport::default()
            };
            if self.config.reconcile_removals {
                report.unsubscribes = self.handle_unsubscribes().await;
                report.disconnects = self.handle_disconnects().await;
            }
            if !report.is_idle() {
                debug!(?report, "reconciliation pass finished");
            }
            report
        }
        .with_subscriber(self.logger.clone())
        .await
    }

    async fn run(&self, mut cancel: Option<watch::Receiver<bool>>) {
        let period = self.config.interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut status = self.status.subscribe();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = status.wait_for(|s| *s == ManagerStatus::Offline) => break,
            }

            if cancel.as_mut().is_some_and(|rx| *rx.borrow_and_update()) {
                info!("cancellation requested");
                self.stop();
            }
            if self.status() == ManagerStatus::Offline {
                break;
            }

            self.reconcile().await;
            time::sleep(self.config.wait_time).await;
        }

        info!("subscription manager stopped");
    }

    fn action_limit(&self) -> usize {
        match self.config.policy {
            TickPolicy::OneActionPerPhase => 1,
            TickPolicy::AllEligible => usize::MAX,
        }
    }

    fn provider(&self, id: &str) -> Option<Arc<dyn SubscriptionProvider>> {
        self.providers.read().get(id).cloned()
    }

    /// Dispatch that forwards to whatever callback is current at delivery
    fn dispatch(&self) -> MessageDispatch {
        let callback = self.callback.clone();
        MessageDispatch::new(move |message| {
            let current = callback.read().clone();
            current.send(message);
        })
    }

    async fn handle_connects(&self) -> usize {
        let limit = self.action_limit();
        let desired = self.subscriptions.read().snapshot();
        let mut attempted = FxHashSet::default();
        let mut accepted = 0;

        for subscription in desired {
            let Some(provider) = self.provider(&subscription.provider) else {
                warn!(
                    subscription_id = %subscription.id,
                    provider = %subscription.provider,
                    "no provider registered for subscription, skipping"
                );
                continue;
            };
            if provider.connected() || !attempted.insert(subscription.provider.clone()) {
                continue;
            }

            info!(provider = %subscription.provider, "connecting provider");
            match provider.connect(self.dispatch()).await {
                Ok(()) => accepted += 1,
                Err(e) => error!(provider = %subscription.provider, "provider connect failed: {}", e),
            }
            if attempted.len() >= limit {
                break;
            }
        }
        accepted
    }

    async fn handle_subscribes(&self) -> usize {
        let limit = self.action_limit();
        let desired = self.subscriptions.read().snapshot();
        let mut attempts = 0;
        let mut accepted = 0;

        for subscription in desired {
            let Some(provider) = self.provider(&subscription.provider) else {
                continue;
            };
            if !provider.connected() {
                // Later entries wait until this provider is up
                if self.config.policy == TickPolicy::OneActionPerPhase {
                    break;
                }
                continue;
            }
            if provider.subscription(&subscription.id).as_ref() == Some(&subscription) {
                continue;
            }

            let subscription_id = subscription.id.clone();
            info!(
                subscription_id = %subscription_id,
                provider = %subscription.provider,
                pair = %subscription.pair,
                "subscribing provider"
            );
            attempts += 1;
            match provider.subscribe(subscription).await {
                Ok(()) => accepted += 1,
                Err(e) => error!(subscription_id = %subscription_id, "provider subscribe failed: {}", e),
            }
            if attempts >= limit {
                break;
            }
        }
        accepted
    }

    async fn handle_unsubscribes(&self) -> usize {
        let limit = self.action_limit();
        let providers: Vec<_> = self.providers.read().iter().cloned().collect();
        let mut attempts = 0;
        let mut accepted = 0;

        for provider in providers {
            let mut stale: Vec<_> = {
                let desired = self.subscriptions.read();
                provider
                    .subscription_ids()
                    .into_iter()
                    .filter(|id| {
                        desired
                            .get(id)
                            .is_none_or(|sub| sub.provider != provider.id())
                    })
                    .collect()
            };
            stale.sort();

            for subscription_id in stale {
                info!(
                    subscription_id = %subscription_id,
                    provider = %provider.id(),
                    "unsubscribing provider"
                );
                attempts += 1;
                match provider.unsubscribe(&subscription_id).await {
                    Ok(()) => accepted += 1,
                    Err(e) => {
                        error!(subscription_id = %subscription_id, "provider unsubscribe failed: {}", e)
                    }
                }
                if attempts >= limit {
                    return accepted;
                }
            }
        }
        accepted
    }

    async fn handle_disconnects(&self) -> usize {
        let limit = self.action_limit();
        let providers: Vec<_> = self.providers.read().iter().cloned().collect();
        let mut attempts = 0;
        let mut accepted = 0;

        for provider in providers {
            let idle = provider.connected()
                && provider.subscription_ids().is_empty()
                && !self.subscriptions.read().references_provider(provider.id());
            if !idle {
                continue;
            }

            info!(provider = %provider.id(), "disconnecting idle provider");
            attempts += 1;
            match provider.disconnect().await {
                Ok(()) => accepted += 1,
                Err(e) => error!(provider = %provider.id(), "provider disconnect failed: {}", e),
            }
            if attempts >= limit {
                break;
            }
        }
        accepted
    }

    fn set_status(&self, status: ManagerStatus) {
        self.status.send_replace(status);
    }

    fn log<F: FnOnce()>(&self, f: F) {
        tracing::dispatcher::with_default(&self.logger, f);
    }
}
