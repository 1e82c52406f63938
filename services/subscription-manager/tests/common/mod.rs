//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use subscription_manager::{
    MessageDispatch, ProviderError, ProviderResult, Subscription, SubscriptionId,
    SubscriptionMessage, SubscriptionProvider, SubscriptionState, TickerMessage, Topic,
};
use tracing::Dispatch;

/// Venue record fed into [`FakeProvider::feed`]
#[derive(Debug, Clone)]
pub struct FakeTicker {
    pub pair: &'static str,
    pub bid: &'static str,
    pub ask: &'static str,
    pub time: u64,
}

/// Provider whose transport opens synchronously and never talks to a venue
pub struct FakeProvider {
    id: String,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    fail_unsubscribe: AtomicBool,
    dispatch: Mutex<Option<MessageDispatch>>,
    state: Mutex<SubscriptionState>,
    pub connect_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
    pub unsubscribe_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            connected: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            fail_unsubscribe: AtomicBool::new(false),
            dispatch: Mutex::new(None),
            state: Mutex::new(SubscriptionState::new()),
            connect_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
        })
    }

    /// Make every following connect attempt fail
    pub fn fail_connects(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make every following unsubscribe fail and keep the subscription
    pub fn fail_unsubscribes(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    /// Deliver a venue record the way a transport reader would
    pub fn feed(&self, ticker: FakeTicker) {
        let Some(dispatch) = self.dispatch.lock().clone() else {
            return;
        };
        let messages: Vec<SubscriptionMessage> = self
            .state
            .lock()
            .subscriptions_for_pair(ticker.pair)
            .into_iter()
            .map(|sub| {
                SubscriptionMessage::Ticker(TickerMessage {
                    subscription_id: sub.id.clone(),
                    topic: Topic::Ticker,
                    bid: ticker.bid.to_string(),
                    ask: ticker.ask.to_string(),
                    pair: ticker.pair.to_string(),
                    time: ticker.time,
                })
            })
            .collect();
        for message in messages {
            dispatch.send(message);
        }
    }

    /// Simulate the venue closing the transport
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.state.lock().clear();
    }

    pub fn calls(&self, counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionProvider for FakeProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self, dispatch: MessageDispatch) -> ProviderResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ProviderError::ConnectionFailed("refused".to_string()));
        }
        *self.dispatch.lock() = Some(dispatch);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> ProviderResult<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.drop_connection();
        Ok(())
    }

    async fn subscribe(&self, subscription: Subscription) -> ProviderResult<()> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if !self.connected() {
            return Err(ProviderError::NotConnected {
                provider: self.id.clone(),
            });
        }
        self.state.lock().add_subscription(subscription);
        Ok(())
    }

    async fn unsubscribe(&self, subscription_id: &str) -> ProviderResult<()> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport("send failed".to_string()));
        }
        self.state.lock().remove_subscription(subscription_id);
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

/// Collects dispatched messages
pub fn message_sink() -> (
    Arc<Mutex<Vec<SubscriptionMessage>>>,
    impl Fn(SubscriptionMessage) + Send + Sync + 'static,
) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    (received, move |message| sink.lock().push(message))
}

/// In-memory log target for asserting on emitted records
#[derive(Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Logger that writes plain-text records into this buffer
    pub fn dispatch(&self) -> Dispatch {
        let buffer = self.buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .without_time()
            .with_writer(move || LogWriter(buffer.clone()))
            .finish();
        Dispatch::new(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }
}

struct LogWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
