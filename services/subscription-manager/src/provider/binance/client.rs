//! Binance combined-stream websocket transport

use super::message::{ALL_TICKERS_STREAM, BinanceFrame, BinanceMethod, BinanceRequest};
use crate::error::{ProviderError, ProviderResult};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn};

/// One open websocket session
struct Session {
    outbound: mpsc::UnboundedSender<Message>,
    alive: Arc<AtomicBool>,
}

impl Session {
    fn is(&self, alive: &Arc<AtomicBool>) -> bool {
        Arc::ptr_eq(&self.alive, alive)
    }
}

/// Websocket client for the Binance stream endpoint
///
/// A reader task decodes inbound text frames and answers pings; a writer task
/// drains the outbound queue. Both inherit the caller's tracing subscriber.
pub struct BinanceClient {
    ws_url: String,
    session: Arc<Mutex<Option<Session>>>,
    next_request_id: AtomicU64,
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("ws_url", &self.ws_url)
            .field("connected", &self.connected())
            .finish()
    }
}

impl BinanceClient {
    /// Create a disconnected client for `ws_url`
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            session: Arc::new(Mutex::new(None)),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Whether the current session is open
    pub fn connected(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|session| session.alive.load(Ordering::Acquire))
    }

    /// Open the websocket
    ///
    /// `on_frame` runs for every decoded text frame. `on_disconnect` runs once
    /// when the venue ends the session while it is still the current one; a
    /// session replaced by [`disconnect`](Self::disconnect) or a later
    /// `connect` ends without it. The hook runs with the session slot locked
    /// and must not call back into the client.
    pub async fn connect<F, D>(&self, on_frame: F, on_disconnect: D) -> ProviderResult<()>
    where
        F: Fn(BinanceFrame) + Send + 'static,
        D: FnOnce() + Send + 'static,
    {
        info!(url = %self.ws_url, "Binance client connecting");

        let (ws_stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let alive = Arc::new(AtomicBool::new(true));
        *self.session.lock() = Some(Session {
            outbound: outbound.clone(),
            alive: alive.clone(),
        });

        tokio::spawn(
            async move {
                while let Some(msg) = outbound_rx.recv().await {
                    let closing = matches!(msg, Message::Close(_));
                    if let Err(e) = write.send(msg).await {
                        warn!("Binance websocket write failed: {}", e);
                        break;
                    }
                    if closing {
                        break;
                    }
                }
            }
            .with_current_subscriber(),
        );

        let pong_tx = outbound;
        let reader_alive = alive;
        let sessions = self.session.clone();
        tokio::spawn(
            async move {
                while let Some(msg) = read.next().await {
                    match msg {
                        Ok(Message::Text(text)) => match BinanceFrame::decode(&text) {
                            Ok(frame) => on_frame(frame),
                            Err(e) => warn!("Discarding undecodable Binance frame: {}", e),
                        },
                        Ok(Message::Ping(data)) => {
                            if pong_tx.send(Message::Pong(data)).is_err() {
                                break;
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            info!("Binance websocket closed: {:?}", frame);
                            break;
                        }
                        Err(e) => {
                            error!("Binance websocket failed: {}", ProviderError::from(e));
                            break;
                        }
                        _ => {}
                    }
                }
                // A new session cannot be installed until the hook has run
                let mut slot = sessions.lock();
                reader_alive.store(false, Ordering::Release);
                if slot.as_ref().is_some_and(|s| s.is(&reader_alive)) {
                    *slot = None;
                    on_disconnect();
                    debug!("Binance reader finished");
                } else {
                    debug!("Binance reader for a replaced session finished");
                }
            }
            .with_current_subscriber(),
        );

        info!("Binance client connected");
        Ok(())
    }

    /// Close the current session, if any
    pub fn disconnect(&self) {
        info!("Binance client disconnecting");
        if let Some(session) = self.session.lock().take() {
            session.alive.store(false, Ordering::Release);
            // Writer may already be gone when the venue closed first.
            let _ = session.outbound.send(Message::Close(None));
        }
    }

    /// Request the all-tickers stream
    pub fn subscribe_to_all_tickers(&self) -> ProviderResult<u64> {
        info!("Binance client subscribing to all tickers");
        self.request(BinanceMethod::Subscribe, vec![ALL_TICKERS_STREAM.to_string()])
    }

    /// Drop the all-tickers stream
    pub fn unsubscribe_from_all_tickers(&self) -> ProviderResult<u64> {
        info!("Binance client unsubscribing from all tickers");
        self.request(BinanceMethod::Unsubscribe, vec![ALL_TICKERS_STREAM.to_string()])
    }

    fn request(&self, method: BinanceMethod, params: Vec<String>) -> ProviderResult<u64> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let text = BinanceRequest { method, params, id }.encode()?;

        let session = self.session.lock();
        let session = session
            .as_ref()
            .filter(|session| session.alive.load(Ordering::Acquire))
            .ok_or_else(|| ProviderError::NotConnected {
                provider: "binance".to_string(),
            })?;
        session
            .outbound
            .send(Message::Text(text))
            .map_err(|_| ProviderError::ChannelClosed)?;

        debug!(request_id = id, ?method, "Binance request queued");
        Ok(id)
    }
}
