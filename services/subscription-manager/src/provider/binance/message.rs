//! Binance combined-stream frames and requests

use crate::subscription::{SubscriptionMessage, SubscriptionState, TickerMessage, Topic};
use serde::{Deserialize, Serialize};

/// Stream carrying a 24hr ticker for every symbol
pub const ALL_TICKERS_STREAM: &str = "!ticker@arr";

/// 24hr rolling ticker, reduced to the fields we normalize
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BinanceTicker {
    /// Event time in milliseconds
    #[serde(rename = "E")]
    pub event_time: u64,
    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,
    /// Best bid price
    #[serde(rename = "b")]
    pub best_bid: String,
    /// Best ask price
    #[serde(rename = "a")]
    pub best_ask: String,
}

/// Error payload returned for a rejected request
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BinanceErrorBody {
    pub code: i64,
    pub msg: String,
}

/// Any frame received on the combined stream endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BinanceFrame {
    /// Market data
    Stream {
        stream: String,
        data: serde_json::Value,
    },
    /// Rejected request
    Error {
        error: BinanceErrorBody,
        id: Option<u64>,
    },
    /// Request acknowledgement
    Result {
        result: serde_json::Value,
        id: Option<u64>,
    },
}

impl BinanceFrame {
    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Ticker records carried by this frame
    ///
    /// Control frames and streams other than tickers yield `None`.
    pub fn into_tickers(self) -> Result<Option<Vec<BinanceTicker>>, serde_json::Error> {
        match self {
            Self::Stream { stream, data } if stream == ALL_TICKERS_STREAM => {
                serde_json::from_value(data).map(Some)
            }
            Self::Stream { stream, data } if stream.ends_with("@ticker") => {
                serde_json::from_value(data).map(|ticker| Some(vec![ticker]))
            }
            _ => Ok(None),
        }
    }
}

/// Request methods understood by the stream endpoint
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BinanceMethod {
    Subscribe,
    Unsubscribe,
}

/// Outbound request
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BinanceRequest {
    pub method: BinanceMethod,
    pub params: Vec<String>,
    pub id: u64,
}

impl BinanceRequest {
    /// Encode as a text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Fan ticker records out to every ticker subscription on the record's pair
pub fn normalize_tickers(
    state: &SubscriptionState,
    tickers: &[BinanceTicker],
) -> Vec<SubscriptionMessage> {
    tickers
        .iter()
        .filter(|ticker| state.has_subscriptions_for_pair(&ticker.symbol))
        .flat_map(move |ticker| {
            state
                .subscriptions_for_pair(&ticker.symbol)
                .into_iter()
                .filter(|sub| sub.topic == Topic::Ticker)
                .map(move |sub| {
                    SubscriptionMessage::Ticker(TickerMessage {
                        subscription_id: sub.id.clone(),
                        topic: Topic::Ticker,
                        bid: ticker.best_bid.clone(),
                        ask: ticker.best_ask.clone(),
                        pair: ticker.symbol.clone(),
                        time: ticker.event_time,
                    })
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::Subscription;
    use serde_json::json;

    const TEST_EVENT_TIME: u64 = 1_640_995_200_000;

    fn ticker_arr_frame() -> String {
        json!({
            "stream": "!ticker@arr",
            "data": [
                {"e": "24hrTicker", "E": TEST_EVENT_TIME, "s": "BTCUSDT", "b": "45000.50", "B": "1.2", "a": "45001.00", "A": "0.8", "c": "45000.75"},
                {"e": "24hrTicker", "E": TEST_EVENT_TIME, "s": "ETHUSDT", "b": "3000.10", "B": "4", "a": "3000.20", "A": "2", "c": "3000.15"}
            ]
        })
        .to_string()
    }

    #[test]
    fn test_decode_ticker_array() {
        let tickers = BinanceFrame::decode(&ticker_arr_frame())
            .unwrap()
            .into_tickers()
            .unwrap()
            .unwrap();

        assert_eq!(tickers.len(), 2);
        assert_eq!(tickers[0].symbol, "BTCUSDT");
        assert_eq!(tickers[0].best_bid, "45000.50");
        assert_eq!(tickers[0].best_ask, "45001.00");
        assert_eq!(tickers[0].event_time, TEST_EVENT_TIME);
    }

    #[test]
    fn test_decode_single_symbol_ticker() {
        let text = json!({
            "stream": "btcusdt@ticker",
            "data": {"E": 1, "s": "BTCUSDT", "b": "1", "a": "2"}
        })
        .to_string();
        let tickers = BinanceFrame::decode(&text).unwrap().into_tickers().unwrap();
        assert_eq!(tickers.map(|t| t.len()), Some(1));
    }

    #[test]
    fn test_control_frames_carry_no_tickers() {
        let ack = BinanceFrame::decode(r#"{"result":null,"id":1}"#).unwrap();
        assert!(matches!(ack, BinanceFrame::Result { id: Some(1), .. }));
        assert!(ack.into_tickers().unwrap().is_none());

        let err = BinanceFrame::decode(r#"{"error":{"code":2,"msg":"Invalid request"},"id":3}"#)
            .unwrap();
        assert!(matches!(err, BinanceFrame::Error { ref error, .. } if error.code == 2));
        assert!(err.into_tickers().unwrap().is_none());

        let mini = json!({"stream": "!miniTicker@arr", "data": []}).to_string();
        assert!(BinanceFrame::decode(&mini).unwrap().into_tickers().unwrap().is_none());
    }

    #[test]
    fn test_request_encoding() {
        let subscribe = BinanceRequest {
            method: BinanceMethod::Subscribe,
            params: vec![ALL_TICKERS_STREAM.to_string()],
            id: 1,
        };
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&subscribe.encode().unwrap()).unwrap(),
            json!({"method": "SUBSCRIBE", "params": ["!ticker@arr"], "id": 1})
        );

        let unsubscribe = BinanceRequest {
            method: BinanceMethod::Unsubscribe,
            params: vec![ALL_TICKERS_STREAM.to_string()],
            id: 7,
        };
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&unsubscribe.encode().unwrap()).unwrap(),
            json!({"method": "UNSUBSCRIBE", "params": ["!ticker@arr"], "id": 7})
        );
    }

    #[test]
    fn test_normalize_fans_out_per_subscription() {
        let mut state = SubscriptionState::new();
        state.add_subscription(Subscription::ticker("t1", "BTCUSDT", "binance"));
        state.add_subscription(Subscription::ticker("t2", "BTCUSDT", "binance"));

        let tickers = BinanceFrame::decode(&ticker_arr_frame())
            .unwrap()
            .into_tickers()
            .unwrap()
            .unwrap();
        let messages = normalize_tickers(&state, &tickers);

        let ids: Vec<&str> = messages.iter().map(|m| m.subscription_id()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
        assert_eq!(
            messages[0],
            SubscriptionMessage::Ticker(TickerMessage {
                subscription_id: "t1".to_string(),
                topic: Topic::Ticker,
                bid: "45000.50".to_string(),
                ask: "45001.00".to_string(),
                pair: "BTCUSDT".to_string(),
                time: TEST_EVENT_TIME,
            })
        );
    }

    #[test]
    fn test_normalize_ignores_unwatched_pairs() {
        let state = SubscriptionState::new();
        let tickers = vec![BinanceTicker {
            event_time: 1,
            symbol: "BTCUSDT".to_string(),
            best_bid: "1".to_string(),
            best_ask: "2".to_string(),
        }];
        assert!(normalize_tickers(&state, &tickers).is_empty());
    }
}
