//! Core data types shared by every stage of the pipeline.
//!
//! Mirrors the `stock_data_t` / `candlestick_t` structs of the original
//! pthread implementation, with the parallel per-symbol arrays collapsed
//! into a single `SymbolState` record (spec.md §9 Design Notes).

use crate::config::MAX_SYMBOL_LEN;

/// Rolling window depth for both the SMA and volume windows.
pub const WINDOW_LEN: usize = 15;

/// A single normalized trade tick, immutable once constructed.
///
/// Created by the producer, consumed (and dropped) by the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    /// Milliseconds since epoch, as reported by the provider.
    pub event_time_ms: i64,
    /// Microseconds since epoch, stamped by the producer at enqueue.
    pub ingress_time_us: i64,
}

impl Trade {
    /// Truncates `symbol` to the `MAX_SYMBOL_LEN`-byte bound spec.md places
    /// on it, at the nearest preceding UTF-8 char boundary. Mirrors the
    /// original's `strncpy(trade.symbol, ..., MAX_SYMBOL_LEN - 1)` —
    /// an oversized symbol is truncated and still enqueued, never rejected.
    pub fn truncate_symbol(mut symbol: String) -> String {
        if symbol.len() <= MAX_SYMBOL_LEN {
            return symbol;
        }
        let mut end = MAX_SYMBOL_LEN;
        while !symbol.is_char_boundary(end) {
            end -= 1;
        }
        symbol.truncate(end);
        symbol
    }
}

/// One symbol's OHLC candlestick for the current minute.
///
/// `empty` is true until the first trade of the minute is folded in;
/// once false, `low <= open,close <= high` holds for the rest of the
/// minute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candlestick {
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub empty: bool,
}

impl Default for Candlestick {
    fn default() -> Self {
        Self {
            open: 0.0,
            close: 0.0,
            high: 0.0,
            low: 0.0,
            volume: 0.0,
            empty: true,
        }
    }
}

impl Candlestick {
    /// Folds one trade into the candlestick, per spec.md §4.4.
    pub fn fold(&mut self, trade: &Trade) {
        self.close = trade.price;
        if self.empty {
            self.open = trade.price;
            self.high = trade.price;
            self.low = trade.price;
            self.empty = false;
        } else {
            self.high = self.high.max(trade.price);
            self.low = self.low.min(trade.price);
        }
        self.volume += trade.volume;
    }
}

/// Per-symbol aggregation state, touched trade-by-trade by the consumer
/// and reset/read minute-by-minute by the aggregator, both under
/// `AppState::agg`.
pub struct SymbolState {
    pub symbol: String,
    pub candle: Candlestick,
    pub price_sum: f64,
    pub trade_count: u64,
    pub sma_window: [f64; WINDOW_LEN],
    pub vol_window: [f64; WINDOW_LEN],
    /// Count of minutes emitted so far; indexes both windows modulo
    /// `WINDOW_LEN`. A starved minute does not advance this (spec.md §9
    /// Open Question: keep the prior slot, do not advance the cursor).
    pub window_cursor: u64,
    /// Microsecond timestamp of the previous emission; 0 until the first.
    pub prev_emit_time_us: i64,
}

impl SymbolState {
    pub fn new(symbol: String) -> Self {
        Self {
            symbol,
            candle: Candlestick::default(),
            price_sum: 0.0,
            trade_count: 0,
            sma_window: [0.0; WINDOW_LEN],
            vol_window: [0.0; WINDOW_LEN],
            window_cursor: 0,
            prev_emit_time_us: 0,
        }
    }

    /// Folds a trade into this symbol's minute state (spec.md §4.4 step 5).
    pub fn record_trade(&mut self, trade: &Trade) {
        self.trade_count += 1;
        self.price_sum += trade.price;
        self.candle.fold(trade);
    }

    /// Resets the per-minute counters after an emission (spec.md §4.5 step 3).
    pub fn reset_minute(&mut self) {
        self.candle = Candlestick::default();
        self.price_sum = 0.0;
        self.trade_count = 0;
    }
}

/// Connection lifecycle state, owned by the Connection Manager and
/// written by both the Connection Manager and the Minute Aggregator
/// (starvation-triggered forced close).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Established,
    Closed,
    ClientError,
}
