//! Producer Loop (spec.md §4.3, C3): drives the WebSocket session, parses
//! incoming frames, and enqueues normalized trades.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;

use crate::connection::{ConnectionManager, Serviced};
use crate::fifo::Outcome;
use crate::model::{ConnectionState, Trade};
use crate::state::AppState;
use crate::util::now_us;

/// A frame with no `data` array is treated as a keepalive ping. More
/// than this many consecutive pings forces a reconnect (spec.md §6).
const PING_LIMIT: u32 = 2;

/// More than this many consecutive failed reconnect attempts triggers
/// the 10s throttle (spec.md §4.3 step 3).
const MAX_FAST_ATTEMPTS: u32 = 10;

/// Runs the producer loop until shutdown is requested. `conn` must
/// already be in the `Established` state (the initial connection is
/// made synchronously in `main` so that a failure there is a fatal
/// startup error, per spec.md §6).
pub fn run(state: &Arc<AppState>, mut conn: ConnectionManager) {
    let mut attempts: u32 = 0;
    let mut ping_count: u32 = 0;

    while !state.shutdown.is_set() {
        match conn.service() {
            Serviced::Frame(text) => {
                handle_frame(state, &text, &mut ping_count);
            }
            Serviced::Idle => {}
            Serviced::Closed => {
                if state.connection_state() == ConnectionState::Established {
                    state.set_connection_state(ConnectionState::Closed);
                }
            }
            Serviced::Error => {
                // Distinct from a clean close (spec.md §4.5): a transport
                // error transitions to `ClientError`, which the reconnect
                // branch below gives the mandatory 500ms pre-reopen delay
                // (spec.md §7 error kind 2).
                if state.connection_state() == ConnectionState::Established {
                    state.set_connection_state(ConnectionState::ClientError);
                }
            }
        }

        if state.shutdown.is_set() {
            break;
        }

        let cs = state.connection_state();
        if cs == ConnectionState::Closed || cs == ConnectionState::ClientError {
            if cs == ConnectionState::ClientError && sleep_unless_shutdown(state, Duration::from_millis(500)) {
                break;
            }
            conn.teardown();
            state.metrics.record_reconnect();
            ping_count = 0;
            if conn.connect(state).is_ok() {
                attempts = 0;
            }
        }

        if state.connection_state() != ConnectionState::Established {
            attempts = attempts.saturating_add(1);
            info!("reconnecting to provider, attempt {attempts}");

            if attempts > MAX_FAST_ATTEMPTS && sleep_unless_shutdown(state, Duration::from_secs(10)) {
                break;
            }

            loop {
                if state.shutdown.is_set() {
                    conn.teardown();
                    return;
                }
                match conn.connect(state) {
                    Ok(()) => {
                        attempts = 0;
                        ping_count = 0;
                        break;
                    }
                    Err(e) => {
                        warn!("reconnect attempt failed: {e:#}");
                        if state.connection_state() == ConnectionState::ClientError {
                            if sleep_unless_shutdown(state, Duration::from_millis(500)) {
                                conn.teardown();
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    conn.teardown();
}

/// Sleeps up to `dur`, waking early on shutdown. Returns `true` if
/// shutdown was observed.
fn sleep_unless_shutdown(state: &AppState, dur: Duration) -> bool {
    state.shutdown.wait_timeout(dur)
}

/// Parses one received frame and enqueues any well-formed trades in it,
/// per spec.md §4.3's parse-callback contract.
fn handle_frame(state: &Arc<AppState>, text: &str, ping_count: &mut u32) {
    let root: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            state.metrics.record_parse_error();
            warn!("malformed JSON frame, skipping: {e}");
            return;
        }
    };

    let data = match root.get("data") {
        Some(Value::Array(arr)) => arr,
        _ => {
            *ping_count += 1;
            state.metrics.record_ping_drop();
            debug!("ping frame received ({ping_count}/{PING_LIMIT})");
            if *ping_count > PING_LIMIT {
                warn!("ping limit exceeded, forcing reconnect");
                state.set_connection_state(ConnectionState::Closed);
            }
            return;
        }
    };
    *ping_count = 0;

    for (idx, elem) in data.iter().enumerate() {
        let Some(trade) = parse_trade(elem) else {
            state.metrics.record_parse_error();
            warn!("malformed trade record at index {idx}, skipping frame");
            return;
        };
        state.metrics.record_trade_received();

        let outcome = state.fifo.enqueue(trade, &state.shutdown);
        if outcome == Outcome::Done {
            state.metrics.record_trade_enqueued();
        } else {
            return;
        }
    }
}

/// Extracts `s`, `p`, `v`, `t` from one element of the `data` array,
/// stamping `ingress_time_us` immediately before the trade is handed off
/// (spec.md §4.3, §3). Only a missing or mistyped field aborts the frame;
/// an oversized symbol is truncated (not rejected) and any numeric sign on
/// price/volume is accepted as-is, matching the original's
/// `parse_json_data` (which never range- or length-checks these fields).
fn parse_trade(elem: &Value) -> Option<Trade> {
    let symbol = elem.get("s")?.as_str()?.to_string();
    let price = elem.get("p")?.as_f64()?;
    let volume = elem.get("v")?.as_f64()?;
    let event_time_ms = elem.get("t")?.as_i64()?;

    Some(Trade {
        symbol: Trade::truncate_symbol(symbol),
        price,
        volume,
        event_time_ms,
        ingress_time_us: now_us(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::output::Outputs;
    use std::path::PathBuf;

    fn test_state() -> Arc<AppState> {
        let dir = tempfile::tempdir().unwrap();
        let symbols = vec!["AAPL".to_string(), "NVDA".to_string()];
        let outputs = Outputs::create(dir.path(), &symbols).unwrap();
        let cfg = Config {
            provider_url: "wss://example.io".into(),
            provider_token: "tok".into(),
            symbols,
            output_dir: PathBuf::from(dir.path()),
        };
        Arc::new(AppState::new(cfg, outputs))
    }

    #[test]
    fn valid_data_frame_enqueues_trades_and_resets_ping_count() {
        let state = test_state();
        let mut ping_count = 2;
        let frame = r#"{"type":"trade","data":[{"s":"AAPL","p":190.5,"v":3.0,"t":1700000000000}]}"#;
        handle_frame(&state, frame, &mut ping_count);
        assert_eq!(ping_count, 0);
        let trade = state.fifo.try_dequeue().unwrap();
        assert_eq!(trade.symbol, "AAPL");
        assert_eq!(trade.price, 190.5);
        assert!(trade.ingress_time_us > 0);
    }

    #[test]
    fn ping_frame_increments_counter_without_enqueuing() {
        let state = test_state();
        let mut ping_count = 0;
        handle_frame(&state, r#"{"type":"ping"}"#, &mut ping_count);
        assert_eq!(ping_count, 1);
        assert_eq!(state.fifo.len(), 0);
    }

    #[test]
    fn third_consecutive_ping_forces_reconnect() {
        let state = test_state();
        state.set_connection_state(ConnectionState::Established);
        let mut ping_count = 0;
        for _ in 0..3 {
            handle_frame(&state, r#"{"type":"ping"}"#, &mut ping_count);
        }
        assert_eq!(state.connection_state(), ConnectionState::Closed);
    }

    #[test]
    fn ping_between_data_frames_resets_counter() {
        let state = test_state();
        state.set_connection_state(ConnectionState::Established);
        let mut ping_count = 0;
        handle_frame(&state, r#"{"type":"ping"}"#, &mut ping_count);
        handle_frame(&state, r#"{"type":"ping"}"#, &mut ping_count);
        handle_frame(
            &state,
            r#"{"data":[{"s":"AAPL","p":1.0,"v":1.0,"t":1}]}"#,
            &mut ping_count,
        );
        handle_frame(&state, r#"{"type":"ping"}"#, &mut ping_count);
        handle_frame(&state, r#"{"type":"ping"}"#, &mut ping_count);
        assert_eq!(state.connection_state(), ConnectionState::Connecting);
    }

    #[test]
    fn malformed_record_aborts_frame_without_closing_connection() {
        let state = test_state();
        state.set_connection_state(ConnectionState::Established);
        let mut ping_count = 0;
        let frame = r#"{"data":[{"s":"AAPL","p":"not-a-number","v":1.0,"t":1}]}"#;
        handle_frame(&state, frame, &mut ping_count);
        assert_eq!(state.connection_state(), ConnectionState::Established);
        assert_eq!(state.fifo.len(), 0);
    }

    #[test]
    fn negative_price_and_volume_are_accepted_not_rejected() {
        let elem: Value = serde_json::from_str(
            r#"{"s":"AAPL","p":-1.0,"v":-2.0,"t":1700000000000}"#,
        )
        .unwrap();
        let trade = parse_trade(&elem).expect("sign is not a rejection ground");
        assert_eq!(trade.price, -1.0);
        assert_eq!(trade.volume, -2.0);
    }

    #[test]
    fn oversized_symbol_is_truncated_not_rejected() {
        let long = "X".repeat(40);
        let elem: Value = serde_json::from_str(&format!(
            r#"{{"s":"{long}","p":1.0,"v":1.0,"t":1}}"#
        ))
        .unwrap();
        let trade = parse_trade(&elem).expect("oversized symbol is not a rejection ground");
        assert_eq!(trade.symbol, "X".repeat(crate::config::MAX_SYMBOL_LEN));
    }

    #[test]
    fn missing_field_still_aborts_the_record() {
        let elem: Value = serde_json::from_str(r#"{"s":"AAPL","p":1.0,"v":1.0}"#).unwrap();
        assert!(parse_trade(&elem).is_none());
    }
}
