//! Minute Aggregator (spec.md §4.5, C5): on a 1-minute cadence, finalizes
//! each symbol's candlestick, maintains the rolling SMA/volume windows,
//! and detects symbol-level data starvation to trigger a reconnect.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::connection::ConnectionManager;
use crate::model::{SymbolState, WINDOW_LEN};
use crate::state::AppState;
use crate::util::now_us;

const MINUTE: Duration = Duration::from_secs(60);

/// Runs the aggregator loop until shutdown is requested.
///
/// The minute timer's condvar is bound to the same mutex that guards the
/// per-symbol aggregation state (spec.md §9 Design Notes), so the
/// aggregator's wait and the consumer's trade-by-trade writes never race:
/// whichever holds the lock observes a consistent state.
pub fn run(state: &Arc<AppState>) {
    loop {
        let guard = state.aggregation.symbols.lock().unwrap();
        let (mut guard, wait_result) = state
            .aggregation
            .timer_cv
            .wait_timeout(guard, MINUTE)
            .unwrap();

        if state.shutdown.is_set() {
            return;
        }
        if !wait_result.timed_out() {
            // Woken early but not for shutdown: treat as spurious and
            // re-enter the wait with a fresh budget.
            continue;
        }

        emit_minute(state, &mut guard);
    }
}

fn emit_minute(state: &AppState, symbols: &mut [SymbolState]) {
    let mut outputs = state.outputs.lock().unwrap();
    let mut gap_row = vec![0i64; symbols.len()];
    let mut starved = false;

    for (i, sym) in symbols.iter_mut().enumerate() {
        if sym.trade_count == 0 {
            starved = true;
            state.metrics.record_starvation();
            let _ = outputs.write_candlestick(i, None);
            let _ = outputs.write_sma_volume(i, None);
            // gap_row[i] stays 0 and the rolling windows are left
            // untouched — the cursor does not advance on a starved
            // minute (spec.md §9 Open Question).
        } else {
            sym.window_cursor += 1;
            let k = (sym.window_cursor % WINDOW_LEN as u64) as usize;
            sym.sma_window[k] = sym.price_sum / sym.trade_count as f64;
            sym.vol_window[k] = sym.candle.volume;

            // Warmup semantics: all 15 slots (including unpopulated
            // zeros) are averaged/summed, preserved for parity with the
            // original (spec.md §4.5, §9 Open Question).
            let sma_15min: f64 = sym.sma_window.iter().sum::<f64>() / WINDOW_LEN as f64;
            let vol_15min: f64 = sym.vol_window.iter().sum();

            let _ = outputs.write_candlestick(i, Some(&sym.candle));
            let _ = outputs.write_sma_volume(i, Some((sma_15min, vol_15min)));

            let now = now_us();
            if sym.prev_emit_time_us != 0 {
                gap_row[i] = now - sym.prev_emit_time_us;
            }
            sym.prev_emit_time_us = now;
        }

        sym.reset_minute();
    }

    let _ = outputs.write_gap_row(&gap_row);
    drop(outputs);

    if starved {
        ConnectionManager::force_reset(state);
    }

    info!(
        "minute tick: trades_received={} trades_enqueued={} parse_errors={} reconnects={} starvation_events={}",
        state.metrics.trades_received.load(std::sync::atomic::Ordering::Relaxed),
        state.metrics.trades_enqueued.load(std::sync::atomic::Ordering::Relaxed),
        state.metrics.parse_errors.load(std::sync::atomic::Ordering::Relaxed),
        state.metrics.ws_reconnects.load(std::sync::atomic::Ordering::Relaxed),
        state.metrics.starvation_events.load(std::sync::atomic::Ordering::Relaxed),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::{ConnectionState, Trade};
    use crate::output::Outputs;
    use std::path::PathBuf;

    fn test_state() -> Arc<AppState> {
        let dir = tempfile::tempdir().unwrap();
        let symbols = vec!["AAPL".to_string()];
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
    fn starved_minute_emits_no_data_and_closes_connection() {
        let state = test_state();
        state.set_connection_state(ConnectionState::Established);
        let mut symbols = state.aggregation.symbols.lock().unwrap();
        emit_minute(&state, &mut symbols);
        drop(symbols);
        assert_eq!(state.connection_state(), ConnectionState::Closed);
    }

    #[test]
    fn single_trade_minute_matches_worked_example() {
        let state = test_state();
        {
            let mut symbols = state.aggregation.symbols.lock().unwrap();
            symbols[0].record_trade(&Trade {
                symbol: "AAPL".into(),
                price: 190.5,
                volume: 3.0,
                event_time_ms: 1_700_000_000_000,
                ingress_time_us: 0,
            });
        }
        let mut symbols = state.aggregation.symbols.lock().unwrap();
        emit_minute(&state, &mut symbols);
        let sma = symbols[0].sma_window[1]; // cursor advances to 1 on first tick
        let vol = symbols[0].vol_window.iter().sum::<f64>();
        assert!((sma - 190.5).abs() < 1e-9);
        assert!((vol - 3.0).abs() < 1e-9);
        assert!((sma / 15.0 - 12.7).abs() < 1e-2);
    }

    #[test]
    fn starved_minute_leaves_prior_window_slot_untouched() {
        let state = test_state();
        {
            let mut symbols = state.aggregation.symbols.lock().unwrap();
            symbols[0].record_trade(&Trade {
                symbol: "AAPL".into(),
                price: 100.0,
                volume: 1.0,
                event_time_ms: 0,
                ingress_time_us: 0,
            });
        }
        {
            let mut symbols = state.aggregation.symbols.lock().unwrap();
            emit_minute(&state, &mut symbols);
        }
        let cursor_after_first = state.aggregation.symbols.lock().unwrap()[0].window_cursor;

        // Second minute: no trades at all (starved).
        {
            let mut symbols = state.aggregation.symbols.lock().unwrap();
            emit_minute(&state, &mut symbols);
        }
        let symbols = state.aggregation.symbols.lock().unwrap();
        assert_eq!(symbols[0].window_cursor, cursor_after_first);
        assert!((symbols[0].sma_window[1] - 100.0).abs() < 1e-9);
    }
}
