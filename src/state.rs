//! Process-wide shared state: the single `AppState` context that replaces
//! the original's global arrays and flags (spec.md §9 Design Notes).

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::fifo::Fifo;
use crate::metrics::RuntimeMetrics;
use crate::model::{ConnectionState, SymbolState};
use crate::output::Outputs;

/// A monotonic boolean shutdown signal, paired with a condvar so that
/// the aggregator's 60s timed wait can be woken early (spec.md §4.6).
pub struct ShutdownFlag {
    flag: Mutex<bool>,
    cv: Condvar,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock().unwrap()
    }

    /// Sets the flag and wakes any thread waiting on it directly. Callers
    /// must separately notify the FIFO's condvars (it has its own).
    pub fn set(&self) {
        *self.flag.lock().unwrap() = true;
        self.cv.notify_all();
    }

    /// Waits up to `timeout` for shutdown to be signaled. Returns `true`
    /// if shutdown was observed (either already set or signaled during
    /// the wait), `false` on a clean timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.flag.lock().unwrap();
        if *guard {
            return true;
        }
        let (guard, _) = self.cv.wait_timeout(guard, timeout).unwrap();
        *guard
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-symbol aggregation state, guarded by a single mutex shared by the
/// consumer (folds trades in) and the aggregator (reads/emits/resets).
/// The minute-timer condvar lives alongside the same mutex so a wake and
/// a state change are observed atomically (spec.md §9 Design Notes,
/// redesigning the original's condvar-paired-with-an-unused-mutex).
pub struct Aggregation {
    pub symbols: Mutex<Vec<SymbolState>>,
    pub timer_cv: Condvar,
}

impl Aggregation {
    fn new(symbols: Vec<String>) -> Self {
        Self {
            symbols: Mutex::new(symbols.into_iter().map(SymbolState::new).collect()),
            timer_cv: Condvar::new(),
        }
    }
}

/// The single shared context owning every piece of mutable state the
/// pipeline's threads touch.
pub struct AppState {
    pub config: Config,
    pub fifo: Fifo,
    pub connection_state: Mutex<ConnectionState>,
    pub aggregation: Aggregation,
    pub shutdown: ShutdownFlag,
    pub metrics: RuntimeMetrics,
    pub outputs: Mutex<Outputs>,
}

impl AppState {
    pub fn new(config: Config, outputs: Outputs) -> Self {
        let symbols = config.symbols.clone();
        Self {
            config,
            fifo: Fifo::new(crate::fifo::CAPACITY),
            connection_state: Mutex::new(ConnectionState::Connecting),
            aggregation: Aggregation::new(symbols),
            shutdown: ShutdownFlag::new(),
            metrics: RuntimeMetrics::default(),
            outputs: Mutex::new(outputs),
        }
    }

    /// Index of `symbol` in the fixed symbol table, or `None` if it is
    /// not one of the subscribed symbols (spec.md §4.4 step 2).
    pub fn symbol_index(&self, symbol: &str) -> Option<usize> {
        self.config.symbols.iter().position(|s| s == symbol)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection_state.lock().unwrap()
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        *self.connection_state.lock().unwrap() = state;
    }

    /// Wakes every waiter that could be blocked: the FIFO's two
    /// condvars, the aggregator's minute timer, and the shutdown flag
    /// itself (spec.md §4.6).
    pub fn request_shutdown(&self) {
        self.shutdown.set();
        self.fifo.notify_shutdown();
        self.aggregation.timer_cv.notify_all();
    }
}
