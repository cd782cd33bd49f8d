//! Small time helpers shared across the pipeline.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in microseconds since the Unix epoch.
///
/// Used for `ingress_time_us` (stamped by the producer at enqueue) and
/// for every delay/gap measurement in §4.4/§4.5.
pub fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before UNIX_EPOCH")
        .as_micros() as i64
}
