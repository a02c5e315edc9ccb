use std::thread;
use std::time::Duration;

/// Sleep for `secs` seconds. Negative or NaN durations return immediately.
pub fn sleep_secs(secs: f64) {
    if secs.is_finite() && secs > 0.0 {
        thread::sleep(Duration::from_secs_f64(secs));
    }
}

/// Sleep for exact milliseconds.
pub fn sleep_ms(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}
