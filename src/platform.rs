//! Per-target clock and timer.
//!
//! `std::time::SystemTime::now` and `tokio::time::sleep` are unavailable on
//! `wasm32-unknown-unknown`; there the JS host supplies both.

use std::time::Duration;

/// Milliseconds since the Unix epoch.
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(target_arch = "wasm32")]
pub(crate) fn now_millis() -> u64 {
    js_sys::Date::now() as u64
}

/// Monotonic elapsed-time measurement for one attempt.
///
/// `std::time::Instant` panics on `wasm32-unknown-unknown`, where the JS
/// clock is used instead.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Stopwatch {
    #[cfg(not(target_arch = "wasm32"))]
    started: std::time::Instant,
    #[cfg(target_arch = "wasm32")]
    started_ms: u64,
}

impl Stopwatch {
    #[cfg(not(target_arch = "wasm32"))]
    pub(crate) fn start() -> Self {
        Self {
            started: std::time::Instant::now(),
        }
    }

    #[cfg(target_arch = "wasm32")]
    pub(crate) fn start() -> Self {
        Self {
            started_ms: now_millis(),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    #[cfg(target_arch = "wasm32")]
    pub(crate) fn elapsed(&self) -> Duration {
        Duration::from_millis(now_millis().saturating_sub(self.started_ms))
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) async fn sleep(delay: Duration) {
    tokio::time::sleep(delay).await;
}

/// Resolves after `delay` using the host's `setTimeout`.
///
/// Edge runtimes without a global `setTimeout` resolve immediately.
#[cfg(target_arch = "wasm32")]
pub(crate) async fn sleep(delay: Duration) {
    use wasm_bindgen::{JsCast, JsValue};

    if delay.is_zero() {
        return;
    }

    let millis = delay.as_millis().min(i32::MAX as u128) as f64;
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        let global = js_sys::global();
        let set_timeout = js_sys::Reflect::get(&global, &JsValue::from_str("setTimeout"))
            .ok()
            .and_then(|value| value.dyn_into::<js_sys::Function>().ok());
        match set_timeout {
            Some(set_timeout) => {
                if set_timeout
                    .call2(&global, &resolve, &JsValue::from_f64(millis))
                    .is_err()
                {
                    let _ = resolve.call0(&JsValue::UNDEFINED);
                }
            }
            None => {
                let _ = resolve.call0(&JsValue::UNDEFINED);
            }
        }
    });
    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use std::time::{Duration, Instant};

    use super::{now_millis, sleep, Stopwatch};

    #[test]
    fn clock_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[tokio::test]
    async fn sleep_waits_at_least_the_delay() {
        let started = Instant::now();
        sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn stopwatch_measures_sleep() {
        let stopwatch = Stopwatch::start();
        sleep(Duration::from_millis(15)).await;
        assert!(stopwatch.elapsed() >= Duration::from_millis(15));
    }
}
