//! Per-item recovery boundary.
//!
//! A batch item's future is polled inside [`run_isolated`], which catches any
//! panic raised while polling and turns it into a regular value. The item's
//! slot therefore always receives a response, and a panic never reaches the
//! task it runs on or the join that waits for the batch.

use core::any::Any;
use core::future::Future;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;

/// The payload of a recovered panic.
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// Runs `work` to completion, mapping a panic to `on_panic(payload)`.
///
/// The item is considered finished after recovery: nothing is retried or
/// resumed.
pub async fn run_isolated<T, F, P>(work: F, on_panic: P) -> T
where
    F: Future<Output = T>,
    P: FnOnce(PanicPayload) -> T,
{
    // The work future is dropped as soon as it panics, so no state observed
    // mid-unwind is ever reused.
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(value) => value,
        Err(payload) => on_panic(payload),
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &PanicPayload) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
