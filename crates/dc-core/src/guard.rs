//! Panic isolation around calls into connector code.

use crate::{Error, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

/// Await a connector future, turning a panic into an error.
pub(crate) async fn guarded<T, F>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(Error::Protocol(format!(
            "connector panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

/// Run a synchronous connector call, turning a panic into an error.
pub(crate) fn guarded_sync<T>(f: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        Error::Protocol(format!(
            "connector panicked: {}",
            panic_message(payload.as_ref())
        ))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
