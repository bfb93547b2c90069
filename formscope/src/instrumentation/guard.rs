//! Containment for interception bodies.
//!
//! Whatever happens inside a hook body stays there: host errors and panics
//! are turned into `None`, and logged only when debug logging is enabled.

use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

use log::warn;

use crate::domain::CaptureError;

/// Run `body`, returning its value, or `None` if it failed or panicked.
pub(crate) fn run_guarded<T>(
    site: impl Display,
    debug: bool,
    body: impl FnOnce() -> Result<T, CaptureError>,
) -> Option<T> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(body))
        .unwrap_or_else(|payload| Err(CaptureError::Panicked(panic_message(payload.as_ref()))));

    match outcome {
        Ok(value) => Some(value),
        Err(e) => {
            if debug {
                warn!("{site} interception failed: {e}");
            }
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
