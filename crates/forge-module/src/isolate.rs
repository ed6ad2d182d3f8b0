//! Shared panic-to-error conversion used by both the module runtime and the
//! logic-unit manager, so a panicking callback is never any different from
//! one that returns `Err`.

use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run `f`, converting a panic into an `anyhow::Error` instead of letting it
/// unwind through whatever lock the caller is holding.
pub(crate) fn run_isolated(f: impl FnOnce() -> Result<(), anyhow::Error>) -> Result<(), anyhow::Error> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "callback panicked".to_owned());
            Err(anyhow::anyhow!(message))
        }
    }
}
