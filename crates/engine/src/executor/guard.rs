//! Calls into work-unit code with panics contained.
//!
//! A panic inside a guarded call becomes [`UnitError::Panicked`] instead of
//! unwinding into the scheduler. The process panic hook stays quiet for those
//! panics: the payload is reported through the run report and the location
//! is logged at debug level. Panics outside a guarded call still reach the
//! previously installed hook.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    panic::{self, AssertUnwindSafe},
    sync::Once,
};

use thiserror::Error;
use tracing::debug;

static INSTALL_HOOK: Once = Once::new();

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static PANIC_LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Failure of a guarded work-unit call.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("{0:#}")]
    Failed(anyhow::Error),

    #[error("panicked: {message}")]
    Panicked { message: String, location: Option<String> },
}

fn install_quiet_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) > 0 {
                let location = info.location().map(ToString::to_string);
                PANIC_LOCATION.with(|slot| *slot.borrow_mut() = location);
            } else {
                previous(info);
            }
        }));
    });
}

/// Runs `call`, turning both its error and any panic into a [`UnitError`].
pub fn guarded<T>(call: impl FnOnce() -> anyhow::Result<T>) -> Result<T, UnitError> {
    install_quiet_hook();
    GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(call));
    GUARD_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));

    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(UnitError::Failed(error)),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let location = PANIC_LOCATION.with(|slot| slot.borrow_mut().take());
            debug!(message = %message, location = ?location, "work unit panicked");
            Err(UnitError::Panicked { message, location })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;

    use super::*;

    #[test]
    fn errors_keep_their_chain() {
        let error = guarded(|| -> anyhow::Result<()> {
            let inner: anyhow::Result<()> = Err(anyhow::anyhow!("disk full"));
            anyhow::Context::context(inner, "could not write output")
        })
        .unwrap_err();
        assert_eq!(error.to_string(), "could not write output: disk full");
    }

    #[test]
    fn panics_are_contained_and_located_by_the_quiet_hook() {
        let error = guarded(|| -> anyhow::Result<()> { panic!("requires blew up") }).unwrap_err();
        match error {
            UnitError::Panicked { message, location } => {
                assert_eq!(message, "requires blew up");
                assert!(location.is_some_and(|location| location.contains("guard.rs")));
            }
            other => panic!("expected a panic, got {other}"),
        }
    }

    #[test]
    fn formatted_panics_keep_their_message() {
        let error = guarded(|| -> anyhow::Result<()> { panic!("step {} failed", 3) }).unwrap_err();
        assert_eq!(error.to_string(), "panicked: step 3 failed");
    }

    #[test]
    fn values_pass_through() {
        assert_eq!(guarded(|| Ok(7)).unwrap(), 7);
        assert!(matches!(guarded(|| -> anyhow::Result<()> { bail!("no") }), Err(UnitError::Failed(_))));
    }
}
