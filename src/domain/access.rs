// src/domain/access.rs

//! Caller-exclusivity for blocking drivers.

use tokio::sync::{Mutex, MutexGuard};

use crate::{log_warn, DriverError, Result};

/// How a blocking driver treats overlapping callers.
///
/// Drivers advertising
/// [`RequiresBlockingExecution`](crate::Flag::RequiresBlockingExecution)
/// must only ever be driven by one caller at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockingAccess {
    /// Nothing is checked. Overlapping `publish_message` /
    /// `receive_pending_message` / `check_for_pending_message` calls are
    /// undefined behaviour of the driver contract and are the caller's bug.
    #[default]
    Permissive,

    /// Each data operation holds an ownership token for its duration. A call
    /// that overlaps another fails immediately with [`DriverError::Busy`]; it
    /// is never queued behind the first one.
    Exclusive,
}

/// Ownership token handed out by [`AccessGate::enter`].
pub(crate) struct AccessToken<'a> {
    _guard: Option<MutexGuard<'a, ()>>,
}

#[derive(Debug)]
pub(crate) struct AccessGate {
    mode: BlockingAccess,
    lock: Mutex<()>,
}

impl AccessGate {
    pub(crate) fn new(mode: BlockingAccess) -> Self {
        Self {
            mode,
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn mode(&self) -> BlockingAccess {
        self.mode
    }

    pub(crate) fn enter(&self, op: &'static str) -> Result<AccessToken<'_>> {
        match self.mode {
            BlockingAccess::Permissive => Ok(AccessToken { _guard: None }),
            BlockingAccess::Exclusive => match self.lock.try_lock() {
                Ok(guard) => Ok(AccessToken {
                    _guard: Some(guard),
                }),
                Err(_) => {
                    log_warn!("{op}: rejected overlapping call on exclusive blocking driver");
                    Err(DriverError::Busy(op))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_gate_rejects_overlap_until_released() {
        let gate = AccessGate::new(BlockingAccess::Exclusive);

        let token = gate.enter("receive_pending_message").unwrap();
        assert!(matches!(
            gate.enter("publish_message"),
            Err(DriverError::Busy("publish_message"))
        ));

        drop(token);
        assert!(gate.enter("publish_message").is_ok());
    }

    #[test]
    fn permissive_gate_never_rejects() {
        let gate = AccessGate::new(BlockingAccess::Permissive);
        let _a = gate.enter("receive_pending_message").unwrap();
        let _b = gate.enter("publish_message").unwrap();
    }
}
