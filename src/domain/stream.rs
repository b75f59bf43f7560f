// src/domain/stream.rs

//! Stream lifecycle state shared by every driver.

use tokio::sync::watch;

use crate::{DriverError, Result};

/// Lifecycle phase of a driver's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Constructed, never opened.
    Idle,
    Open,
    /// Closed after having been open. `open_stream()` may reopen it.
    Closed,
}

/// Observable stream phase.
///
/// Backed by a `watch` channel so that operations parked on the transport can
/// race against [`closed`](StreamState::closed) and return
/// [`DriverError::StreamClosed`] instead of waiting forever.
#[derive(Debug)]
pub struct StreamState {
    tx: watch::Sender<StreamPhase>,
}

impl StreamState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StreamPhase::Idle);
        Self { tx }
    }

    pub fn phase(&self) -> StreamPhase {
        *self.tx.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.phase() == StreamPhase::Open
    }

    /// Fails unless the stream is open.
    ///
    /// A never-opened stream yields `NotOpen`, an explicitly closed one
    /// yields `StreamClosed`.
    pub fn ensure_open(&self) -> Result<()> {
        match self.phase() {
            StreamPhase::Open => Ok(()),
            StreamPhase::Idle => Err(DriverError::NotOpen),
            StreamPhase::Closed => Err(DriverError::StreamClosed),
        }
    }

    /// Transition to `Open`. Returns false if it already was.
    pub fn mark_open(&self) -> bool {
        self.tx.send_if_modified(|phase| {
            if *phase == StreamPhase::Open {
                false
            } else {
                *phase = StreamPhase::Open;
                true
            }
        })
    }

    /// Transition `Open → Closed`. Returns false if the stream was not open.
    pub fn mark_closed(&self) -> bool {
        self.tx.send_if_modified(|phase| {
            if *phase == StreamPhase::Open {
                *phase = StreamPhase::Closed;
                true
            } else {
                false
            }
        })
    }

    /// Resolves once the stream is no longer open.
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            let phase = *rx.borrow_and_update();
            if phase != StreamPhase::Open {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_stream_is_not_open() {
        let state = StreamState::new();
        assert!(matches!(state.ensure_open(), Err(DriverError::NotOpen)));
        assert!(!state.mark_closed(), "closing an idle stream is a no-op");
        assert_eq!(state.phase(), StreamPhase::Idle);
    }

    #[test]
    fn open_is_idempotent_and_close_reports_stream_closed() {
        let state = StreamState::new();
        assert!(state.mark_open());
        assert!(!state.mark_open());
        assert!(state.ensure_open().is_ok());

        assert!(state.mark_closed());
        assert!(!state.mark_closed());
        assert!(matches!(state.ensure_open(), Err(DriverError::StreamClosed)));

        assert!(state.mark_open(), "a closed stream can be reopened");
    }

    #[tokio::test]
    async fn closed_wakes_a_pending_waiter() {
        let state = std::sync::Arc::new(StreamState::new());
        state.mark_open();

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.closed().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        state.mark_closed();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not released by close")
            .unwrap();
    }
}
