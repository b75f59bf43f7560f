// src/driver/inbox.rs

//! Poll-then-receive adapter used by the blocking drivers.
//!
//! Wraps the driver's single reader with a one-message peek slot, so that
//! `check_for_pending_message()` can wait for a message and hand it to the
//! following `receive_pending_message()` without losing it.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::domain::StreamState;
use crate::{lock_ignore_poison, DriverError, Message, Result};

pub(crate) struct PendingInbox {
    rx: tokio::sync::Mutex<Option<mpsc::Receiver<Message>>>,
    peeked: Mutex<Option<Message>>,
}

impl PendingInbox {
    // ---
    pub(crate) fn new() -> Self {
        Self {
            rx: tokio::sync::Mutex::new(None),
            peeked: Mutex::new(None),
        }
    }

    pub(crate) async fn attach(&self, rx: mpsc::Receiver<Message>) {
        *self.rx.lock().await = Some(rx);
        lock_ignore_poison(&self.peeked).take();
    }

    /// Drop the reader and any peeked message.
    ///
    /// The stream must already be marked closed so a pending wait releases
    /// the reader.
    pub(crate) async fn detach(&self) {
        self.rx.lock().await.take();
        lock_ignore_poison(&self.peeked).take();
    }

    pub(crate) async fn check(&self, state: &StreamState, timeout: Duration) -> Result<bool> {
        // ---
        state.ensure_open()?;

        if lock_ignore_poison(&self.peeked).is_some() {
            return Ok(true);
        }

        let mut guard = self.rx.lock().await;
        let Some(rx) = guard.as_mut() else {
            return Err(DriverError::StreamClosed);
        };

        tokio::select! {
            biased;

            _ = state.closed() => Err(DriverError::StreamClosed),

            waited = tokio::time::timeout(timeout, rx.recv()) => match waited {
                Ok(Some(msg)) => {
                    *lock_ignore_poison(&self.peeked) = Some(msg);
                    Ok(true)
                }
                Ok(None) => Err(DriverError::StreamClosed),
                Err(_elapsed) => Ok(false),
            },
        }
    }

    pub(crate) async fn receive(&self, state: &StreamState) -> Result<Message> {
        // ---
        state.ensure_open()?;

        if let Some(msg) = lock_ignore_poison(&self.peeked).take() {
            return Ok(msg);
        }

        let mut guard = self.rx.lock().await;
        let Some(rx) = guard.as_mut() else {
            return Err(DriverError::StreamClosed);
        };

        tokio::select! {
            biased;

            _ = state.closed() => Err(DriverError::StreamClosed),

            msg = rx.recv() => msg.ok_or(DriverError::StreamClosed),
        }
    }
}
