// src/driver/fanout.rs

//! Reader registry shared by the drivers.
//!
//! Every registered reader gets its own bounded queue and sees every message
//! delivered after it registered, in delivery order. Readers whose receiving
//! half was dropped are evicted on the next delivery.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::{lock_ignore_poison, log_trace, log_warn, Message};

pub(crate) struct Fanout {
    // ---
    driver_id: String, // for logging only
    capacity: usize,
    readers: Mutex<Vec<mpsc::Sender<Message>>>,
}

impl Fanout {
    // ---
    pub(crate) fn new(driver_id: impl Into<String>, capacity: usize) -> Self {
        Self {
            driver_id: driver_id.into(),
            capacity: capacity.max(1),
            readers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new reader.
    pub(crate) fn register(&self) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut readers = lock_ignore_poison(&self.readers);
        readers.push(tx);
        log_trace!("{}: reader registered ({} total)", self.driver_id, readers.len());
        rx
    }

    pub(crate) fn reader_count(&self) -> usize {
        lock_ignore_poison(&self.readers).len()
    }

    /// Deliver to every reader, waiting on readers whose queue is full.
    ///
    /// Returns the number of readers that accepted the message. Callers that
    /// must stay cancellable race this future against the stream's close.
    pub(crate) async fn deliver(&self, msg: Message) -> usize {
        // ---
        let senders = lock_ignore_poison(&self.readers).clone();

        let mut delivered = 0;
        let mut evict = false;

        for tx in &senders {
            match tx.send(msg.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => evict = true,
            }
        }

        if evict {
            self.evict_closed();
        }
        delivered
    }

    /// Deliver without waiting.
    ///
    /// A reader whose queue is full misses this message; the other readers
    /// are unaffected.
    pub(crate) fn offer(&self, msg: Message) -> usize {
        // ---
        let mut readers = lock_ignore_poison(&self.readers);
        let mut delivered = 0;

        readers.retain(|tx| match tx.try_send(msg.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                log_warn!("{}: reader queue full, message dropped for it", self.driver_id);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        delivered
    }

    /// Drop every reader. Their handles drain what is queued, then end.
    pub(crate) fn close(&self) -> usize {
        let mut readers = lock_ignore_poison(&self.readers);
        let count = readers.len();
        readers.clear();
        count
    }

    fn evict_closed(&self) {
        lock_ignore_poison(&self.readers).retain(|tx| !tx.is_closed());
    }
}
