// src/driver/loopback.rs

//! In-process loopback driver.
//!
//! Every message published through a loopback driver is handed back to the
//! same driver's receive side. It needs no external resources and serves as
//! the reference behaviour for the two execution contracts:
//!
//! - [`BlockingLoopbackDriver`]: `publish_message()` enqueues into a bounded
//!   inbox, `receive_pending_message()` pops from it. A single caller that
//!   publishes more than `capacity` messages without receiving waits until
//!   the stream is closed.
//! - [`ConcurrentLoopbackDriver`]: a pump task drains the writer handle and
//!   delivers each message to every reader registered at that time.
//!
//! Messages are passed through untouched, including their `channel`.
//! Delivery is in publish order. Nothing survives a close.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use super::fanout::Fanout;
use super::inbox::PendingInbox;
use crate::{
    // ---
    log_debug,
    log_info,
    BlockingPubSubDriver,
    ConcurrentPubSubDriver,
    Driver,
    DriverBase,
    DriverConfig,
    DriverError,
    Flag,
    Message,
    MessageReader,
    MessageWriter,
    PubSubDriver,
    Result,
};

/// Loopback driver for the blocking contract.
pub struct BlockingLoopbackDriver {
    // ---
    base: DriverBase,
    fanout: Fanout,
    inbox: PendingInbox,
    lifecycle: Mutex<()>,
}

impl BlockingLoopbackDriver {
    /// Construct a closed driver. `config.flag` is ignored.
    pub fn new(config: &DriverConfig) -> Self {
        // ---
        let base = DriverBase::new(
            config.driver_id.clone(),
            Flag::RequiresBlockingExecution,
            config,
        );
        let fanout = Fanout::new(config.driver_id.clone(), base.capacity);

        Self {
            base,
            fanout,
            inbox: PendingInbox::new(),
            lifecycle: Mutex::new(()),
        }
    }
}

#[async_trait::async_trait]
impl PubSubDriver for BlockingLoopbackDriver {
    // ---
    fn base(&self) -> &DriverBase {
        &self.base
    }

    async fn open_stream(&self) -> Result<()> {
        // ---
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_open() {
            return Ok(());
        }

        self.inbox.attach(self.fanout.register()).await;
        self.base.state().mark_open();

        log_debug!("{}: loopback stream opened (blocking)", self.driver_id());
        Ok(())
    }

    async fn close_stream(&self) -> Result<()> {
        // ---
        let _lifecycle = self.lifecycle.lock().await;
        if !self.base.state().mark_closed() {
            log_debug!("{}: close_stream on a stream that is not open", self.driver_id());
            return Ok(());
        }

        self.fanout.close();
        self.inbox.detach().await;

        log_debug!("{}: loopback stream closed (blocking)", self.driver_id());
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlockingPubSubDriver for BlockingLoopbackDriver {
    // ---
    async fn check_for_pending_message(&self) -> Result<bool> {
        let _token = self.base.access().enter("check_for_pending_message")?;
        self.inbox
            .check(self.base.state(), self.base.pending_timeout)
            .await
    }

    async fn receive_pending_message(&self) -> Result<Message> {
        let _token = self.base.access().enter("receive_pending_message")?;
        self.inbox.receive(self.base.state()).await
    }

    async fn publish_message(&self, msg: Message) -> Result<()> {
        // ---
        let _token = self.base.access().enter("publish_message")?;
        self.base.state().ensure_open()?;

        tokio::select! {
            biased;

            _ = self.base.state().closed() => Err(DriverError::StreamClosed),

            _ = self.fanout.deliver(msg) => Ok(()),
        }
    }
}

/// Running pump of an open concurrent loopback stream.
struct Pump {
    writer: mpsc::Sender<Message>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Loopback driver for the concurrent contract.
pub struct ConcurrentLoopbackDriver {
    // ---
    base: DriverBase,
    fanout: Arc<Fanout>,
    pump: Mutex<Option<Pump>>,
}

impl ConcurrentLoopbackDriver {
    /// Construct a closed driver. `config.flag` is ignored.
    pub fn new(config: &DriverConfig) -> Self {
        // ---
        let base = DriverBase::new(
            config.driver_id.clone(),
            Flag::RequiresConcurrentExecution,
            config,
        );
        let fanout = Arc::new(Fanout::new(config.driver_id.clone(), base.capacity));

        Self {
            base,
            fanout,
            pump: Mutex::new(None),
        }
    }

    /// Number of readers currently attached.
    pub fn reader_count(&self) -> usize {
        self.fanout.reader_count()
    }
}

/// Drains the writer channel into the fan-out until shutdown.
async fn run_pump(
    driver_id: String,
    mut outbound: mpsc::Receiver<Message>,
    fanout: Arc<Fanout>,
    mut shutdown: oneshot::Receiver<()>,
) {
    // ---
    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = fanout.deliver(msg) => {}
                }
            }
        }
    }
    log_debug!("{driver_id}: loopback pump stopped");
}

#[async_trait::async_trait]
impl PubSubDriver for ConcurrentLoopbackDriver {
    // ---
    fn base(&self) -> &DriverBase {
        &self.base
    }

    async fn open_stream(&self) -> Result<()> {
        // ---
        let mut pump = self.pump.lock().await;
        if pump.is_some() {
            return Ok(());
        }

        let (writer, outbound) = mpsc::channel(self.base.capacity);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_pump(
            self.driver_id().to_string(),
            outbound,
            Arc::clone(&self.fanout),
            shutdown_rx,
        ));

        *pump = Some(Pump {
            writer,
            shutdown,
            task,
        });
        self.base.state().mark_open();

        log_debug!("{}: loopback stream opened (concurrent)", self.driver_id());
        Ok(())
    }

    async fn close_stream(&self) -> Result<()> {
        // ---
        let mut pump = self.pump.lock().await;
        self.base.state().mark_closed();

        let Some(pump) = pump.take() else {
            log_debug!("{}: close_stream on a stream that is not open", self.driver_id());
            return Ok(());
        };

        let _ = pump.shutdown.send(());
        let _ = pump.task.await;
        let readers = self.fanout.close();

        log_debug!(
            "{}: loopback stream closed (concurrent), {readers} reader(s) ended",
            self.driver_id()
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConcurrentPubSubDriver for ConcurrentLoopbackDriver {
    // ---
    async fn message_writer(&self) -> Result<MessageWriter> {
        // ---
        self.base.state().ensure_open()?;

        let pump = self.pump.lock().await;
        match pump.as_ref() {
            Some(pump) => Ok(MessageWriter::new(pump.writer.clone())),
            None => Err(DriverError::StreamClosed),
        }
    }

    async fn message_reader(&self) -> Result<MessageReader> {
        // Held so a close cannot run between the check and the registration.
        let _pump = self.pump.lock().await;
        self.base.state().ensure_open()?;
        Ok(MessageReader::new(self.fanout.register()))
    }
}

/// Create a loopback driver for the contract named by `config.flag`.
///
/// The driver is returned closed; call `open_stream()` before use.
///
/// # Errors
///
/// Currently infallible.
pub async fn create_loopback_driver(config: DriverConfig) -> Result<Driver> {
    // ---
    log_info!(
        "{}: create loopback driver ({})",
        config.driver_id,
        config.flag
    );

    let driver = match config.flag {
        Flag::RequiresBlockingExecution => {
            Driver::Blocking(Arc::new(BlockingLoopbackDriver::new(&config)))
        }
        Flag::RequiresConcurrentExecution => {
            Driver::Concurrent(Arc::new(ConcurrentLoopbackDriver::new(&config)))
        }
    };

    Ok(driver)
}
