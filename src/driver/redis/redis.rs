//! Redis pub/sub driver implementation using `redis`.
//!
//! ## Concurrency model
//!
//! - A single background **actor task** owns both Redis connections while
//!   the stream is open.
//! - The actor is responsible for:
//!   - publishing outbound messages via `publish_conn`,
//!   - polling `pubsub_stream` for incoming messages on the driver's channel,
//!   - draining the writer handle (concurrent variant only),
//!   - unsubscribing on close.
//! - All interaction with the Redis client is serialized through this actor;
//!   no other task ever touches the connections directly.
//!
//! ## Two connections required
//!
//! A connection in pub/sub mode cannot issue `PUBLISH`, so two async
//! connections are opened eagerly by `open_stream()`:
//!
//! - `publish_conn`: `MultiplexedConnection`, used only for `PUBLISH`
//! - `pubsub_sink` / `pubsub_stream`: split from `aio::PubSub`; the sink
//!   subscribes once on open, the stream yields incoming messages
//!
//! ## Delivery semantics
//!
//! - Incoming messages are offered to every reader without waiting. A reader
//!   whose queue is full misses that message (logged); a slow consumer never
//!   stalls the actor.
//! - Redis pub/sub is best-effort and non-durable: messages published while
//!   no stream is open are lost.
//! - Losing the pub/sub connection stops the actor and ends every reader.
//!   Further data calls fail with `DriverError::Connection` until the stream
//!   is reopened. There is no automatic reconnect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use redis::aio::{MultiplexedConnection, PubSubSink, PubSubStream};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::driver::fanout::Fanout;
use crate::driver::inbox::PendingInbox;
use crate::{
    //
    log_debug,
    log_error,
    log_info,
    log_trace,
    log_warn,
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

//
// Actor commands
//

enum Cmd {
    //
    Publish {
        msg: Message,
        resp: oneshot::Sender<Result<()>>,
    },
    Close {
        resp: oneshot::Sender<()>,
    },
}

enum ActorStep {
    //
    Continue,
    Stop,
}

impl Cmd {
    // ---

    /// Dispatches an actor command to the correct handler on the actor.
    async fn handle(self, actor: &mut RedisActor) -> ActorStep {
        // ---

        match self {
            Cmd::Publish { msg, resp } => {
                let result = actor.handle_publish(msg).await;
                let _ = resp.send(result);
                ActorStep::Continue
            }
            Cmd::Close { resp } => {
                actor.handle_close().await;
                let _ = resp.send(());
                ActorStep::Stop
            }
        }
    }
}

/// Connection health shared between a driver and its actor.
#[derive(Default)]
struct LinkHealth {
    lost: AtomicBool,
    publish_failures: AtomicU64,
}

struct RedisActor {
    // ---
    driver_id: String, // for logging only
    channel: String,
    publish_conn: MultiplexedConnection,
    pubsub_sink: PubSubSink,
    pubsub_stream: PubSubStream,
    cmd_rx: mpsc::Receiver<Cmd>,
    outbound: Option<mpsc::Receiver<Message>>,
    fanout: Arc<Fanout>,
    health: Arc<LinkHealth>,
}

/// Next message from the writer handle; never resolves without one.
async fn next_outbound(outbound: &mut Option<mpsc::Receiver<Message>>) -> Option<Message> {
    match outbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl RedisActor {
    // ---

    async fn run(mut self) {
        // ---

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if matches!(cmd.handle(&mut self).await, ActorStep::Stop) {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                Some(msg) = next_outbound(&mut self.outbound) => {
                    if self.handle_publish(msg).await.is_err() {
                        self.health.publish_failures.fetch_add(1, Ordering::Relaxed);
                    }
                }

                incoming = self.pubsub_stream.next() => {
                    match incoming {
                        Some(msg) => self.handle_incoming(msg),
                        None => {
                            log_error!("{}: pubsub stream ended, connection lost", self.driver_id);
                            self.health.lost.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                }
            }
        }

        let readers = self.fanout.close();
        log_debug!("{}: actor stopped, {readers} reader(s) ended", self.driver_id);
    }

    /// Publishes a message on the dedicated multiplexed connection.
    ///
    /// Messages without a channel go to the driver's configured channel.
    async fn handle_publish(&mut self, msg: Message) -> Result<()> {
        // ---

        let channel = match msg.channel.as_deref() {
            Some(channel) => channel.to_string(),
            None => self.channel.clone(),
        };

        redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(msg.payload.as_ref())
            .query_async::<i64>(&mut self.publish_conn)
            .await
            .map(|_receivers| ())
            .map_err(|err| {
                let msg = format!("{}: publish failed for channel {channel}: {err}", self.driver_id);
                log_error!("{msg}");
                DriverError::Transport(msg)
            })
    }

    /// Unsubscribes before the connections are dropped.
    async fn handle_close(&mut self) {
        // ---

        log_debug!("{}: disconnecting redis client", self.driver_id);
        if let Err(_err) = self.pubsub_sink.unsubscribe(&self.channel).await {
            log_warn!("{}: unsubscribe from {} failed: {_err}", self.driver_id, self.channel);
        }
    }

    /// Converts an incoming Redis message and offers it to every reader.
    fn handle_incoming(&self, msg: redis::Msg) {
        // ---

        let channel = msg.get_channel_name().to_string();
        let message =
            Message::new(Bytes::copy_from_slice(msg.get_payload_bytes())).with_channel(channel);

        let _delivered = self.fanout.offer(message);
        log_trace!("{}: incoming message offered to {_delivered} reader(s)", self.driver_id);
    }
} // RedisActor

/// Handle to a running actor.
struct RedisLink {
    cmd_tx: mpsc::Sender<Cmd>,
    writer: Option<mpsc::Sender<Message>>,
    task: JoinHandle<()>,
}

enum OpenOutcome {
    AlreadyOpen,
    Opened { inbox: Option<mpsc::Receiver<Message>> },
}

/// State shared by both Redis driver variants.
struct RedisCore {
    // ---
    base: DriverBase,
    uri: String,
    channel: String,
    fanout: Arc<Fanout>,
    health: Arc<LinkHealth>,
    link: Mutex<Option<RedisLink>>,
}

impl RedisCore {
    // ---

    fn new(config: &DriverConfig, flag: Flag) -> Self {
        // ---
        let base = DriverBase::new(config.driver_id.clone(), flag, config);
        let fanout = Arc::new(Fanout::new(config.driver_id.clone(), base.capacity));

        Self {
            base,
            uri: config.uri.clone(),
            channel: config.channel.clone(),
            fanout,
            health: Arc::new(LinkHealth::default()),
            link: Mutex::new(None),
        }
    }

    fn is_lost(&self) -> bool {
        self.health.lost.load(Ordering::SeqCst)
    }

    fn lost_error(&self) -> DriverError {
        DriverError::Connection(format!("{}: redis connection lost", self.base.driver_id))
    }

    /// Fails unless the stream is open and its connection alive.
    fn ensure_live(&self) -> Result<()> {
        self.base.state().ensure_open()?;
        if self.is_lost() {
            return Err(self.lost_error());
        }
        Ok(())
    }

    /// Turns a stream end caused by connection loss into a connection error.
    fn explain(&self, err: DriverError) -> DriverError {
        match err {
            DriverError::StreamClosed if self.is_lost() && self.base.state().is_open() => {
                self.lost_error()
            }
            other => other,
        }
    }

    /// Connects both connections and starts the actor.
    ///
    /// A link whose connection was lost is torn down and replaced.
    async fn open(&self, with_writer: bool, with_inbox: bool) -> Result<OpenOutcome> {
        // ---

        let mut link = self.link.lock().await;

        if link.is_some() {
            if !self.is_lost() {
                return Ok(OpenOutcome::AlreadyOpen);
            }
            if let Some(stale) = link.take() {
                let _ = stale.task.await;
            }
            log_info!("{}: reconnecting after connection loss", self.base.driver_id);
        }

        let (publish_conn, mut pubsub_sink, pubsub_stream) =
            connect(&self.base.driver_id, &self.uri).await?;

        pubsub_sink.subscribe(&self.channel).await.map_err(|err| {
            let msg = format!(
                "{}: failed to subscribe to channel {}: {err}",
                self.base.driver_id, self.channel
            );
            log_error!("{msg}");
            DriverError::Connection(msg)
        })?;
        log_info!("{}: subscribed to channel {}", self.base.driver_id, self.channel);

        let inbox = with_inbox.then(|| self.fanout.register());

        let (writer, outbound) = if with_writer {
            let (tx, rx) = mpsc::channel(self.base.capacity);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(self.base.capacity);
        self.health.lost.store(false, Ordering::SeqCst);

        let actor = RedisActor {
            driver_id: self.base.driver_id.clone(),
            channel: self.channel.clone(),
            publish_conn,
            pubsub_sink,
            pubsub_stream,
            cmd_rx,
            outbound,
            fanout: Arc::clone(&self.fanout),
            health: Arc::clone(&self.health),
        };

        let task = tokio::spawn(actor.run());
        *link = Some(RedisLink {
            cmd_tx,
            writer,
            task,
        });

        Ok(OpenOutcome::Opened { inbox })
    }

    /// Stops the actor. Returns false if no link was running.
    async fn close(&self) -> bool {
        // ---

        let Some(link) = self.link.lock().await.take() else {
            return false;
        };

        let (tx, rx) = oneshot::channel();
        if link.cmd_tx.send(Cmd::Close { resp: tx }).await.is_ok() {
            let _ = rx.await;
        }
        let _ = link.task.await;
        self.fanout.close();
        true
    }

    async fn publish(&self, msg: Message) -> Result<()> {
        // ---

        self.ensure_live()?;

        let cmd_tx = match self.link.lock().await.as_ref() {
            Some(link) => link.cmd_tx.clone(),
            None => return Err(DriverError::StreamClosed),
        };

        let (tx, rx) = oneshot::channel();
        cmd_tx
            .send(Cmd::Publish { msg, resp: tx })
            .await
            .map_err(|_| self.explain(DriverError::StreamClosed))?;

        rx.await
            .map_err(|_| self.explain(DriverError::StreamClosed))?
    }
}

/// Opens the publish connection and the pub/sub connection.
async fn connect(
    driver_id: &str,
    uri: &str,
) -> Result<(MultiplexedConnection, PubSubSink, PubSubStream)> {
    // ---

    let client = redis::Client::open(uri).map_err(|err| {
        let msg = format!("{driver_id}: failed to open client for URI {uri}: {err}");
        log_error!("{msg}");
        DriverError::Connection(msg)
    })?;

    let publish_conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|err| {
            let msg = format!("{driver_id}: failed to connect publish connection to {uri}: {err}");
            log_error!("{msg}");
            DriverError::Connection(msg)
        })?;

    let (pubsub_sink, pubsub_stream) = client
        .get_async_pubsub()
        .await
        .map_err(|err| {
            let msg = format!("{driver_id}: failed to connect pubsub connection to {uri}: {err}");
            log_error!("{msg}");
            DriverError::Connection(msg)
        })?
        .split();

    log_info!("{driver_id}: connected to Redis broker at {uri}");
    Ok((publish_conn, pubsub_sink, pubsub_stream))
}

/// Redis driver for the blocking contract.
///
/// Incoming messages are buffered in an inbox of `capacity` messages; when
/// the caller does not receive fast enough, newer messages are dropped.
pub struct BlockingRedisDriver {
    core: RedisCore,
    inbox: PendingInbox,
}

impl BlockingRedisDriver {
    /// Construct a closed driver. No connection is made until `open_stream()`.
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            core: RedisCore::new(config, Flag::RequiresBlockingExecution),
            inbox: PendingInbox::new(),
        }
    }
}

#[async_trait::async_trait]
impl PubSubDriver for BlockingRedisDriver {
    // ---
    fn base(&self) -> &DriverBase {
        &self.core.base
    }

    async fn open_stream(&self) -> Result<()> {
        // ---
        match self.core.open(false, true).await? {
            OpenOutcome::AlreadyOpen => Ok(()),
            OpenOutcome::Opened { inbox } => {
                if let Some(rx) = inbox {
                    self.inbox.attach(rx).await;
                }
                self.core.base.state().mark_open();
                Ok(())
            }
        }
    }

    async fn close_stream(&self) -> Result<()> {
        // ---
        self.core.base.state().mark_closed();
        if self.core.close().await {
            self.inbox.detach().await;
            log_info!("{}: redis stream closed", self.driver_id());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlockingPubSubDriver for BlockingRedisDriver {
    // ---
    async fn check_for_pending_message(&self) -> Result<bool> {
        let _token = self.core.base.access().enter("check_for_pending_message")?;
        self.inbox
            .check(self.core.base.state(), self.core.base.pending_timeout)
            .await
            .map_err(|err| self.core.explain(err))
    }

    async fn receive_pending_message(&self) -> Result<Message> {
        let _token = self.core.base.access().enter("receive_pending_message")?;
        self.inbox
            .receive(self.core.base.state())
            .await
            .map_err(|err| self.core.explain(err))
    }

    async fn publish_message(&self, msg: Message) -> Result<()> {
        // ---
        let _token = self.core.base.access().enter("publish_message")?;
        self.core.ensure_live()?;

        tokio::select! {
            biased;

            _ = self.core.base.state().closed() => Err(DriverError::StreamClosed),

            result = self.core.publish(msg) => result,
        }
    }
}

/// Redis driver for the concurrent contract.
///
/// Messages written to a [`MessageWriter`] are published by the actor; a
/// failed publish is logged and counted in
/// [`publish_failures`](Self::publish_failures), never reported to the writer.
pub struct ConcurrentRedisDriver {
    core: RedisCore,
}

impl ConcurrentRedisDriver {
    /// Construct a closed driver. No connection is made until `open_stream()`.
    pub fn new(config: &DriverConfig) -> Self {
        Self {
            core: RedisCore::new(config, Flag::RequiresConcurrentExecution),
        }
    }

    /// Number of writer-handle publishes that failed since construction.
    pub fn publish_failures(&self) -> u64 {
        self.core.health.publish_failures.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl PubSubDriver for ConcurrentRedisDriver {
    // ---
    fn base(&self) -> &DriverBase {
        &self.core.base
    }

    async fn open_stream(&self) -> Result<()> {
        // ---
        if let OpenOutcome::Opened { .. } = self.core.open(true, false).await? {
            self.core.base.state().mark_open();
        }
        Ok(())
    }

    async fn close_stream(&self) -> Result<()> {
        // ---
        self.core.base.state().mark_closed();
        if self.core.close().await {
            log_info!("{}: redis stream closed", self.driver_id());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConcurrentPubSubDriver for ConcurrentRedisDriver {
    // ---
    async fn message_writer(&self) -> Result<MessageWriter> {
        // ---
        self.core.ensure_live()?;

        let link = self.core.link.lock().await;
        match link.as_ref().and_then(|link| link.writer.clone()) {
            Some(writer) => Ok(MessageWriter::new(writer)),
            None => Err(DriverError::StreamClosed),
        }
    }

    async fn message_reader(&self) -> Result<MessageReader> {
        self.core.ensure_live()?;
        Ok(MessageReader::new(self.core.fanout.register()))
    }
}

/// Creates a Redis driver for the contract named by `config.flag`.
///
/// The driver is returned closed; connections are made by `open_stream()`.
///
/// # Errors
///
/// Returns `MissingConfig` if the URI is empty.
pub async fn create_redis_driver(config: DriverConfig) -> Result<Driver> {
    // ---

    if config.uri.is_empty() {
        return Err(DriverError::MissingConfig(
            "uri (redis driver requires a broker URI)".into(),
        ));
    }

    log_info!(
        "{}: create redis driver for {} ({})",
        config.driver_id,
        config.uri,
        config.flag
    );

    let driver = match config.flag {
        Flag::RequiresBlockingExecution => {
            Driver::Blocking(Arc::new(BlockingRedisDriver::new(&config)))
        }
        Flag::RequiresConcurrentExecution => {
            Driver::Concurrent(Arc::new(ConcurrentRedisDriver::new(&config)))
        }
    };

    Ok(driver)
}
