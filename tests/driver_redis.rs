// tests/driver_redis.rs
//
// Needs a running broker: `REDIS_URL=redis://... cargo test --features
// transport_redis -- --ignored`

#![cfg(feature = "transport_redis")]

mod common;

use std::sync::Arc;

use tokio::time::timeout;

use brokerutil::{
    // ---
    subscriber,
    DriverError,
    Flag,
    HandlerError,
    Message,
    SubscriberHost,
};

use common::{init_logging, redis, WAIT};

#[tokio::test]
#[ignore = "needs a Redis broker at REDIS_URL"]
async fn blocking_redis_round_trip() {
    // ---
    init_logging();

    let driver = redis("redis-blocking", Flag::RequiresBlockingExecution).await;
    driver.open_stream().await.unwrap();
    let blocking = driver.as_blocking().unwrap();

    blocking.publish_message(Message::from("ping")).await.unwrap();

    let mut pending = false;
    for _ in 0..20 {
        if blocking.check_for_pending_message().await.unwrap() {
            pending = true;
            break;
        }
    }
    assert!(pending, "published message never came back from the broker");

    let msg = timeout(WAIT, blocking.receive_pending_message())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.as_str(), Some("ping"));
    assert!(msg.channel.is_some());

    driver.close_stream().await.unwrap();
    assert!(matches!(
        blocking.receive_pending_message().await,
        Err(DriverError::StreamClosed)
    ));
}

#[tokio::test]
#[ignore = "needs a Redis broker at REDIS_URL"]
async fn concurrent_redis_writer_is_drained_to_every_reader() {
    // ---
    init_logging();

    let driver = redis("redis-concurrent", Flag::RequiresConcurrentExecution).await;
    driver.open_stream().await.unwrap();
    let concurrent = driver.as_concurrent().unwrap();

    let mut first = concurrent.message_reader().await.unwrap();
    let mut second = concurrent.message_reader().await.unwrap();
    let writer = concurrent.message_writer().await.unwrap();

    for text in ["a", "b", "c"] {
        writer.send(text).await.unwrap();
    }

    for reader in [&mut first, &mut second] {
        for expected in ["a", "b", "c"] {
            let msg = timeout(WAIT, reader.recv()).await.unwrap().unwrap();
            assert_eq!(msg.as_str(), Some(expected));
        }
    }

    driver.close_stream().await.unwrap();
    assert!(timeout(WAIT, first.recv()).await.unwrap().is_none());
    assert!(matches!(
        writer.send("late").await,
        Err(DriverError::StreamClosed)
    ));
}

#[tokio::test]
#[ignore = "needs a Redis broker at REDIS_URL"]
async fn redis_driver_feeds_a_subscriber_host() {
    // ---
    init_logging();

    let driver = redis("redis-host", Flag::RequiresConcurrentExecution).await;
    driver.open_stream().await.unwrap();

    let host = Arc::new(SubscriberHost::new());
    let mut reports = host.add_subscriber(|msg: Message| async move {
        match msg.as_str() {
            Some("ok") => Ok(()),
            other => Err(HandlerError::from(format!("unexpected payload {other:?}"))),
        }
    });
    let task = subscriber::run(&driver, Arc::clone(&host)).await.unwrap();

    let writer = driver.as_concurrent().unwrap().message_writer().await.unwrap();
    writer.send("ok").await.unwrap();
    assert!(timeout(WAIT, reports.recv()).await.unwrap().unwrap().is_ok());

    driver.close_stream().await.unwrap();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
    assert!(host.is_closed());
}

#[tokio::test]
#[ignore = "needs a Redis broker at REDIS_URL"]
async fn redis_driver_reopens_after_close() {
    // ---
    init_logging();

    let driver = redis("redis-reopen", Flag::RequiresConcurrentExecution).await;
    driver.open_stream().await.unwrap();
    driver.close_stream().await.unwrap();
    driver.open_stream().await.unwrap();

    let concurrent = driver.as_concurrent().unwrap();
    let mut reader = concurrent.message_reader().await.unwrap();
    concurrent.message_writer().await.unwrap().send("again").await.unwrap();

    let msg = timeout(WAIT, reader.recv()).await.unwrap().unwrap();
    assert_eq!(msg.as_str(), Some("again"));

    driver.close_stream().await.unwrap();
}
