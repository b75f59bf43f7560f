// tests/driver_loopback.rs

mod common;

use std::sync::Arc;

use tokio::time::{sleep, timeout, Duration};

use brokerutil::{
    // ---
    BlockingLoopbackDriver,
    BlockingPubSubDriver,
    DriverConfig,
    DriverError,
    Flag,
    Message,
    PubSubDriver,
};

use common::{init_logging, loopback, WAIT};

#[tokio::test]
async fn close_before_open_is_benign() {
    // ---
    init_logging();

    for flag in [
        Flag::RequiresBlockingExecution,
        Flag::RequiresConcurrentExecution,
    ] {
        let driver = loopback("close-before-open", flag).await;

        timeout(WAIT, driver.close_stream())
            .await
            .expect("close_stream hung")
            .expect("close_stream before open failed");

        // twice, for good measure
        driver.close_stream().await.unwrap();
        assert!(!driver.is_open());
    }
}

#[tokio::test]
async fn data_operations_on_unopened_drivers_fail_with_not_open() {
    // ---
    init_logging();

    let blocking = loopback("not-open-blocking", Flag::RequiresBlockingExecution).await;
    let blocking = blocking.as_blocking().unwrap();

    assert!(matches!(
        blocking.publish_message(Message::from("x")).await,
        Err(DriverError::NotOpen)
    ));
    assert!(matches!(
        blocking.receive_pending_message().await,
        Err(DriverError::NotOpen)
    ));
    assert!(matches!(
        blocking.check_for_pending_message().await,
        Err(DriverError::NotOpen)
    ));

    let concurrent = loopback("not-open-concurrent", Flag::RequiresConcurrentExecution).await;
    let concurrent = concurrent.as_concurrent().unwrap();

    assert!(matches!(
        concurrent.message_writer().await,
        Err(DriverError::NotOpen)
    ));
    assert!(matches!(
        concurrent.message_reader().await,
        Err(DriverError::NotOpen)
    ));
}

#[tokio::test]
async fn data_operations_after_close_fail_with_stream_closed() {
    // ---
    init_logging();

    let driver = loopback("after-close", Flag::RequiresBlockingExecution).await;
    driver.open_stream().await.unwrap();
    driver.close_stream().await.unwrap();

    let blocking = driver.as_blocking().unwrap();
    assert!(matches!(
        blocking.receive_pending_message().await,
        Err(DriverError::StreamClosed)
    ));
    assert!(matches!(
        blocking.publish_message(Message::from("x")).await,
        Err(DriverError::StreamClosed)
    ));
}

#[tokio::test]
async fn blocking_loopback_round_trip() {
    // ---
    init_logging();

    let driver = loopback("round-trip", Flag::RequiresBlockingExecution).await;
    driver.open_stream().await.unwrap();
    let blocking = driver.as_blocking().unwrap();

    blocking.publish_message(Message::from("ping")).await.unwrap();

    assert!(blocking.check_for_pending_message().await.unwrap());
    let received = timeout(WAIT, blocking.receive_pending_message())
        .await
        .expect("receive hung")
        .unwrap();

    assert_eq!(received.payload.as_ref(), b"ping");
    driver.close_stream().await.unwrap();
}

#[tokio::test]
async fn blocking_loopback_preserves_publish_order() {
    // ---
    init_logging();

    let driver = BlockingLoopbackDriver::new(&DriverConfig::loopback(
        "order",
        Flag::RequiresBlockingExecution,
    ));
    driver.open_stream().await.unwrap();

    for i in 0..10 {
        driver.publish_message(Message::from(format!("m{i}"))).await.unwrap();
    }
    for i in 0..10 {
        let msg = driver.receive_pending_message().await.unwrap();
        assert_eq!(msg.as_str(), Some(format!("m{i}").as_str()));
    }
    assert!(!driver.check_for_pending_message().await.unwrap());
}

#[tokio::test]
async fn concurrent_loopback_round_trip() {
    // ---
    init_logging();

    let driver = loopback("round-trip-concurrent", Flag::RequiresConcurrentExecution).await;
    driver.open_stream().await.unwrap();
    let concurrent = driver.as_concurrent().unwrap();

    let mut reader = concurrent.message_reader().await.unwrap();
    let writer = concurrent.message_writer().await.unwrap();

    writer.send("ping").await.unwrap();

    let received = timeout(WAIT, reader.recv())
        .await
        .expect("reader hung")
        .expect("reader ended early");
    assert_eq!(received.as_str(), Some("ping"));

    driver.close_stream().await.unwrap();
    assert!(reader.recv().await.is_none(), "close must end the reader");
}

#[tokio::test]
async fn concurrent_writers_reach_every_reader() {
    // ---
    init_logging();

    let driver = loopback("many-writers", Flag::RequiresConcurrentExecution).await;
    driver.open_stream().await.unwrap();
    let concurrent = driver.as_concurrent().unwrap().clone();

    let mut first = concurrent.message_reader().await.unwrap();
    let mut second = concurrent.message_reader().await.unwrap();

    let mut tasks = Vec::new();
    for w in 0..4 {
        let writer = concurrent.message_writer().await.unwrap();
        tasks.push(tokio::spawn(async move {
            for i in 0..5 {
                writer.send(format!("w{w}-{i}")).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for reader in [&mut first, &mut second] {
        let mut seen = Vec::new();
        for _ in 0..20 {
            let msg = timeout(WAIT, reader.recv()).await.unwrap().unwrap();
            seen.push(msg.as_str().unwrap().to_string());
        }
        seen.sort();
        assert_eq!(seen.len(), 20);
        seen.dedup();
        assert_eq!(seen.len(), 20, "every message exactly once per reader");
    }

    driver.close_stream().await.unwrap();
}

#[tokio::test]
async fn close_releases_a_pending_blocking_receive() {
    // ---
    init_logging();

    let driver = loopback("close-while-pending", Flag::RequiresBlockingExecution).await;
    driver.open_stream().await.unwrap();
    let blocking = Arc::clone(driver.as_blocking().unwrap());

    let pending = tokio::spawn(async move { blocking.receive_pending_message().await });

    sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished(), "receive returned without a message");

    let closer = driver.clone();
    tokio::spawn(async move { closer.close_stream().await })
        .await
        .unwrap()
        .unwrap();

    let result = timeout(WAIT, pending)
        .await
        .expect("pending receive was not released by close")
        .unwrap();
    assert!(matches!(result, Err(DriverError::StreamClosed)));
}

#[tokio::test]
async fn close_ends_a_parked_reader() {
    // ---
    init_logging();

    let driver = loopback("close-parked-reader", Flag::RequiresConcurrentExecution).await;
    driver.open_stream().await.unwrap();
    let mut reader = driver.as_concurrent().unwrap().message_reader().await.unwrap();

    let parked = tokio::spawn(async move { reader.recv().await });
    sleep(Duration::from_millis(50)).await;

    driver.close_stream().await.unwrap();

    let ended = timeout(WAIT, parked).await.expect("reader still parked").unwrap();
    assert!(ended.is_none());
}

#[tokio::test]
async fn open_is_idempotent() {
    // ---
    init_logging();

    let driver = loopback("open-twice", Flag::RequiresConcurrentExecution).await;
    driver.open_stream().await.unwrap();
    let mut reader = driver.as_concurrent().unwrap().message_reader().await.unwrap();

    driver.open_stream().await.unwrap();

    let writer = driver.as_concurrent().unwrap().message_writer().await.unwrap();
    writer.send("still here").await.unwrap();
    let msg = timeout(WAIT, reader.recv()).await.unwrap().unwrap();
    assert_eq!(msg.as_str(), Some("still here"));
}

#[tokio::test]
async fn flags_are_a_set_of_one() {
    // ---
    let blocking = loopback("flags-b", Flag::RequiresBlockingExecution).await;
    let concurrent = loopback("flags-c", Flag::RequiresConcurrentExecution).await;

    assert_eq!(
        blocking.as_blocking().unwrap().driver_flags(),
        vec![Flag::RequiresBlockingExecution]
    );
    assert_eq!(
        concurrent.as_concurrent().unwrap().driver_flags(),
        vec![Flag::RequiresConcurrentExecution]
    );
    assert!(blocking.as_concurrent().is_none());
    assert!(concurrent.as_blocking().is_none());
}
