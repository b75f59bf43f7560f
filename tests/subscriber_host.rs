// tests/subscriber_host.rs

mod common;

use std::sync::{Arc, Mutex};

use tokio::time::timeout;

use brokerutil::{DriverError, HandlerError, Message, SubscriberHost};

use common::{init_logging, WAIT};

#[tokio::test]
async fn failing_handler_does_not_stop_the_others() {
    // ---
    init_logging();

    let host = SubscriberHost::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut reports = Vec::new();
    for idx in 0..3usize {
        let order = Arc::clone(&order);
        reports.push(host.add_subscriber(move |msg: Message| {
            let order = Arc::clone(&order);
            async move {
                order.lock().unwrap().push(idx);
                if idx == 1 {
                    return Err(HandlerError::from(format!(
                        "rejected {:?}",
                        msg.as_str()
                    )));
                }
                Ok(())
            }
        }));
    }
    assert_eq!(host.subscriber_count(), 3);

    host.notify_on_message_receive(Message::from("x"))
        .await
        .expect("a handler failure must not fail the notification");

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);

    assert!(reports[0].recv().await.unwrap().is_ok());
    match reports[1].recv().await.unwrap() {
        Err(DriverError::Handler { subscriber, reason }) => {
            assert_eq!(subscriber, 1);
            assert!(reason.contains("rejected"), "{reason}");
        }
        other => panic!("expected handler error, got {other:?}"),
    }
    assert!(reports[2].recv().await.unwrap().is_ok());

    host.notify_on_stream_close().await.unwrap();
    for mut r in reports {
        assert!(timeout(WAIT, r.recv()).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn every_message_reaches_every_handler_in_order() {
    // ---
    init_logging();

    let host = SubscriberHost::new();
    let seen: Arc<Mutex<Vec<(usize, String)>>> = Arc::default();

    let mut reports = Vec::new();
    for idx in 0..2usize {
        let seen = Arc::clone(&seen);
        reports.push(host.add_subscriber(move |msg: Message| {
            let seen = Arc::clone(&seen);
            async move {
                let text = msg.as_str().unwrap_or_default().to_string();
                seen.lock().unwrap().push((idx, text));
                Ok(())
            }
        }));
    }

    for text in ["a", "b", "c"] {
        host.notify_on_message_receive(Message::from(text)).await.unwrap();
    }

    let seen = seen.lock().unwrap().clone();
    let expected: Vec<(usize, String)> = ["a", "b", "c"]
        .iter()
        .flat_map(|t| [(0, t.to_string()), (1, t.to_string())])
        .collect();
    assert_eq!(seen, expected);

    for r in &mut reports {
        for _ in 0..3 {
            assert!(r.try_recv().unwrap().is_ok());
        }
        assert!(r.try_recv().is_none());
    }
}

#[tokio::test]
async fn notifying_without_handlers_is_a_no_op() {
    // ---
    let host = SubscriberHost::new();

    host.notify_on_message_receive(Message::from("nobody listens"))
        .await
        .unwrap();
    host.notify_on_stream_close().await.unwrap();
    assert!(host.is_closed());
}

#[tokio::test]
async fn closing_twice_is_harmless() {
    // ---
    let host = SubscriberHost::new();
    let mut reports = host.add_subscriber(|_msg: Message| async move { Ok(()) });

    host.notify_on_stream_close().await.unwrap();
    host.notify_on_stream_close().await.unwrap();

    assert!(reports.recv().await.is_none());
    assert_eq!(reports.subscriber(), 0);
}

#[tokio::test]
async fn messages_after_close_are_refused() {
    // ---
    let host = SubscriberHost::new();
    let calls = Arc::new(Mutex::new(0usize));

    let counter = Arc::clone(&calls);
    let _reports = host.add_subscriber(move |_msg: Message| {
        let counter = Arc::clone(&counter);
        async move {
            *counter.lock().unwrap() += 1;
            Ok(())
        }
    });

    host.notify_on_stream_close().await.unwrap();

    let err = host
        .notify_on_message_receive(Message::from("late"))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::StreamClosed));
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn dropped_reports_do_not_block_dispatch() {
    // ---
    let host = SubscriberHost::new();
    drop(host.add_subscriber(|_msg: Message| async move { Ok(()) }));
    let mut kept = host.add_subscriber(|_msg: Message| async move { Ok(()) });

    for _ in 0..100 {
        host.notify_on_message_receive(Message::from("x")).await.unwrap();
    }

    let mut ok = 0;
    while let Some(report) = kept.try_recv() {
        assert!(report.is_ok());
        ok += 1;
    }
    assert_eq!(ok, 100);
}
