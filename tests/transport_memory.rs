// tests/transport_memory.rs

use bytes::Bytes;
use tokio::time::{timeout, Duration};

use mq_service::{
    // ---
    connect_session,
    AckMode,
    CorrelationId,
    MemoryBroker,
    Properties,
    QueueOptions,
    RpcError,
    CONTENT_TYPE_JSON,
};

#[tokio::test]
async fn memory_publish_then_consume_delivers_in_order() {
    // ---
    // Arrange
    // ---
    let session = connect_session("memory://tm-order", "tm")
        .await
        .expect("failed to open memory session");

    let queue = session
        .declare_queue("svc.order", QueueOptions::service())
        .await
        .expect("declare failed");

    let id = CorrelationId::generate();

    // ---
    // Act
    // ---
    for body in [&b"one"[..], b"two", b"three"] {
        let props = Properties::request(CONTENT_TYPE_JSON, id.as_str(), "amq.gen-x");
        session
            .publish(queue.name(), props, Bytes::copy_from_slice(body))
            .await
            .expect("publish failed");
    }

    let mut consumer = session
        .consume(&queue, AckMode::Auto)
        .await
        .expect("consume failed");

    // ---
    // Assert
    // ---
    for expected in [&b"one"[..], b"two", b"three"] {
        let received = timeout(Duration::from_millis(100), consumer.next())
            .await
            .expect("timed out waiting for message")
            .expect("consumer ended unexpectedly");

        assert_eq!(received.body().as_ref(), expected);
        assert_eq!(received.correlation_id(), id.as_str());
        assert_eq!(received.reply_to(), "amq.gen-x");
    }
}

#[tokio::test]
async fn repeated_manual_ack_is_refused_but_recorded() {
    // ---
    let broker = MemoryBroker::new();
    let session = broker.connect().await.unwrap();
    let queue = session
        .declare_queue("svc.ack", QueueOptions::service())
        .await
        .unwrap();
    let mut consumer = session.consume(&queue, AckMode::Manual).await.unwrap();

    session
        .publish("svc.ack", Properties::default(), Bytes::from_static(b"x"))
        .await
        .unwrap();

    let delivery = consumer.next().await.unwrap();
    assert!(!delivery.is_acked());

    delivery.ack().await.unwrap();
    let again = delivery.ack().await;

    assert!(matches!(again, Err(RpcError::AlreadyAcknowledged(_))));
    assert!(delivery.is_acked());
    // One real ack plus one refused repeat.
    assert_eq!(broker.ack_count(delivery.delivery_tag()), 2);
}

#[tokio::test]
async fn second_consumer_is_rejected() {
    // ---
    let broker = MemoryBroker::new();
    let session = broker.connect().await.unwrap();
    let queue = session
        .declare_queue("svc.single", QueueOptions::service())
        .await
        .unwrap();

    let _first = session.consume(&queue, AckMode::Manual).await.unwrap();
    let second = session.consume(&queue, AckMode::Manual).await;

    assert!(matches!(second, Err(RpcError::Transport(_))));
}

#[tokio::test]
async fn exclusive_queue_is_private_and_dropped_on_close() {
    // ---
    let broker = MemoryBroker::new();
    let owner = broker.connect().await.unwrap();
    let other = broker.connect().await.unwrap();

    let reply = owner.declare_queue("", QueueOptions::reply()).await.unwrap();
    let service = owner
        .declare_queue("svc.kept", QueueOptions::service())
        .await
        .unwrap();

    let locked = other.consume(&reply, AckMode::Auto).await;
    assert!(matches!(locked, Err(RpcError::Transport(_))));

    let redeclare = other.declare_queue(reply.name(), QueueOptions::reply()).await;
    assert!(matches!(redeclare, Err(RpcError::Transport(_))));

    owner.close().await.unwrap();

    assert!(!broker.has_queue(reply.name()));
    assert!(broker.has_queue(service.name()));
}

#[tokio::test]
async fn closed_session_refuses_work_and_ends_consumers() {
    // ---
    let broker = MemoryBroker::new();
    let session = broker.connect().await.unwrap();
    let queue = session
        .declare_queue("svc.closing", QueueOptions::service())
        .await
        .unwrap();
    let mut consumer = session.consume(&queue, AckMode::Auto).await.unwrap();

    session.close().await.unwrap();
    session.close().await.expect("close is idempotent");

    let ended = timeout(Duration::from_millis(100), consumer.next())
        .await
        .expect("consumer did not end");
    assert!(ended.is_none());

    let publish = session
        .publish("svc.closing", Properties::default(), Bytes::new())
        .await;
    assert!(matches!(publish, Err(RpcError::Transport(_))));
}

#[tokio::test]
async fn injected_publish_failure() {
    // ---
    let broker = MemoryBroker::new();
    let session = broker.connect().await.unwrap();

    broker.fail_publishes(true);
    let failed = session
        .publish("anything", Properties::default(), Bytes::new())
        .await;
    assert!(matches!(failed, Err(RpcError::Transport(_))));

    broker.fail_publishes(false);
    session
        .publish("anything", Properties::default(), Bytes::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn service_queue_survives_consumer_restart() {
    // ---
    // Arrange
    // ---
    let broker = MemoryBroker::named("tm-restart");
    let first = connect_session("memory://tm-restart", "svc-1").await.unwrap();
    let queue = first
        .declare_queue("svc.restart", QueueOptions::service())
        .await
        .unwrap();
    let _old = first.consume(&queue, AckMode::Manual).await.unwrap();

    // ---
    // Act
    // ---
    first.close().await.unwrap();

    let caller = connect_session("memory://tm-restart", "caller").await.unwrap();
    caller
        .publish(
            "svc.restart",
            Properties::request(CONTENT_TYPE_JSON, "r1", "amq.gen-x"),
            Bytes::from_static(b"queued"),
        )
        .await
        .unwrap();

    let second = connect_session("memory://tm-restart", "svc-2").await.unwrap();
    let queue = second
        .declare_queue("svc.restart", QueueOptions::service())
        .await
        .unwrap();
    let mut consumer = second
        .consume(&queue, AckMode::Manual)
        .await
        .expect("queue free again after the first session closed");

    // ---
    // Assert
    // ---
    assert!(broker.has_queue("svc.restart"));

    let received = timeout(Duration::from_millis(500), consumer.next())
        .await
        .expect("timed out waiting for queued message")
        .expect("consumer ended unexpectedly");
    assert_eq!(received.correlation_id(), "r1");
    assert_eq!(received.body().as_ref(), b"queued");
}
