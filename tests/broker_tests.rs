use cardpool::application::broker::{SubscriptionBroker, WatchKey, Watched};
use cardpool::config::BrokerConfig;
use cardpool::domain::order::{Order, PaymentMethod};
use cardpool::domain::payment_link::PaymentLink;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn order(id: u64) -> Order {
    let mut order = Order::new(dec!(10), PaymentMethod::KapitalBank, "");
    order.id = id;
    order
}

fn link(id: u64, order_id: u64) -> PaymentLink {
    let mut link = PaymentLink::for_order(&order(order_id));
    link.id = id;
    link
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publish_fires_once() {
    let broker = Arc::new(SubscriptionBroker::new(BrokerConfig::default()));
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    broker
        .subscribe(vec![WatchKey::payment_link(5)], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    let mut publishers = Vec::new();
    for _ in 0..16 {
        let broker = Arc::clone(&broker);
        publishers.push(tokio::spawn(async move {
            broker.publish(Watched::PaymentLink(link(5, 1))).await
        }));
    }
    let mut total = 0;
    for publisher in publishers {
        total += publisher.await.unwrap();
    }

    assert_eq!(total, 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(broker.is_empty().await);
}

#[tokio::test]
async fn test_publish_wakes_only_matching_kind() {
    let broker = SubscriptionBroker::new(BrokerConfig::default());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let orders = tx.clone();
    broker
        .subscribe(vec![WatchKey::order(3)], move |entity| {
            let _ = orders.send(entity);
        })
        .await
        .unwrap();
    broker
        .subscribe(vec![WatchKey::payment_link(3)], move |entity| {
            let _ = tx.send(entity);
        })
        .await
        .unwrap();

    assert_eq!(broker.publish(Watched::Order(order(3))).await, 1);
    let received = rx.try_recv().unwrap();
    assert!(matches!(received, Watched::Order(ref o) if o.id == 3));
    assert!(rx.try_recv().is_err());
    assert_eq!(broker.len().await, 1);
}

#[tokio::test]
async fn test_every_filter_must_match() {
    let broker = SubscriptionBroker::new(BrokerConfig::default());
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    broker
        .subscribe(
            vec![WatchKey::payment_link(0), WatchKey::payment_link(9)],
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();

    assert_eq!(broker.publish(Watched::PaymentLink(link(8, 1))).await, 0);
    assert_eq!(broker.publish(Watched::PaymentLink(link(9, 1))).await, 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_callback_may_subscribe_again() {
    let broker = Arc::new(SubscriptionBroker::new(BrokerConfig::default()));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let inner = Arc::clone(&broker);
    broker
        .subscribe(vec![WatchKey::order(1)], move |entity| {
            let _ = tx.send(entity.id());
            tokio::spawn(async move {
                inner
                    .subscribe(vec![WatchKey::order(2)], |_| {})
                    .await
                    .unwrap();
            });
        })
        .await
        .unwrap();

    broker.publish(Watched::Order(order(1))).await;
    assert_eq!(rx.recv().await, Some(1));
    tokio::task::yield_now().await;
    for _ in 0..10 {
        if broker.len().await == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(broker.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_gc_loop_drops_stale_subscriptions() {
    let broker = Arc::new(SubscriptionBroker::new(BrokerConfig {
        subscription_lifetime: Duration::from_secs(30),
        gc_interval: Duration::from_secs(60),
    }));
    broker
        .subscribe(vec![WatchKey::payment_link(1)], |_| {})
        .await
        .unwrap();
    let gc = broker.spawn_gc();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(broker.len().await, 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(broker.is_empty().await);
    gc.abort();
}
