mod common;

use cardpool::application::orders::CreateOrderRequest;
use cardpool::domain::order::{PaymentMethod, Status};
use cardpool::error::GatewayError;
use common::{ScriptedBank, build_gateway, fast_config, number_card, phone_card};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;
use uuid::Uuid;

fn request(method: &str, amount: Decimal) -> CreateOrderRequest {
    CreateOrderRequest {
        payment_method: method.to_string(),
        amount,
        payload: "{\"callback\":\"https://shop.test/hook\"}".to_string(),
    }
}

#[tokio::test]
async fn test_unknown_method_locks_nothing() {
    let test = build_gateway(
        ScriptedBank::default(),
        vec![number_card("8600123412341234")],
        fast_config(),
    )
    .await;

    let result = test.gateway.orders.create(request("paypal", dec!(10))).await;
    match result {
        Err(GatewayError::Validation(reason)) => assert_eq!(reason, "unknown payment method"),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(test.gateway.allocator.locker().len().await, 0);
    assert_eq!(test.alerter.no_cards(), 0);
}

#[tokio::test]
async fn test_empty_pool_rejects_with_single_alert() {
    let test = build_gateway(ScriptedBank::default(), Vec::new(), fast_config()).await;

    let err = test
        .gateway
        .orders
        .create(request("bank_transfer", dec!(10)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::ResourceUnavailable(PaymentMethod::BankTransfer)
    ));
    assert_eq!(err.user_message(), "There are no available cards. Try again later.");
    assert_eq!(test.alerter.no_cards(), 1);
}

#[tokio::test]
async fn test_amount_limits_are_enforced() {
    let test = build_gateway(
        ScriptedBank::default(),
        vec![number_card("8600123412341234")],
        fast_config(),
    )
    .await;

    for amount in [dec!(0), dec!(-5), dec!(4.99), dec!(100000.01)] {
        let result = test.gateway.orders.create(request("bank_transfer", amount)).await;
        assert!(
            matches!(result, Err(GatewayError::Validation(_))),
            "amount {amount} should be rejected"
        );
    }
    assert_eq!(test.gateway.allocator.locker().len().await, 0);

    let order = test
        .gateway
        .orders
        .create(request("bank_transfer", dec!(5)))
        .await
        .unwrap();
    assert_eq!(order.amount, dec!(5));
}

#[tokio::test]
async fn test_transfer_order_is_pending_and_holds_card() {
    let test = build_gateway(
        ScriptedBank::default(),
        vec![number_card("8600123412341234")],
        fast_config(),
    )
    .await;

    let order = test
        .gateway
        .orders
        .create(request("bank_transfer", dec!(250)))
        .await
        .unwrap();
    assert_eq!(order.status, Status::Pending);
    assert_ne!(order.id, 0);

    let lock = test.gateway.allocator.get_locked(order.card_id).await.unwrap();
    assert_eq!(lock.order_id, Some(order.id));

    // The only card is taken until the payment arrives.
    let err = test
        .gateway
        .orders
        .create(request("bank_transfer", dec!(250)))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::ResourceUnavailable(_)));

    let info = test.gateway.orders.payment_info(order.number).await.unwrap();
    assert_eq!(info.card_number.as_deref(), Some("8600123412341234"));
    assert!(info.link.is_none());
    assert_eq!(info.status, Status::Pending);
    assert_eq!(info.payment_method, PaymentMethod::BankTransfer);
}

#[tokio::test(start_paused = true)]
async fn test_transfer_order_fails_when_lock_is_lost() {
    let mut config = fast_config();
    config.allocator.lock_ttl = Duration::ZERO;
    let test = build_gateway(
        ScriptedBank::default(),
        vec![number_card("8600123412341234")],
        config,
    )
    .await;

    let err = test
        .gateway
        .orders
        .create(request("bank_transfer", dec!(250)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::ResourceUnavailable(PaymentMethod::BankTransfer)
    ));

    // Nothing can settle an order whose card is not held for it.
    let order = test.stores.orders.find_by_id(1).await.unwrap().unwrap();
    assert_eq!(order.status, Status::Failed);
    assert!(test.gateway.allocator.get_locked(order.card_id).await.is_none());
}

#[tokio::test]
async fn test_link_order_starts_new_with_link() {
    let test = build_gateway(
        ScriptedBank::default(),
        vec![phone_card("1234567"), number_card("8600123412341234")],
        fast_config(),
    )
    .await;

    let order = test
        .gateway
        .orders
        .create(request("kapital_bank", dec!(40)))
        .await
        .unwrap();
    assert_eq!(order.status, Status::New);
    assert_eq!(test.gateway.dispatcher.backlog(), 1);

    let card = test.stores.cards.find_by_id(order.card_id).await.unwrap().unwrap();
    assert!(card.supports(PaymentMethod::KapitalBank));
    assert!(!test.gateway.allocator.locker().is_locked(card.id).await);

    let info = test.gateway.orders.payment_info(order.number).await.unwrap();
    assert!(info.card_number.is_none());
    let link = info.link.unwrap();
    assert_eq!(link.status, Status::New);
    assert_eq!(link.order_id, order.id);
    assert_eq!(link.amount, dec!(40));
}

#[tokio::test]
async fn test_lookup_of_unknown_order() {
    let test = build_gateway(ScriptedBank::default(), Vec::new(), fast_config()).await;
    let number = Uuid::new_v4();

    let err = test.gateway.orders.status(number).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    assert!(err.user_message().contains(&number.to_string()));
    assert!(test.gateway.orders.payment_info(number).await.is_err());
}

#[tokio::test]
async fn test_status_reflects_storage() {
    let test = build_gateway(
        ScriptedBank::default(),
        vec![number_card("8600123412341234")],
        fast_config(),
    )
    .await;
    let order = test
        .gateway
        .orders
        .create(request("bank_transfer", dec!(10)))
        .await
        .unwrap();
    assert_eq!(test.gateway.orders.status(order.number).await.unwrap(), Status::Pending);
    assert_eq!(test.gateway.orders.find(order.number).await.unwrap(), order);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_never_share_a_card() {
    let cards = (0..5)
        .map(|i| number_card(&format!("860012341234000{i}")))
        .collect();
    let test = build_gateway(ScriptedBank::default(), cards, fast_config()).await;
    let alerter = test.alerter.clone();
    let gateway = std::sync::Arc::new(test.gateway);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let gateway = std::sync::Arc::clone(&gateway);
        handles.push(tokio::spawn(async move {
            gateway.orders.create(request("bank_transfer", dec!(10))).await
        }));
    }

    let mut cards = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => cards.push(order.card_id),
            Err(GatewayError::ResourceUnavailable(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(cards.len(), 5);
    cards.sort_unstable();
    cards.dedup();
    assert_eq!(cards.len(), 5);
    assert_eq!(alerter.no_cards(), 15);
}
