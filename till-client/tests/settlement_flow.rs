mod common;

use common::*;
use till_client::{
    ClientError, OrderStatus, PaymentMethod, PaymentProgress, SettlementPhase, TableStatus, View,
};

// --- Test 1: split payments close the order exactly once ---

#[tokio::test]
async fn test_split_payment_converges_once() {
    let (gateway, till) = setup().await;
    build_example_cart(&till, Some("t1")).await;

    // Unsaved cart is saved before payment opens
    let settlement = till.open_payment().await.unwrap();
    assert_eq!(settlement.total(), 192.5);
    assert_eq!(gateway.order_writes(), 1);
    let order_id = settlement.order_id().to_string();

    till.begin_split_payment().unwrap();
    assert_eq!(
        till.settlement().unwrap().phase(),
        SettlementPhase::EnteringSplitAmount
    );

    let progress = till
        .collect_split_payment(PaymentMethod::Cash, "100")
        .await
        .unwrap();
    assert_eq!(progress, PaymentProgress::Pending { remaining: 92.5 });
    assert_eq!(gateway.order(&order_id).unwrap().status, OrderStatus::Pending);

    // Within the 0.01 tolerance
    let progress = till
        .collect_split_payment(PaymentMethod::CreditCard, "92.49")
        .await
        .unwrap();
    assert!(matches!(progress, PaymentProgress::Settled { ref order, .. } if order.id == order_id));
    assert_eq!(gateway.order(&order_id).unwrap().status, OrderStatus::Paid);
    assert_eq!(gateway.order_writes(), 2);

    // Extra entry after completion is rejected and never closes again
    assert!(matches!(
        till.collect_split_payment(PaymentMethod::Cash, "5").await,
        Err(ClientError::Validation(_))
    ));
    assert!(matches!(
        till.complete_settlement().await,
        Err(ClientError::Validation(_))
    ));
    assert_eq!(gateway.order_writes(), 2);
}

#[tokio::test]
async fn test_invalid_split_amount_is_local() {
    let (gateway, till) = setup().await;
    build_example_cart(&till, Some("t2")).await;
    till.open_payment().await.unwrap();
    let writes = gateway.total_writes();

    for input in ["abc", "-10", "0", ""] {
        assert!(matches!(
            till.collect_split_payment(PaymentMethod::Cash, input).await,
            Err(ClientError::Validation(_))
        ));
    }
    assert!(till.settlement().unwrap().payments().is_empty());
    assert_eq!(gateway.total_writes(), writes);
}

// --- Test 2: settlement releases the table ---

#[tokio::test]
async fn test_settlement_releases_table() {
    let (gateway, till) = setup().await;
    build_example_cart(&till, Some("t3")).await;
    till.save_order().await.unwrap();
    assert!(gateway.table("t3").unwrap().is_occupied());

    till.open_payment().await.unwrap();
    till.collect_full_payment(PaymentMethod::CreditCard)
        .await
        .unwrap();

    let table = gateway.table("t3").unwrap();
    assert_eq!(table.status, TableStatus::Available);
    assert!(table.current_order_id.is_none());
    let local = till.catalog().table("t3").unwrap();
    assert_eq!(local.status, TableStatus::Available);
    assert!(local.current_order_id.is_none());
    assert_eq!(till.snapshot().view, View::Tables);
}

// --- Test 3: failed close keeps everything for a retry ---

#[tokio::test]
async fn test_failed_close_keeps_state() {
    let (gateway, till) = setup().await;
    build_example_cart(&till, Some("t4")).await;
    till.open_payment().await.unwrap();
    gateway.fail_next_writes(1);

    assert!(matches!(
        till.collect_full_payment(PaymentMethod::Cash).await,
        Err(ClientError::Backend(_))
    ));
    let state = till.snapshot();
    assert!(state.has_session());
    assert_eq!(state.cart.len(), 2);
    let settlement = state.settlement.unwrap();
    assert!(settlement.is_fully_paid());
    assert!(!settlement.is_settled());
    assert!(gateway.table("t4").unwrap().is_occupied());

    let order = till.complete_settlement().await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(gateway.table("t4").unwrap().status, TableStatus::Available);
    assert!(!till.snapshot().has_session());
}

// --- Test 4: payment guards ---

#[tokio::test]
async fn test_open_payment_needs_items() {
    let (gateway, till) = setup().await;
    till.open_table(Some("t5")).await.unwrap();
    assert!(matches!(
        till.open_payment().await,
        Err(ClientError::Validation(_))
    ));
    assert!(till.settlement().is_none());
    assert_eq!(gateway.order_writes(), 0);
}

#[tokio::test]
async fn test_edited_cart_is_saved_before_payment() {
    let (gateway, till) = setup().await;
    build_example_cart(&till, Some("t6")).await;
    till.save_order().await.unwrap();
    till.add_product(TEA, 1.0).unwrap();

    let settlement = till.open_payment().await.unwrap();
    assert_eq!(settlement.total(), 207.5);
    assert_eq!(gateway.order_writes(), 2);

    // Cart is frozen while paying
    assert!(matches!(
        till.add_product(TEA, 1.0),
        Err(ClientError::Validation(_))
    ));
    till.cancel_payment().unwrap();
    till.add_product(TEA, 1.0).unwrap();
}

#[tokio::test]
async fn test_quick_sale_settles_without_table() {
    let (gateway, till) = setup().await;
    till.open_table(None).await.unwrap();
    till.add_product(COFFEE, 2.0).unwrap();
    till.open_payment().await.unwrap();

    let progress = till.collect_full_payment(PaymentMethod::Cash).await.unwrap();
    let PaymentProgress::Settled { order, .. } = progress else {
        panic!("quick sale should settle in one payment");
    };
    assert!(order.table_id.is_none());
    assert_eq!(order.total_amount, 120.0);
    assert_eq!(gateway.table_writes(), 0);
}
