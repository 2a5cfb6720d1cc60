mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use till_client::{
    ChangeNotification, ChangeResource, ClientConfig, Gateway, MemoryGateway, PaymentMethod,
    PaymentProgress, PublicMenu, RemoteMerge, TableStatus, TillController,
};
use tokio_util::sync::CancellationToken;

fn orders_changed() -> ChangeNotification {
    ChangeNotification::collection(ChangeResource::Orders)
}

// --- Test 1: a remote save overwrites the local cart ---

#[tokio::test]
async fn test_remote_save_overwrites_local_cart() {
    let (gateway, front) = setup().await;
    let back = terminal(&gateway, &ClientConfig::memory()).await;

    back.open_table(Some("t4")).await.unwrap();
    front.open_table(Some("t4")).await.unwrap();
    front.add_product(TEA, 1.0).unwrap();
    let order = front.save_order().await.unwrap();

    assert_eq!(
        back.on_remote_change(&orders_changed()).await.unwrap(),
        RemoteMerge::Overwritten
    );
    let state = back.snapshot();
    assert_eq!(state.order.id.as_deref(), Some(order.id.as_str()));
    assert_eq!(state.cart.to_items(), order.items);

    // Unsaved local edit is lost when the other terminal saves first
    back.add_product(COFFEE, 1.0).unwrap();
    front.add_product(TEA, 2.0).unwrap();
    front.save_order().await.unwrap();
    assert_eq!(
        back.on_remote_change(&orders_changed()).await.unwrap(),
        RemoteMerge::Overwritten
    );
    let lines = back.cart_lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].product_id.as_deref(), Some(TEA));
    assert_eq!(lines[0].quantity, 3.0);
}

// --- Test 2: order closed elsewhere resets the session ---

#[tokio::test]
async fn test_remote_close_resets_session() {
    let (gateway, front) = setup().await;
    let back = terminal(&gateway, &ClientConfig::memory()).await;

    build_example_cart(&front, Some("t5")).await;
    front.save_order().await.unwrap();
    back.open_table(Some("t5")).await.unwrap();
    assert_eq!(back.snapshot().cart.len(), 2);

    front.open_payment().await.unwrap();
    front.collect_full_payment(PaymentMethod::Cash).await.unwrap();

    assert_eq!(
        back.on_remote_change(&orders_changed()).await.unwrap(),
        RemoteMerge::Reset
    );
    let state = back.snapshot();
    assert!(state.cart.is_empty());
    assert!(!state.order.is_persisted());
    assert_eq!(state.order.table_id.as_deref(), Some("t5"));
    assert_eq!(back.catalog().table("t5").unwrap().status, TableStatus::Available);
}

// --- Test 3: a brand-new cart is never clobbered ---

#[tokio::test]
async fn test_new_cart_left_alone() {
    let (gateway, front) = setup().await;
    let back = terminal(&gateway, &ClientConfig::memory()).await;

    back.open_table(Some("t6")).await.unwrap();
    back.add_product(TEA, 1.0).unwrap();

    build_example_cart(&front, Some("t7")).await;
    front.save_order().await.unwrap();

    assert_eq!(
        back.on_remote_change(&orders_changed()).await.unwrap(),
        RemoteMerge::Unchanged
    );
    assert_eq!(back.cart_lines().len(), 1);
}

// --- Test 4: the listener reads the session at delivery time ---

#[tokio::test]
async fn test_listener_uses_latest_session() {
    let (gateway, front) = setup().await;
    let back = terminal(&gateway, &ClientConfig::memory()).await;

    // Listener installed before any session exists
    let shutdown = CancellationToken::new();
    let listener = back.spawn_realtime(shutdown.clone());

    back.open_table(Some("t8")).await.unwrap();
    build_example_cart(&front, Some("t8")).await;
    let order = front.save_order().await.unwrap();

    let adopted = eventually(|| {
        back.snapshot().order.id.as_deref() == Some(order.id.as_str())
    })
    .await;
    assert!(adopted);
    assert_eq!(back.cart_total(), 192.5);

    shutdown.cancel();
    listener.shutdown().await;
}

#[tokio::test]
async fn test_dropped_listener_stops_applying_changes() {
    let (gateway, front) = setup().await;
    let back = terminal(&gateway, &ClientConfig::memory()).await;
    back.open_table(Some("t9")).await.unwrap();

    let listener = back.spawn_realtime(CancellationToken::new());
    drop(listener);
    tokio::task::yield_now().await;

    build_example_cart(&front, Some("t9")).await;
    front.save_order().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!back.snapshot().order.is_persisted());
}

// --- Test 5: merges interleaved with saves and payments ---

#[tokio::test]
async fn test_fetch_overlapping_save_keeps_saved_order() {
    let memory = Arc::new(MemoryGateway::seeded());
    let gateway = Arc::new(LateActiveOrders {
        inner: memory.clone(),
        delay: Duration::from_millis(80),
    });
    let till = TillController::new(gateway, &ClientConfig::memory());
    till.refresh_catalog().await.unwrap();
    till.open_table(Some("t1")).await.unwrap();
    till.add_product(TEA, 1.0).unwrap();

    // Active orders are read before the save commits and delivered after
    let tables_changed = ChangeNotification::collection(ChangeResource::Tables);
    let (merge, saved) = tokio::join!(till.on_remote_change(&tables_changed), till.save_order());
    let saved = saved.unwrap();
    assert_eq!(merge.unwrap(), RemoteMerge::Skipped);

    let state = till.snapshot();
    assert_eq!(state.order.id.as_deref(), Some(saved.id.as_str()));
    assert_eq!(state.cart.len(), 1);

    // The next notification sees the committed order
    assert_eq!(
        till.on_remote_change(&orders_changed()).await.unwrap(),
        RemoteMerge::Overwritten
    );
    till.add_product(TEA, 1.0).unwrap();
    let again = till.save_order().await.unwrap();
    assert_eq!(again.id, saved.id);
    assert_eq!(memory.list_active_orders().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remote_edit_during_payment_updates_balance() {
    let (gateway, front) = setup().await;
    let back = terminal(&gateway, &ClientConfig::memory()).await;

    front.open_table(Some("t1")).await.unwrap();
    front.add_product(TEA, 1.0).unwrap();
    assert_eq!(front.open_payment().await.unwrap().total(), 15.0);
    assert_eq!(
        front
            .collect_split_payment(PaymentMethod::Cash, "10")
            .await
            .unwrap(),
        PaymentProgress::Pending { remaining: 5.0 }
    );

    back.open_table(Some("t1")).await.unwrap();
    back.add_product(COFFEE, 2.0).unwrap();
    assert_eq!(back.save_order().await.unwrap().total_amount, 135.0);

    assert_eq!(
        front.on_remote_change(&orders_changed()).await.unwrap(),
        RemoteMerge::Overwritten
    );
    let settlement = front.settlement().unwrap();
    assert_eq!(settlement.total(), 135.0);
    assert_eq!(settlement.remaining(), 125.0);
    assert_eq!(settlement.payments().len(), 1);

    let progress = front
        .collect_full_payment(PaymentMethod::CreditCard)
        .await
        .unwrap();
    let PaymentProgress::Settled { order, change } = progress else {
        panic!("full payment should close the order");
    };
    assert_eq!(order.total_amount, 135.0);
    assert_eq!(change, 0.0);
}

// --- Test 6: waiter call alerts once per transition ---

#[tokio::test]
async fn test_waiter_call_alerts_once() {
    let gateway = Arc::new(MemoryGateway::seeded());
    let alerts = Arc::new(CountingAlert::default());
    let staff = TillController::new(gateway.clone(), &ClientConfig::memory())
        .with_alert_sink(alerts.clone());

    staff.refresh_catalog().await.unwrap();
    staff.refresh_catalog().await.unwrap();
    assert_eq!(alerts.count(), 0);

    let menu = PublicMenu::load(gateway.clone(), Some("t10")).await.unwrap();
    menu.call_waiter().await.unwrap();

    staff.refresh_catalog().await.unwrap();
    staff.refresh_catalog().await.unwrap();
    assert_eq!(alerts.count(), 1);
    assert!(staff.catalog().table("t10").unwrap().needs_service);

    // Second press while confirmed is a no-op
    menu.call_waiter().await.unwrap();
    staff.refresh_catalog().await.unwrap();
    assert_eq!(alerts.count(), 1);

    staff.clear_service_flag("t10").await.unwrap();
    assert!(!gateway.table("t10").unwrap().needs_service);
    staff.refresh_catalog().await.unwrap();

    // Raised again from another terminal
    gateway.update_table_row("t10", |t| t.needs_service = true);
    staff.refresh_catalog().await.unwrap();
    assert_eq!(alerts.count(), 2);
}

#[tokio::test]
async fn test_failed_waiter_call_rearms() {
    let (gateway, _) = setup().await;
    let menu = PublicMenu::load(gateway.clone(), Some("t11")).await.unwrap();
    gateway.fail_next_writes(1);

    assert!(menu.call_waiter().await.is_err());
    assert_eq!(menu.call_status(), till_client::CallStatus::Idle);
    assert_eq!(
        menu.call_waiter().await.unwrap(),
        till_client::CallStatus::Called
    );
}
