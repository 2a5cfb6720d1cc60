use anyhow::Context;
use till_client::{
    ClientConfig, PaymentMethod, PaymentProgress, TillController, logger::init_logger,
};
use tokio_util::sync::CancellationToken;

/// Walk one table through a full sale: weigh, add drinks, save, pay.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env()?;
    let _log_guard = init_logger(&config.log_level, config.log_json, config.log_dir.as_deref())?;

    tracing::info!(gateway = ?config.gateway, "Till demo starting");

    let gateway = config.build_gateway()?;
    let controller = TillController::new(gateway, &config);
    let shutdown = CancellationToken::new();
    let realtime = controller.spawn_realtime(shutdown.clone());

    controller.refresh_catalog().await?;
    let catalog = controller.catalog();
    let pistachio = catalog
        .products()
        .into_iter()
        .find(|p| p.name == "Pistachio")
        .context("catalog has no Pistachio")?;
    let tea = catalog
        .products()
        .into_iter()
        .find(|p| p.name == "Tea")
        .context("catalog has no Tea")?;
    let table = catalog
        .tables()
        .into_iter()
        .find(|t| !t.is_occupied())
        .context("no free table")?;

    controller.open_table(Some(&table.id)).await?;
    controller.add_weighed(&pistachio.id, 250.0)?;
    controller.add_product(&tea.id, 1.0)?;
    controller.add_product(&tea.id, 1.0)?;
    tracing::info!(
        table = %table.name,
        lines = controller.cart_lines().len(),
        total = controller.cart_total(),
        "Cart ready"
    );

    let order = controller.save_order().await?;
    tracing::info!(order_number = %order.order_number, total = order.total_amount, "Order placed");

    controller.open_payment().await?;
    match controller.collect_full_payment(PaymentMethod::Cash).await? {
        PaymentProgress::Settled { order, change } => {
            tracing::info!(order_number = %order.order_number, change, "Paid in cash");
        }
        PaymentProgress::Pending { remaining } => {
            anyhow::bail!("payment left {:.2} open", remaining);
        }
    }

    controller.refresh_catalog().await?;
    if let Some(table) = controller.catalog().table(&table.id) {
        tracing::info!(table = %table.name, status = ?table.status, "Table after settlement");
    }

    shutdown.cancel();
    realtime.shutdown().await;
    Ok(())
}
