//! REST gateway for a PostgREST-style backend
//!
//! Collections live under `{base_url}/rest/v1/{table}`. Every request
//! carries the `apikey` header plus a bearer token (the signed-in user
//! token when present, the api key otherwise).

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate, SecondsFormat};
use futures::future::join_all;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use shared::message::{ChangeAction, ChangeNotification, ChangeResource};
use shared::models::{
    DiningTable, DiningTableUpsert, Order, OrderDraft, OrderStatus, Product, ProductUpsert,
    TableStatus,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::rows::{
    OrderHeaderWrite, OrderItemWrite, OrderRow, ProductRow, ProductWrite, TableRow, TableWrite,
};
use super::{CHANGE_CHANNEL_CAPACITY, Gateway, check_occupancy, day_bounds};
use crate::{ClientConfig, ClientError, ClientResult};

const PRODUCTS: &str = "products";
const TABLES: &str = "tables";
const ORDERS: &str = "orders";
const ORDER_ITEMS: &str = "order_items";

const ORDER_SELECT: &str = "*,order_items(*)";
const ACTIVE_STATUSES: &str = "in.(pending,preparing,served)";

/// Low-level PostgREST client
#[derive(Debug, Clone)]
struct RestClient {
    client: Client,
    base_url: String,
    api_key: String,
    bearer: String,
}

impl RestClient {
    fn new(config: &ClientConfig) -> ClientResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ClientError::Config("missing backend api key".to_string()))?;
        let bearer = config.bearer_token().unwrap_or(&api_key).to_string();

        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            bearer,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", self.bearer))
    }

    /// GET rows
    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> ClientResult<Vec<T>> {
        let response = self.request(Method::GET, table).query(query).send().await?;
        Self::handle_response(response).await
    }

    /// POST rows and return the inserted representation
    async fn insert<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &B,
    ) -> ClientResult<Vec<T>> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// PATCH rows matching `filter` and return them
    async fn update<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        filter: &[(&str, String)],
        body: &B,
    ) -> ClientResult<Vec<T>> {
        let response = self
            .request(Method::PATCH, table)
            .query(filter)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// DELETE rows matching `filter`
    async fn delete(&self, table: &str, filter: &[(&str, String)]) -> ClientResult<()> {
        let response = self
            .request(Method::DELETE, table)
            .query(filter)
            .header("Prefer", "return=minimal")
            .send()
            .await?;
        Self::check_status(response).await.map(|_| ())
    }

    /// Map error statuses into the client error taxonomy
    async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await?;
        Err(match status {
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
            StatusCode::NOT_FOUND => ClientError::NotFound(text),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ClientError::Validation(text)
            }
            StatusCode::CONFLICT => ClientError::Conflict(text),
            other => ClientError::Backend(format!("{}: {}", other, text)),
        })
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(Into::into)
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

fn single<T>(rows: Vec<T>, what: &str) -> ClientResult<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| ClientError::NotFound(what.to_string()))
}

fn map_rows<R, T>(rows: Vec<R>) -> ClientResult<Vec<T>>
where
    T: TryFrom<R, Error = ClientError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// REST backend with a polling change feed
pub struct RestGateway {
    http: Arc<RestClient>,
    events: broadcast::Sender<ChangeNotification>,
    shutdown: CancellationToken,
}

impl RestGateway {
    /// Build the client and start the change-feed poller
    ///
    /// Must be called inside a tokio runtime. The poller stops when the
    /// gateway is dropped.
    pub fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let http = Arc::new(RestClient::new(config)?);
        let (events, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();

        tokio::spawn(poll_changes(
            http.clone(),
            events.clone(),
            config.realtime_poll_interval(),
            shutdown.clone(),
        ));

        Ok(Self {
            http,
            events,
            shutdown,
        })
    }

    fn publish(&self, resource: ChangeResource, action: ChangeAction, id: &str) {
        let _ = self
            .events
            .send(ChangeNotification::new(resource, action, id));
    }

    async fn fetch_order(&self, id: &str) -> ClientResult<Order> {
        let rows: Vec<OrderRow> = self
            .http
            .select(
                ORDERS,
                &[("select", ORDER_SELECT.to_string()), ("id", eq(id))],
            )
            .await?;
        Order::try_from(single(rows, &format!("order {}", id))?)
    }

    async fn patch_table(&self, id: &str, body: serde_json::Value) -> ClientResult<DiningTable> {
        let rows: Vec<TableRow> = self.http.update(TABLES, &[("id", eq(id))], &body).await?;
        let table = DiningTable::try_from(single(rows, &format!("table {}", id))?)?;
        self.publish(ChangeResource::Tables, ChangeAction::Update, id);
        Ok(table)
    }
}

impl Drop for RestGateway {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn list_products(&self) -> ClientResult<Vec<Product>> {
        let rows: Vec<ProductRow> = self
            .http
            .select(
                PRODUCTS,
                &[
                    ("select", "*".to_string()),
                    ("order", "sort_order.asc.nullslast,name.asc".to_string()),
                ],
            )
            .await?;
        map_rows(rows)
    }

    async fn upsert_product(&self, product: ProductUpsert) -> ClientResult<Product> {
        let id = product.id.clone();
        let body = ProductWrite::from(product);

        let (rows, action): (Vec<ProductRow>, _) = match id.as_deref() {
            Some(id) => (
                self.http.update(PRODUCTS, &[("id", eq(id))], &body).await?,
                ChangeAction::Update,
            ),
            None => (self.http.insert(PRODUCTS, &body).await?, ChangeAction::Insert),
        };

        let saved = Product::try_from(single(rows, "product")?)?;
        self.publish(ChangeResource::Products, action, &saved.id);
        Ok(saved)
    }

    async fn delete_product(&self, id: &str) -> ClientResult<()> {
        self.http.delete(PRODUCTS, &[("id", eq(id))]).await?;
        self.publish(ChangeResource::Products, ChangeAction::Delete, id);
        Ok(())
    }

    async fn list_tables(&self) -> ClientResult<Vec<DiningTable>> {
        let rows: Vec<TableRow> = self
            .http
            .select(
                TABLES,
                &[("select", "*".to_string()), ("order", "name.asc".to_string())],
            )
            .await?;
        map_rows(rows)
    }

    async fn upsert_table(&self, table: DiningTableUpsert) -> ClientResult<DiningTable> {
        let id = table.id.clone();
        let body = TableWrite::from(table);

        let (rows, action): (Vec<TableRow>, _) = match id.as_deref() {
            Some(id) => (
                self.http.update(TABLES, &[("id", eq(id))], &body).await?,
                ChangeAction::Update,
            ),
            None => (self.http.insert(TABLES, &body).await?, ChangeAction::Insert),
        };

        let saved = DiningTable::try_from(single(rows, "table")?)?;
        self.publish(ChangeResource::Tables, action, &saved.id);
        Ok(saved)
    }

    async fn delete_table(&self, id: &str) -> ClientResult<()> {
        self.http.delete(TABLES, &[("id", eq(id))]).await?;
        self.publish(ChangeResource::Tables, ChangeAction::Delete, id);
        Ok(())
    }

    async fn set_table_service_flag(&self, id: &str, needs_service: bool) -> ClientResult<()> {
        self.patch_table(id, json!({ "needs_service": needs_service }))
            .await
            .map(|_| ())
    }

    async fn set_table_occupancy(
        &self,
        id: &str,
        status: TableStatus,
        order_id: Option<&str>,
    ) -> ClientResult<()> {
        check_occupancy(status, order_id)?;
        let body = match (status, order_id) {
            (TableStatus::Occupied, None) => json!({ "status": status }),
            _ => json!({ "status": status, "current_order_id": order_id }),
        };
        self.patch_table(id, body).await.map(|_| ())
    }

    async fn list_active_orders(&self) -> ClientResult<Vec<Order>> {
        let rows: Vec<OrderRow> = self
            .http
            .select(
                ORDERS,
                &[
                    ("select", ORDER_SELECT.to_string()),
                    ("status", ACTIVE_STATUSES.to_string()),
                    ("order", "created_at.asc".to_string()),
                ],
            )
            .await?;
        map_rows(rows)
    }

    async fn list_orders_for_day(&self, day: NaiveDate) -> ClientResult<Vec<Order>> {
        let (start, end) = day_bounds(day);
        let rows: Vec<OrderRow> = self
            .http
            .select(
                ORDERS,
                &[
                    ("select", ORDER_SELECT.to_string()),
                    (
                        "created_at",
                        format!("gte.{}", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ),
                    (
                        "created_at",
                        format!("lt.{}", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    ),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await?;
        map_rows(rows)
    }

    async fn upsert_order(&self, draft: OrderDraft) -> ClientResult<Order> {
        let header = OrderHeaderWrite::from_draft(&draft);

        // 1. Header
        let (header_rows, action): (Vec<OrderRow>, _) = match draft.id.as_deref() {
            Some(id) => (
                self.http.update(ORDERS, &[("id", eq(id))], &header).await?,
                ChangeAction::Update,
            ),
            None => (self.http.insert(ORDERS, &header).await?, ChangeAction::Insert),
        };
        let order_id = single(header_rows, "order")?.id;

        // 2. Drop every existing line, 3. insert the current set
        self.http
            .delete(ORDER_ITEMS, &[("order_id", eq(&order_id))])
            .await?;
        if !draft.items.is_empty() {
            let items: Vec<OrderItemWrite> = draft
                .items
                .iter()
                .map(|item| OrderItemWrite::new(&order_id, item))
                .collect();
            let _: Vec<serde_json::Value> = self.http.insert(ORDER_ITEMS, &items).await?;
        }

        // New table orders occupy their table
        if action == ChangeAction::Insert
            && let Some(table_id) = draft.table_id.as_deref()
        {
            self.patch_table(
                table_id,
                json!({ "status": TableStatus::Occupied, "current_order_id": order_id }),
            )
            .await?;
        }

        let order = self.fetch_order(&order_id).await?;
        tracing::debug!(
            order_id = %order.id,
            order_number = %order.order_number,
            items = order.items.len(),
            "Order saved"
        );
        self.publish(ChangeResource::Orders, action, &order.id);
        Ok(order)
    }

    async fn close_order(&self, id: &str) -> ClientResult<Order> {
        let rows: Vec<OrderRow> = self
            .http
            .update(ORDERS, &[("id", eq(id))], &json!({ "status": OrderStatus::Paid }))
            .await?;
        let table_id = single(rows, &format!("order {}", id))?.table_id;

        if let Some(table_id) = table_id.as_deref() {
            self.patch_table(
                table_id,
                json!({ "status": TableStatus::Available, "current_order_id": null }),
            )
            .await?;
        }

        self.publish(ChangeResource::Orders, ChangeAction::Update, id);
        self.fetch_order(id).await
    }

    async fn set_order_deleted(&self, id: &str, deleted: bool) -> ClientResult<()> {
        let rows: Vec<OrderRow> = self
            .http
            .update(ORDERS, &[("id", eq(id))], &json!({ "is_deleted": deleted }))
            .await?;
        single(rows, &format!("order {}", id))?;
        self.publish(ChangeResource::Orders, ChangeAction::Update, id);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.events.subscribe()
    }
}

// ==================== Change feed ====================

/// Hash of a collection snapshot
async fn fingerprint(http: &RestClient, resource: ChangeResource) -> ClientResult<u64> {
    let query: Vec<(&str, String)> = match resource {
        ChangeResource::Orders => {
            let (start, _) = day_bounds(Local::now().date_naive());
            vec![
                ("select", "id,status,is_deleted,table_id,order_items(id)".to_string()),
                (
                    "or",
                    format!(
                        "(status.{},created_at.gte.{})",
                        ACTIVE_STATUSES,
                        start.to_rfc3339_opts(SecondsFormat::Secs, true)
                    ),
                ),
                ("order", "id.asc".to_string()),
            ]
        }
        ChangeResource::Tables | ChangeResource::Products => vec![
            ("select", "*".to_string()),
            ("order", "id.asc".to_string()),
        ],
    };

    let rows: Vec<serde_json::Value> = http.select(resource.table_name(), &query).await?;
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(&rows)?.hash(&mut hasher);
    Ok(hasher.finish())
}

/// Collections fingerprinted by the change feed
const WATCHED: [ChangeResource; 3] = [
    ChangeResource::Orders,
    ChangeResource::Tables,
    ChangeResource::Products,
];

/// Publish a collection-level notification whenever a snapshot changes
async fn poll_changes(
    http: Arc<RestClient>,
    events: broadcast::Sender<ChangeNotification>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut last: HashMap<ChangeResource, u64> = HashMap::new();

    tracing::info!(interval_ms = interval.as_millis() as u64, "Change feed poller started");

    loop {
        let polled = join_all(WATCHED.map(|resource| fingerprint(&http, resource))).await;
        for (resource, result) in WATCHED.into_iter().zip(polled) {
            match result {
                Ok(hash) => {
                    let previous = last.insert(resource, hash);
                    if previous.is_some_and(|p| p != hash) {
                        tracing::debug!(%resource, "Remote change detected");
                        let _ = events.send(ChangeNotification::collection(resource));
                    }
                }
                Err(e) => {
                    tracing::warn!(%resource, error = %e, "Change feed poll failed");
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => {
                tracing::info!("Change feed poller received shutdown signal");
                return;
            }
        }
    }
}
