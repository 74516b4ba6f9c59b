use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::Row;

use signoff_core::{Order, OrderGateway, OrderId, OrderStatus, StoreError};

use crate::DbPool;

pub struct SqlOrderGateway {
    pool: DbPool,
}

impl SqlOrderGateway {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upserts a host order row. The approval workflow never calls this; it
    /// exists for seeding and for hosts that mirror their orders in.
    pub async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO purchase_order (id, reference, supplier, total, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 reference = excluded.reference,
                 supplier = excluded.supplier,
                 total = excluded.total,
                 status = excluded.status,
                 updated_at = excluded.updated_at",
        )
        .bind(&order.id.0)
        .bind(&order.reference)
        .bind(&order.supplier)
        .bind(order.total.map(|total| total.to_string()))
        .bind(order.status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn decode(message: impl Into<String>) -> StoreError {
    StoreError::Decode(message.into())
}

fn parse_status(raw: &str) -> Result<OrderStatus, StoreError> {
    match raw {
        "draft" => Ok(OrderStatus::Draft),
        "pending" => Ok(OrderStatus::Pending),
        "placed" => Ok(OrderStatus::Placed),
        "on_hold" => Ok(OrderStatus::OnHold),
        "complete" => Ok(OrderStatus::Complete),
        "cancelled" => Ok(OrderStatus::Cancelled),
        "lost" => Ok(OrderStatus::Lost),
        "returned" => Ok(OrderStatus::Returned),
        other => Err(decode(format!("unknown order status `{other}`"))),
    }
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, StoreError> {
    let id: String = row.try_get("id").map_err(backend)?;
    let reference: String = row.try_get("reference").map_err(backend)?;
    let supplier: Option<String> = row.try_get("supplier").map_err(backend)?;
    let total_raw: Option<String> = row.try_get("total").map_err(backend)?;
    let status_raw: String = row.try_get("status").map_err(backend)?;

    let total = total_raw
        .map(|raw| {
            Decimal::from_str(&raw).map_err(|_| decode(format!("invalid order total `{raw}`")))
        })
        .transpose()?;

    Ok(Order {
        id: OrderId(id),
        reference,
        supplier,
        total,
        status: parse_status(&status_raw)?,
    })
}

#[async_trait]
impl OrderGateway for SqlOrderGateway {
    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            "SELECT id, reference, supplier, total, status FROM purchase_order WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn list_open_orders(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, reference, supplier, total, status
             FROM purchase_order
             WHERE status IN ('pending', 'placed', 'on_hold')
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_order).collect()
    }

    async fn read_metadata(
        &self,
        id: &OrderId,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT metadata FROM purchase_order WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let blob: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|error| decode(format!("invalid metadata column: {error}")))?;
        Ok(blob.get(key).cloned())
    }

    async fn write_metadata(
        &self,
        id: &OrderId,
        key: &str,
        blob: serde_json::Value,
    ) -> Result<(), StoreError> {
        // Read-modify-write on the JSON object; callers serialize per order.
        let raw: Option<String> =
            sqlx::query_scalar("SELECT metadata FROM purchase_order WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        let Some(raw) = raw else {
            return Err(StoreError::Backend(format!("order `{}` does not exist", id.0)));
        };

        let metadata: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|error| decode(format!("invalid metadata column: {error}")))?;
        let mut entries = match metadata {
            serde_json::Value::Object(entries) => entries,
            _ => serde_json::Map::new(),
        };
        entries.insert(key.to_string(), blob);

        sqlx::query("UPDATE purchase_order SET metadata = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::Value::Object(entries).to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use signoff_core::{Order, OrderGateway, OrderId, OrderStatus, StoreError};

    use super::SqlOrderGateway;
    use crate::{connect_single, migrations};

    async fn setup() -> SqlOrderGateway {
        let pool = connect_single("sqlite::memory:").await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlOrderGateway::new(pool)
    }

    fn order(id: &str, status: OrderStatus) -> Order {
        Order {
            id: OrderId(id.to_string()),
            reference: format!("REF-{id}"),
            supplier: Some("Acme Components".to_string()),
            total: Some(Decimal::new(1_234_50, 2)),
            status,
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let gateway = setup().await;
        let expected = order("PO-1", OrderStatus::Pending);
        gateway.save_order(&expected).await.expect("save");

        let found = gateway
            .find_order(&OrderId("PO-1".to_string()))
            .await
            .expect("find")
            .expect("should exist");
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn find_missing_order_returns_none() {
        let gateway = setup().await;
        let found = gateway.find_order(&OrderId("PO-404".to_string())).await.expect("find");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn list_open_orders_excludes_terminal_statuses() {
        let gateway = setup().await;
        gateway.save_order(&order("PO-1", OrderStatus::Pending)).await.expect("save");
        gateway.save_order(&order("PO-2", OrderStatus::Complete)).await.expect("save");
        gateway.save_order(&order("PO-3", OrderStatus::OnHold)).await.expect("save");
        gateway.save_order(&order("PO-4", OrderStatus::Cancelled)).await.expect("save");

        let open = gateway.list_open_orders().await.expect("list");
        let ids: Vec<&str> = open.iter().map(|order| order.id.0.as_str()).collect();
        assert_eq!(ids, ["PO-1", "PO-3"]);
    }

    #[tokio::test]
    async fn metadata_round_trips_and_preserves_foreign_keys() {
        let gateway = setup().await;
        gateway.save_order(&order("PO-1", OrderStatus::Pending)).await.expect("save");
        let id = OrderId("PO-1".to_string());

        assert_eq!(gateway.read_metadata(&id, "po_approvals").await.expect("read"), None);

        // A blob under another namespace must survive our writes untouched.
        gateway
            .write_metadata(&id, "other_plugin", serde_json::json!({"keep": true}))
            .await
            .expect("write other");
        gateway
            .write_metadata(&id, "po_approvals", serde_json::json!({"schema_version": 1}))
            .await
            .expect("write ours");

        assert_eq!(
            gateway.read_metadata(&id, "po_approvals").await.expect("read"),
            Some(serde_json::json!({"schema_version": 1}))
        );
        assert_eq!(
            gateway.read_metadata(&id, "other_plugin").await.expect("read"),
            Some(serde_json::json!({"keep": true}))
        );
    }

    #[tokio::test]
    async fn writing_metadata_for_missing_order_is_a_backend_error() {
        let gateway = setup().await;
        let error = gateway
            .write_metadata(&OrderId("PO-404".to_string()), "po_approvals", serde_json::json!({}))
            .await
            .expect_err("must fail");
        assert!(matches!(error, StoreError::Backend(_)));
    }
}
