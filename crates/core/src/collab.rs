//! Collaborator seams the workflow depends on: the host order store, the
//! user directory, and the outbound notification dispatcher. Each trait has
//! an in-memory implementation used by tests and by transports that run
//! without a database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::order::{Order, OrderId};
use crate::domain::user::{DirectoryUser, UserId, UserRef};
use crate::ledger::{ApprovalRequest, LedgerError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored data could not be decoded: {0}")]
    Decode(String),
}

impl From<LedgerError> for StoreError {
    fn from(error: LedgerError) -> Self {
        Self::Decode(error.to_string())
    }
}

/// Read/write access to host purchase orders. The ledger is carried as one
/// opaque metadata blob per order; the gateway never interprets it.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError>;

    /// Orders in an open lifecycle state, the candidate set for fan-out
    /// pending-approval queries.
    async fn list_open_orders(&self) -> Result<Vec<Order>, StoreError>;

    async fn read_metadata(
        &self,
        id: &OrderId,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    async fn write_metadata(
        &self,
        id: &OrderId,
        key: &str,
        blob: serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// Lookup into the host user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<DirectoryUser>, StoreError>;

    /// Resolves configured usernames to ids, silently dropping names that are
    /// unknown or belong to deactivated users.
    async fn find_active_ids_by_username(
        &self,
        usernames: &[String],
    ) -> Result<Vec<UserId>, StoreError>;

    async fn list_active_users(&self) -> Result<Vec<DirectoryUser>, StoreError>;
}

/// Delivery channel for one notification, selected explicitly by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Channel {
    Email(String),
    Webhook(String),
    None,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NotificationEvent {
    ApprovalRequested {
        order: Order,
        request: ApprovalRequest,
        target: Option<UserRef>,
    },
    ApprovalDecided {
        order: Order,
        request: ApprovalRequest,
        approved: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub channel: Channel,
    pub event: NotificationEvent,
}

/// Outbound notification sink. Implementations own their failure handling:
/// delivery problems are logged and swallowed, never surfaced to the
/// workflow transition that triggered them.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: Notification);
}

#[async_trait]
impl<T> OrderGateway for Arc<T>
where
    T: OrderGateway + ?Sized,
{
    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        (**self).find_order(id).await
    }

    async fn list_open_orders(&self) -> Result<Vec<Order>, StoreError> {
        (**self).list_open_orders().await
    }

    async fn read_metadata(
        &self,
        id: &OrderId,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        (**self).read_metadata(id, key).await
    }

    async fn write_metadata(
        &self,
        id: &OrderId,
        key: &str,
        blob: serde_json::Value,
    ) -> Result<(), StoreError> {
        (**self).write_metadata(id, key, blob).await
    }
}

#[async_trait]
impl<T> UserDirectory for Arc<T>
where
    T: UserDirectory + ?Sized,
{
    async fn find_user(&self, id: UserId) -> Result<Option<DirectoryUser>, StoreError> {
        (**self).find_user(id).await
    }

    async fn find_active_ids_by_username(
        &self,
        usernames: &[String],
    ) -> Result<Vec<UserId>, StoreError> {
        (**self).find_active_ids_by_username(usernames).await
    }

    async fn list_active_users(&self) -> Result<Vec<DirectoryUser>, StoreError> {
        (**self).list_active_users().await
    }
}

#[async_trait]
impl<T> NotificationDispatcher for Arc<T>
where
    T: NotificationDispatcher + ?Sized,
{
    async fn dispatch(&self, notification: Notification) {
        (**self).dispatch(notification).await
    }
}

#[derive(Default)]
pub struct InMemoryOrderGateway {
    orders: RwLock<HashMap<String, Order>>,
    metadata: RwLock<HashMap<String, HashMap<String, serde_json::Value>>>,
}

impl InMemoryOrderGateway {
    pub async fn insert_order(&self, order: Order) {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.0.clone(), order);
    }
}

#[async_trait]
impl OrderGateway for InMemoryOrderGateway {
    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id.0).cloned())
    }

    async fn list_open_orders(&self) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        let mut open: Vec<Order> =
            orders.values().filter(|order| order.status.is_open()).cloned().collect();
        open.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        Ok(open)
    }

    async fn read_metadata(
        &self,
        id: &OrderId,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let metadata = self.metadata.read().await;
        Ok(metadata.get(&id.0).and_then(|blobs| blobs.get(key).cloned()))
    }

    async fn write_metadata(
        &self,
        id: &OrderId,
        key: &str,
        blob: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut metadata = self.metadata.write().await;
        metadata.entry(id.0.clone()).or_default().insert(key.to_string(), blob);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<i64, DirectoryUser>>,
}

impl InMemoryUserDirectory {
    pub async fn insert_user(&self, user: DirectoryUser) {
        let mut users = self.users.write().await;
        users.insert(user.id.0, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, id: UserId) -> Result<Option<DirectoryUser>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn find_active_ids_by_username(
        &self,
        usernames: &[String],
    ) -> Result<Vec<UserId>, StoreError> {
        let users = self.users.read().await;
        let mut ids: Vec<UserId> = users
            .values()
            .filter(|user| user.active && usernames.iter().any(|name| name == &user.username))
            .map(|user| user.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_active_users(&self) -> Result<Vec<DirectoryUser>, StoreError> {
        let users = self.users.read().await;
        let mut active: Vec<DirectoryUser> =
            users.values().filter(|user| user.active).cloned().collect();
        active.sort_by(|left, right| left.username.cmp(&right.username));
        Ok(active)
    }
}

/// Dispatcher fake that records everything handed to it.
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, notification: Notification) {
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::order::{Order, OrderId, OrderStatus};
    use crate::domain::user::{DirectoryUser, UserId};

    use super::{InMemoryOrderGateway, InMemoryUserDirectory, OrderGateway, UserDirectory};

    fn order(id: &str, status: OrderStatus) -> Order {
        Order {
            id: OrderId(id.to_string()),
            reference: id.to_string(),
            supplier: None,
            total: Some(Decimal::new(1_000, 0)),
            status,
        }
    }

    fn user(id: i64, username: &str, active: bool) -> DirectoryUser {
        DirectoryUser {
            id: UserId(id),
            username: username.to_string(),
            display_name: username.to_string(),
            email: Some(format!("{username}@example.com")),
            active,
        }
    }

    #[tokio::test]
    async fn list_open_orders_filters_terminal_statuses() {
        let gateway = InMemoryOrderGateway::default();
        gateway.insert_order(order("PO-1", OrderStatus::Pending)).await;
        gateway.insert_order(order("PO-2", OrderStatus::Complete)).await;
        gateway.insert_order(order("PO-3", OrderStatus::OnHold)).await;

        let open = gateway.list_open_orders().await.expect("list");
        let ids: Vec<&str> = open.iter().map(|order| order.id.0.as_str()).collect();
        assert_eq!(ids, ["PO-1", "PO-3"]);
    }

    #[tokio::test]
    async fn metadata_round_trips_per_order_and_key() {
        let gateway = InMemoryOrderGateway::default();
        let id = OrderId("PO-1".to_string());

        assert_eq!(gateway.read_metadata(&id, "po_approvals").await.expect("read"), None);

        let blob = serde_json::json!({ "schema_version": 1, "entries": [] });
        gateway.write_metadata(&id, "po_approvals", blob.clone()).await.expect("write");

        assert_eq!(gateway.read_metadata(&id, "po_approvals").await.expect("read"), Some(blob));
        assert_eq!(gateway.read_metadata(&id, "other_key").await.expect("read"), None);
    }

    #[tokio::test]
    async fn username_resolution_drops_inactive_and_unknown_users() {
        let directory = InMemoryUserDirectory::default();
        directory.insert_user(user(1, "alice", true)).await;
        directory.insert_user(user(2, "bert", false)).await;

        let ids = directory
            .find_active_ids_by_username(&[
                "alice".to_string(),
                "bert".to_string(),
                "ghost".to_string(),
            ])
            .await
            .expect("resolve");

        assert_eq!(ids, [UserId(1)]);
    }
}
