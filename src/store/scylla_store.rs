use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::value::{CqlValue, Row};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    order_number_suffix, ConditionalUpdate, OrderFilter, OrderStore, StoreError, StoreResult,
};
use crate::domain::order::{Invoice, Order, OrderStatus, StatusPatch};

// ============================================================================
// ScyllaDB Order Store
// ============================================================================
//
// Tables:
// - orders                 one row per order; `doc` holds the JSON document,
//                          `status` is duplicated so LWT can compare-and-set it,
//                          `is_read` / `invoice` are written independently of
//                          the document and override it on read
// - order_numbers          uniqueness of order numbers (INSERT ... IF NOT EXISTS)
// - order_numbers_by_day   highest sequence per UTC day (clustering DESC)
//
// Party lookups go through secondary indexes on buyer_id / seller_id and are
// filtered client side.
//
// ============================================================================

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS orders (
        id uuid PRIMARY KEY,
        order_number text,
        buyer_id text,
        seller_id text,
        status text,
        is_read boolean,
        invoice text,
        created_at timestamp,
        doc text
    )",
    "CREATE INDEX IF NOT EXISTS orders_by_buyer ON orders (buyer_id)",
    "CREATE INDEX IF NOT EXISTS orders_by_seller ON orders (seller_id)",
    "CREATE TABLE IF NOT EXISTS order_numbers (
        order_number text PRIMARY KEY,
        order_id uuid
    )",
    "CREATE TABLE IF NOT EXISTS order_numbers_by_day (
        day text,
        seq int,
        order_number text,
        PRIMARY KEY (day, seq)
    ) WITH CLUSTERING ORDER BY (seq DESC)",
];

pub struct ScyllaOrderStore {
    session: Arc<Session>,
}

impl ScyllaOrderStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Connect, create the keyspace and tables if needed
    pub async fn connect(nodes: &[String], keyspace: &str) -> StoreResult<Self> {
        tracing::info!(nodes = ?nodes, keyspace = %keyspace, "Connecting to ScyllaDB...");

        let mut builder = SessionBuilder::new();
        for node in nodes {
            builder = builder.known_node(node);
        }
        let session: Session = builder.build().await.map_err(StoreError::backend)?;

        session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                    keyspace
                ),
                &[],
            )
            .await
            .map_err(StoreError::backend)?;
        session
            .use_keyspace(keyspace, false)
            .await
            .map_err(StoreError::backend)?;

        for statement in SCHEMA {
            session
                .query_unpaged(statement, &[])
                .await
                .map_err(StoreError::backend)?;
        }

        tracing::info!(keyspace = %keyspace, "✅ ScyllaDB order schema ready");
        Ok(Self::new(Arc::new(session)))
    }

    /// Read the `[applied]` column of a lightweight-transaction response
    fn lwt_applied(row: &Row) -> StoreResult<bool> {
        match row.columns.first() {
            Some(Some(CqlValue::Boolean(applied))) => Ok(*applied),
            _ => Err(StoreError::Backend(
                "LWT response without [applied] column".to_string(),
            )),
        }
    }

    fn decode(doc: &str, is_read: Option<bool>, invoice: Option<String>) -> StoreResult<Order> {
        let mut order: Order = serde_json::from_str(doc).map_err(StoreError::backend)?;
        if let Some(is_read) = is_read {
            order.is_read = is_read;
        }
        if let Some(invoice) = invoice {
            order.invoice = Some(serde_json::from_str(&invoice).map_err(StoreError::backend)?);
        }
        Ok(order)
    }

    /// `ORD-20261019-` -> `20261019`
    fn day_of_prefix(prefix: &str) -> Option<&str> {
        prefix
            .strip_prefix("ORD-")
            .map(|rest| rest.trim_end_matches('-'))
            .filter(|day| day.len() == 8 && day.chars().all(|c| c.is_ascii_digit()))
    }

    async fn load_party_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let (query, party) = match (&filter.seller_id, &filter.buyer_id) {
            (Some(seller_id), _) => (
                "SELECT doc, is_read, invoice FROM orders WHERE seller_id = ?",
                seller_id,
            ),
            (None, Some(buyer_id)) => (
                "SELECT doc, is_read, invoice FROM orders WHERE buyer_id = ?",
                buyer_id,
            ),
            (None, None) => {
                return Err(StoreError::Backend(
                    "order filter must name a buyer or a seller".to_string(),
                ))
            }
        };

        let result = self
            .session
            .query_unpaged(query, (party,))
            .await
            .map_err(StoreError::backend)?;

        let mut orders = Vec::new();
        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(orders),
        };

        for row in rows_result
            .rows::<(String, Option<bool>, Option<String>)>()
            .map_err(StoreError::backend)?
        {
            let (doc, is_read, invoice) = row.map_err(StoreError::backend)?;
            let order = Self::decode(&doc, is_read, invoice)?;
            if filter.matches(&order) {
                orders.push(order);
            }
        }

        tracing::debug!(count = orders.len(), "Loaded party orders from ScyllaDB");
        Ok(orders)
    }
}

#[async_trait]
impl OrderStore for ScyllaOrderStore {
    async fn find_max_order_number_for_prefix(&self, prefix: &str) -> StoreResult<Option<String>> {
        let Some(day) = Self::day_of_prefix(prefix) else {
            return Ok(None);
        };

        let result = self
            .session
            .query_unpaged(
                "SELECT order_number FROM order_numbers_by_day WHERE day = ? LIMIT 1",
                (day,),
            )
            .await
            .map_err(StoreError::backend)?;

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(None),
        };

        match rows_result.maybe_first_row::<(String,)>() {
            Ok(Some((order_number,))) => Ok(Some(order_number)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::backend(e)),
        }
    }

    async fn exists_order_number(&self, order_number: &str) -> StoreResult<bool> {
        let result = self
            .session
            .query_unpaged(
                "SELECT order_id FROM order_numbers WHERE order_number = ?",
                (order_number,),
            )
            .await
            .map_err(StoreError::backend)?;

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(false),
        };

        match rows_result.maybe_first_row::<(Uuid,)>() {
            Ok(found) => Ok(found.is_some()),
            Err(e) => Err(StoreError::backend(e)),
        }
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let claimed = self
            .session
            .query_unpaged(
                "INSERT INTO order_numbers (order_number, order_id) VALUES (?, ?) IF NOT EXISTS",
                (&order.order_number, order.id),
            )
            .await
            .map_err(StoreError::backend)?
            .into_rows_result()
            .map_err(StoreError::backend)?
            .first_row::<Row>()
            .map_err(StoreError::backend)?;

        if !Self::lwt_applied(&claimed)? {
            return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
        }

        let doc = serde_json::to_string(order).map_err(StoreError::backend)?;
        self.session
            .query_unpaged(
                "INSERT INTO orders (id, order_number, buyer_id, seller_id, status, is_read, created_at, doc)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
                (
                    order.id,
                    &order.order_number,
                    &order.buyer_id,
                    &order.seller_id,
                    order.status.as_str(),
                    order.is_read,
                    order.created_at,
                    doc,
                ),
            )
            .await
            .map_err(StoreError::backend)?;

        let prefix_day = order
            .order_number
            .rsplit_once('-')
            .and_then(|(prefix, _)| Self::day_of_prefix(prefix));
        if let Some(day) = prefix_day {
            let seq = order_number_suffix(&order.order_number) as i32;
            self.session
                .query_unpaged(
                    "INSERT INTO order_numbers_by_day (day, seq, order_number) VALUES (?, ?, ?)",
                    (day, seq, &order.order_number),
                )
                .await
                .map_err(StoreError::backend)?;
        }

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            "✅ Inserted order into ScyllaDB"
        );
        Ok(())
    }

    async fn find_order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        let result = self
            .session
            .query_unpaged(
                "SELECT doc, is_read, invoice FROM orders WHERE id = ?",
                (order_id,),
            )
            .await
            .map_err(StoreError::backend)?;

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(None),
        };

        match rows_result.maybe_first_row::<(String, Option<bool>, Option<String>)>() {
            Ok(Some((doc, is_read, invoice))) => Ok(Some(Self::decode(&doc, is_read, invoice)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::backend(e)),
        }
    }

    async fn conditional_update_status(
        &self,
        order_id: Uuid,
        expected_from: OrderStatus,
        patch: &StatusPatch,
    ) -> StoreResult<ConditionalUpdate> {
        let Some(mut order) = self.find_order(order_id).await? else {
            return Ok(ConditionalUpdate::NotFound);
        };
        if order.status != expected_from {
            return Ok(ConditionalUpdate::Conflict);
        }

        // Every other document field only changes through a status transition,
        // so guarding on status protects the whole document.
        order.apply_patch(patch);
        let doc = serde_json::to_string(&order).map_err(StoreError::backend)?;

        let row = self
            .session
            .query_unpaged(
                "UPDATE orders SET status = ?, doc = ? WHERE id = ? IF status = ?",
                (patch.to.as_str(), doc, order_id, expected_from.as_str()),
            )
            .await
            .map_err(StoreError::backend)?
            .into_rows_result()
            .map_err(StoreError::backend)?
            .first_row::<Row>()
            .map_err(StoreError::backend)?;

        if Self::lwt_applied(&row)? {
            tracing::debug!(
                order_id = %order_id,
                from = %expected_from,
                to = %patch.to,
                "LWT status update applied"
            );
            Ok(ConditionalUpdate::Applied(order))
        } else {
            Ok(ConditionalUpdate::Conflict)
        }
    }

    async fn count_by_filter(&self, filter: &OrderFilter) -> StoreResult<u64> {
        Ok(self.load_party_orders(filter).await?.len() as u64)
    }

    async fn find_by_filter(&self, filter: &OrderFilter, limit: usize) -> StoreResult<Vec<Order>> {
        let mut orders = self.load_party_orders(filter).await?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(limit);
        Ok(orders)
    }

    async fn mark_read_for_seller(&self, seller_id: &str, order_ids: &[Uuid]) -> StoreResult<u64> {
        let mut changed = 0;
        for order_id in order_ids {
            let unread_for_seller = self
                .find_order(*order_id)
                .await?
                .is_some_and(|order| order.seller_id == seller_id && !order.is_read);
            if !unread_for_seller {
                continue;
            }

            self.session
                .query_unpaged("UPDATE orders SET is_read = true WHERE id = ?", (*order_id,))
                .await
                .map_err(StoreError::backend)?;
            changed += 1;
        }

        Ok(changed)
    }

    async fn set_invoice(&self, order_id: Uuid, invoice: &Invoice) -> StoreResult<()> {
        let encoded = serde_json::to_string(invoice).map_err(StoreError::backend)?;
        self.session
            .query_unpaged(
                "UPDATE orders SET invoice = ? WHERE id = ?",
                (encoded, order_id),
            )
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_day_of_prefix() {
        assert_eq!(ScyllaOrderStore::day_of_prefix("ORD-20261019-"), Some("20261019"));
        assert_eq!(ScyllaOrderStore::day_of_prefix("ORD-20261019"), Some("20261019"));
        assert_eq!(ScyllaOrderStore::day_of_prefix("ORD-1760860800000"), None);
        assert_eq!(ScyllaOrderStore::day_of_prefix("INV-20261019-"), None);
    }

    #[test]
    fn test_decode_prefers_independent_columns() {
        let order = Order::new_pending(
            "ORD-20261019-001".to_string(),
            "b".to_string(),
            "s".to_string(),
            vec![],
            None,
        );
        let doc = serde_json::to_string(&order).unwrap();
        let invoice = serde_json::to_string(&Invoice::generated("http://x/1.pdf", Utc::now())).unwrap();

        let decoded = ScyllaOrderStore::decode(&doc, Some(true), Some(invoice)).unwrap();
        assert!(decoded.is_read);
        assert!(decoded.invoice.unwrap().generated);
    }
}
