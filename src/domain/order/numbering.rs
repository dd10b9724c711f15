use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::metrics::Metrics;
use crate::store::{order_number_suffix, DailyCounter, OrderStore};

// ============================================================================
// Order Number Generator
// ============================================================================
//
// Produces `ORD-<YYYYMMDD>-<seq>` (UTC day, sequence padded to 3 digits).
//
// 1. Day counter (when configured): atomic increment, candidate verified absent
// 2. Scan-and-check: max existing suffix + 1, bumped while taken, bounded
// 3. `ORD-<epochMillis>` so order placement never blocks on numbering
//
// Step 2 is not linearizable on its own; the store rejects duplicates at
// insert and order creation regenerates in that case.
//
// ============================================================================

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

pub struct OrderNumberGenerator {
    store: Arc<dyn OrderStore>,
    counter: Option<Arc<dyn DailyCounter>>,
    max_attempts: u32,
    metrics: Option<Arc<Metrics>>,
}

impl OrderNumberGenerator {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            counter: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            metrics: None,
        }
    }

    pub fn with_counter(mut self, counter: Arc<dyn DailyCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn generate(&self) -> String {
        self.generate_at(Utc::now()).await
    }

    /// The day is fixed from `now` for the whole call
    pub async fn generate_at(&self, now: DateTime<Utc>) -> String {
        let day = now.format("%Y%m%d").to_string();
        let prefix = format!("ORD-{}-", day);

        if let Some(ref counter) = self.counter {
            match self.from_counter(counter.as_ref(), &day, &prefix).await {
                Some(order_number) => return order_number,
                None => self.record_fallback("scan"),
            }
        }

        if let Some(order_number) = self.scan_and_check(&prefix).await {
            return order_number;
        }

        let fallback = format!("ORD-{}", Utc::now().timestamp_millis());
        tracing::warn!(
            prefix = %prefix,
            attempts = self.max_attempts,
            order_number = %fallback,
            "Order numbering exhausted, using timestamp fallback"
        );
        self.record_fallback("timestamp");
        fallback
    }

    async fn from_counter(
        &self,
        counter: &dyn DailyCounter,
        day: &str,
        prefix: &str,
    ) -> Option<String> {
        let seq = match counter.increment(day).await {
            Ok(seq) => seq,
            Err(e) => {
                tracing::warn!(day = %day, error = %e, "Day counter unavailable");
                return None;
            }
        };

        let candidate = format_number(prefix, seq);
        match self.store.exists_order_number(&candidate).await {
            Ok(false) => {
                tracing::debug!(order_number = %candidate, "Order number drawn from day counter");
                Some(candidate)
            }
            Ok(true) => {
                tracing::warn!(
                    order_number = %candidate,
                    "Day counter handed out a taken number, counter is behind the store"
                );
                None
            }
            Err(e) => {
                tracing::error!(order_number = %candidate, error = %e, "Existence check failed");
                None
            }
        }
    }

    async fn scan_and_check(&self, prefix: &str) -> Option<String> {
        let max = match self.store.find_max_order_number_for_prefix(prefix).await {
            Ok(max) => max,
            Err(e) => {
                tracing::error!(prefix = %prefix, error = %e, "Max order number lookup failed");
                return None;
            }
        };

        let mut seq = max.as_deref().map(order_number_suffix).unwrap_or(0) + 1;

        for attempt in 1..=self.max_attempts {
            let candidate = format_number(prefix, seq);
            match self.store.exists_order_number(&candidate).await {
                Ok(false) => {
                    tracing::debug!(order_number = %candidate, attempt, "Order number assigned");
                    return Some(candidate);
                }
                Ok(true) => {
                    tracing::debug!(order_number = %candidate, attempt, "Candidate taken, bumping");
                    seq += 1;
                }
                Err(e) => {
                    tracing::error!(order_number = %candidate, error = %e, "Existence check failed");
                    return None;
                }
            }
        }

        None
    }

    fn record_fallback(&self, fallback: &str) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_number_fallback(fallback);
        }
    }
}

fn format_number(prefix: &str, seq: u32) -> String {
    format!("{}{:03}", prefix, seq)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Order, OrderItem};
    use crate::store::{InMemoryDailyCounter, InMemoryOrderStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    async fn seed(store: &InMemoryOrderStore, number: &str) {
        let order = Order::new_pending(
            number.to_string(),
            "b".to_string(),
            "s".to_string(),
            vec![OrderItem::new("sku", 1, 1.0)],
            None,
        );
        store.insert_order(&order).await.unwrap();
    }

    struct BrokenCounter;

    #[async_trait]
    impl DailyCounter for BrokenCounter {
        async fn increment(&self, _day: &str) -> StoreResult<u32> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_first_number_of_the_day() {
        let store = Arc::new(InMemoryOrderStore::new());
        let generator = OrderNumberGenerator::new(store);
        assert_eq!(generator.generate_at(day()).await, "ORD-20261019-001");
    }

    #[tokio::test]
    async fn test_continues_after_highest_suffix() {
        let store = Arc::new(InMemoryOrderStore::new());
        for n in ["ORD-20261019-001", "ORD-20261019-002", "ORD-20261019-003", "ORD-20261018-009"] {
            seed(&store, n).await;
        }

        let generator = OrderNumberGenerator::new(store);
        assert_eq!(generator.generate_at(day()).await, "ORD-20261019-004");
    }

    #[tokio::test]
    async fn test_unparseable_suffix_counts_as_zero() {
        let store = Arc::new(InMemoryOrderStore::new());
        seed(&store, "ORD-20261019-abc").await;

        let generator = OrderNumberGenerator::new(store);
        assert_eq!(generator.generate_at(day()).await, "ORD-20261019-001");
    }

    #[tokio::test]
    async fn test_counter_path_and_fallback_to_scan() {
        let store = Arc::new(InMemoryOrderStore::new());
        seed(&store, "ORD-20261019-001").await;

        // Counter starts at 1, which is taken: falls back to scan
        let generator = OrderNumberGenerator::new(store.clone())
            .with_counter(Arc::new(InMemoryDailyCounter::new()));
        assert_eq!(generator.generate_at(day()).await, "ORD-20261019-002");

        // Counter now at 2, free
        seed(&store, "ORD-20261019-002").await;
        let counter = Arc::new(InMemoryDailyCounter::new());
        counter.increment("20261019").await.unwrap();
        counter.increment("20261019").await.unwrap();
        let generator = OrderNumberGenerator::new(store).with_counter(counter);
        assert_eq!(generator.generate_at(day()).await, "ORD-20261019-003");
    }

    #[tokio::test]
    async fn test_broken_counter_degrades_to_scan() {
        let store = Arc::new(InMemoryOrderStore::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let generator = OrderNumberGenerator::new(store)
            .with_counter(Arc::new(BrokenCounter))
            .with_metrics(metrics.clone());

        assert_eq!(generator.generate_at(day()).await, "ORD-20261019-001");
        assert_eq!(
            metrics.order_number_fallbacks.with_label_values(&["scan"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_exhaustion_falls_back_to_timestamp() {
        struct AlwaysTaken;

        #[async_trait]
        impl OrderStore for AlwaysTaken {
            async fn find_max_order_number_for_prefix(&self, _: &str) -> StoreResult<Option<String>> {
                Ok(None)
            }
            async fn exists_order_number(&self, _: &str) -> StoreResult<bool> {
                Ok(true)
            }
            async fn insert_order(&self, _: &Order) -> StoreResult<()> {
                Ok(())
            }
            async fn find_order(&self, _: uuid::Uuid) -> StoreResult<Option<Order>> {
                Ok(None)
            }
            async fn conditional_update_status(
                &self,
                _: uuid::Uuid,
                _: crate::domain::order::OrderStatus,
                _: &crate::domain::order::StatusPatch,
            ) -> StoreResult<crate::store::ConditionalUpdate> {
                Ok(crate::store::ConditionalUpdate::NotFound)
            }
            async fn count_by_filter(&self, _: &crate::store::OrderFilter) -> StoreResult<u64> {
                Ok(0)
            }
            async fn find_by_filter(
                &self,
                _: &crate::store::OrderFilter,
                _: usize,
            ) -> StoreResult<Vec<Order>> {
                Ok(vec![])
            }
            async fn mark_read_for_seller(&self, _: &str, _: &[uuid::Uuid]) -> StoreResult<u64> {
                Ok(0)
            }
            async fn set_invoice(
                &self,
                _: uuid::Uuid,
                _: &crate::domain::order::Invoice,
            ) -> StoreResult<()> {
                Ok(())
            }
        }

        let generator = OrderNumberGenerator::new(Arc::new(AlwaysTaken)).with_max_attempts(3);
        let number = generator.generate_at(day()).await;

        assert!(number.starts_with("ORD-"));
        assert!(!number.starts_with("ORD-20261019-"));
        assert!(number["ORD-".len()..].parse::<i64>().is_ok());
    }

    #[test]
    fn test_padding_is_a_minimum_width() {
        assert_eq!(format_number("ORD-20261019-", 7), "ORD-20261019-007");
        assert_eq!(format_number("ORD-20261019-", 1000), "ORD-20261019-1000");
    }
}
