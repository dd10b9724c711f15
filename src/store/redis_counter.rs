use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;

use super::{DailyCounter, StoreError, StoreResult};
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

/// Counters outlive their day long enough to absorb clock skew around midnight
const COUNTER_TTL_SECS: i64 = 48 * 60 * 60;

// ============================================================================
// Redis Daily Counter
// ============================================================================
//
// INCR on `order_seq:<YYYYMMDD>` is an atomic upsert-and-increment, so two
// concurrent order creations can never draw the same sequence. A circuit
// breaker keeps a dead Redis from adding latency to every order placement;
// while it is open the numbering falls back to the scan-and-check path.
//
// ============================================================================

pub struct RedisDailyCounter {
    connection: MultiplexedConnection,
    breaker: CircuitBreaker,
    key_prefix: String,
}

impl RedisDailyCounter {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(StoreError::backend)?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(StoreError::backend)?;

        tracing::info!(url = %url, "Connected to Redis for order sequences");

        Ok(Self {
            connection,
            breaker: CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: 3,
                cool_down: Duration::from_secs(15),
                probe_successes: 1,
            }),
            key_prefix: "order_seq".to_string(),
        })
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    fn key(&self, day: &str) -> String {
        format!("{}:{}", self.key_prefix, day)
    }
}

#[async_trait]
impl DailyCounter for RedisDailyCounter {
    async fn increment(&self, day: &str) -> StoreResult<u32> {
        if !self.breaker.try_acquire() {
            return Err(StoreError::Backend("redis circuit breaker open".to_string()));
        }

        let key = self.key(day);
        let mut connection = self.connection.clone();
        let result: redis::RedisResult<(u32,)> = redis::pipe()
            .atomic()
            .incr(&key, 1)
            .expire(&key, COUNTER_TTL_SECS)
            .ignore()
            .query_async(&mut connection)
            .await;

        match result {
            Ok((seq,)) => {
                self.breaker.record_success();
                tracing::debug!(key = %key, seq = seq, "Drew order sequence from Redis");
                Ok(seq)
            }
            Err(e) => {
                self.breaker.record_failure();
                tracing::warn!(key = %key, error = %e, "Redis sequence increment failed");
                Err(StoreError::backend(e))
            }
        }
    }
}
