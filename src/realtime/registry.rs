//! Live connection registry.
//!
//! Lock-free DashMap indexes in both directions:
//! - (role, identity) → handles, used by `resolve` on every publish
//! - connection → keys it joined, used by `leave`
//!
//! Shard guards are never held across an await, and never on both maps at
//! once; identity validation and the snapshot query run outside them.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::protocol::ServerMessage;
use super::snapshot::{build_snapshot, Snapshot};
use super::RealtimeError;
use crate::domain::order::{OrderError, Role};
use crate::metrics::Metrics;
use crate::store::{IdentityStore, OrderStore};

/// Unique connection identifier.
pub type ConnectionId = Uuid;

type IdentityKey = (Role, String);

/// Outbound side of one live connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    /// Create a handle with a bounded queue; the receiver feeds the socket.
    pub fn channel(buffer: usize) -> (Arc<Self>, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            tx,
            connected_at: Utc::now(),
        };
        (Arc::new(handle), rx)
    }

    /// Non-blocking send; a slow client loses the message rather than
    /// stalling the publisher.
    pub fn send(&self, msg: ServerMessage) -> Result<(), RealtimeError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => RealtimeError::BufferFull,
            TrySendError::Closed(_) => RealtimeError::ConnectionClosed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_connections: usize,
    pub buyers: usize,
    pub sellers: usize,
    pub identities: usize,
}

pub struct ConnectionRegistry {
    identities: Arc<dyn IdentityStore>,
    store: Arc<dyn OrderStore>,
    by_identity: DashMap<IdentityKey, HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    by_connection: DashMap<ConnectionId, HashSet<IdentityKey>>,
    metrics: Option<Arc<Metrics>>,
}

impl ConnectionRegistry {
    pub fn new(identities: Arc<dyn IdentityStore>, store: Arc<dyn OrderStore>) -> Self {
        Self {
            identities,
            store,
            by_identity: DashMap::new(),
            by_connection: DashMap::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register `handle` under (role, identity) and return the catch-up snapshot.
    pub async fn join(
        &self,
        role: Role,
        identity_id: &str,
        handle: Arc<ConnectionHandle>,
    ) -> Result<Snapshot, RealtimeError> {
        if !self.identities.exists(role, identity_id).await? {
            tracing::warn!(role = %role, identity_id = %identity_id, "Join refused: unknown identity");
            return Err(OrderError::IdentityNotFound {
                role,
                identity_id: identity_id.to_string(),
            }
            .into());
        }

        let key: IdentityKey = (role, identity_id.to_string());
        let connection_id = handle.id;

        self.by_connection
            .entry(connection_id)
            .or_default()
            .insert(key.clone());
        self.by_identity
            .entry(key.clone())
            .or_default()
            .insert(connection_id, handle.clone());

        // A disconnect that raced this join may already have run `leave`
        if handle.is_closed() {
            self.leave(connection_id);
            self.detach(&key, connection_id);
            return Err(RealtimeError::ConnectionClosed);
        }

        self.refresh_gauges();
        tracing::info!(
            connection_id = %connection_id,
            role = %role,
            identity_id = %identity_id,
            "🔌 Connection joined"
        );

        // Registered first: events committed from here on are pushed, and the
        // snapshot covers everything committed before.
        Ok(build_snapshot(self.store.as_ref(), role, identity_id).await?)
    }

    /// Drop the connection from every key it joined. Unknown ids are a no-op.
    pub fn leave(&self, connection_id: ConnectionId) -> usize {
        let Some((_, keys)) = self.by_connection.remove(&connection_id) else {
            return 0;
        };

        for key in &keys {
            self.detach(key, connection_id);
        }

        self.refresh_gauges();
        tracing::info!(connection_id = %connection_id, keys = keys.len(), "Connection left");
        keys.len()
    }

    fn detach(&self, key: &IdentityKey, connection_id: ConnectionId) {
        if let Some(mut handles) = self.by_identity.get_mut(key) {
            handles.remove(&connection_id);
        }
        self.by_identity.remove_if(key, |_, handles| handles.is_empty());
    }

    /// Live handles currently registered for (role, identity).
    pub fn resolve(&self, role: Role, identity_id: &str) -> Vec<Arc<ConnectionHandle>> {
        self.by_identity
            .get(&(role, identity_id.to_string()))
            .map(|handles| {
                handles
                    .values()
                    .filter(|handle| !handle.is_closed())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total_connections: self.by_connection.len(),
            identities: self.by_identity.len(),
            ..RegistryStats::default()
        };

        for entry in self.by_identity.iter() {
            match entry.key().0 {
                Role::Buyer => stats.buyers += entry.value().len(),
                Role::Seller => stats.sellers += entry.value().len(),
            }
        }
        stats
    }

    fn refresh_gauges(&self) {
        if let Some(ref metrics) = self.metrics {
            let stats = self.stats();
            metrics.set_active_connections(Role::Buyer.as_str(), stats.buyers);
            metrics.set_active_connections(Role::Seller.as_str(), stats.sellers);
        }
    }
}
