use chrono::Utc;
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::{Actor, Reply};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::{ComponentHealth, HealthStatus};
use crate::metrics::Metrics;
use crate::realtime::{ConnectionRegistry, RegistryStats};
use crate::store::RedisDailyCounter;
use crate::utils::CircuitState;

// ============================================================================
// Health Monitor Actor - Monitors system health
// ============================================================================
//
// Responsibilities:
// - Track health status of all components
// - Poll the Redis order counter breaker and the connection registry
// - Aggregate system-wide health for /health and the health gauge
//
// ============================================================================

const REFRESH_INTERVAL: Duration = Duration::from_secs(10);

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

/// Re-probe the components the monitor watches itself
#[derive(Debug)]
pub struct RefreshHealth;

#[derive(Debug)]
pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize, Reply)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub connections: RegistryStats,
    pub check_time: chrono::DateTime<Utc>,
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: HashMap<String, ComponentHealth>,
    registry: Arc<ConnectionRegistry>,
    order_counter: Option<Arc<RedisDailyCounter>>,
    metrics: Option<Arc<Metrics>>,
}

impl HealthMonitorActor {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            components: HashMap::new(),
            registry,
            order_counter: None,
            metrics: None,
        }
    }

    pub fn with_order_counter(mut self, counter: Arc<RedisDailyCounter>) -> Self {
        self.order_counter = Some(counter);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            unhealthy_components.sort();
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }

    fn record(&mut self, component: &str, status: HealthStatus, details: Option<String>) {
        let mut health = ComponentHealth::new(component, status);
        if let Some(details) = details {
            health = health.with_details(details);
        }

        tracing::debug!(
            component = %component,
            status = ?health.status,
            "Updated component health"
        );

        self.components.insert(component.to_string(), health);

        if let Some(ref metrics) = self.metrics {
            metrics.update_health_status(self.compute_overall_status().as_gauge());
        }
    }

    fn probe(&mut self) {
        if let Some(counter) = self.order_counter.clone() {
            let state = counter.breaker_state();
            if let Some(ref metrics) = self.metrics {
                metrics.update_circuit_breaker_state(state.as_gauge());
            }

            // The counter is an optimisation: numbering keeps working without it
            let status = match state {
                CircuitState::Closed => HealthStatus::Healthy,
                CircuitState::HalfOpen => {
                    HealthStatus::Degraded("Circuit breaker half-open".to_string())
                }
                CircuitState::Open => HealthStatus::Degraded(
                    "Circuit breaker open, numbering on scan fallback".to_string(),
                ),
            };
            self.record("order_counter", status, None);
        }

        let stats = self.registry.stats();
        self.record(
            "connection_registry",
            HealthStatus::Healthy,
            Some(format!(
                "{} connections ({} buyers, {} sellers)",
                stats.total_connections, stats.buyers, stats.sellers
            )),
        );
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(mut state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!("HealthMonitorActor started");
        state.probe();

        // Schedule periodic health checks
        let weak = actor_ref.downgrade();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REFRESH_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(actor_ref) = weak.upgrade() else {
                    break;
                };
                // Fire and forget - use tell
                if actor_ref.tell(RefreshHealth).send().await.is_err() {
                    break;
                }
            }
        });

        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.record(&msg.component, msg.status, msg.details);
    }
}

impl Message<RefreshHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, _msg: RefreshHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.probe();
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            connections: self.registry.stats(),
            check_time: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryIdentityStore, InMemoryOrderStore};

    fn monitor() -> ActorRef<HealthMonitorActor> {
        let registry = Arc::new(ConnectionRegistry::new(
            Arc::new(InMemoryIdentityStore::new()),
            Arc::new(InMemoryOrderStore::new()),
        ));
        HealthMonitorActor::spawn(HealthMonitorActor::new(registry))
    }

    #[tokio::test]
    async fn test_starts_healthy_with_registry_component() {
        let monitor = monitor();
        let health = monitor.ask(GetSystemHealth).await.unwrap();

        assert!(health.overall_status.is_healthy());
        assert!(health.components.contains_key("connection_registry"));
        assert_eq!(health.connections.total_connections, 0);
    }

    #[tokio::test]
    async fn test_unhealthy_component_dominates() {
        let monitor = monitor();
        monitor
            .tell(UpdateHealth {
                component: "order_store".to_string(),
                status: HealthStatus::Unhealthy("scylla unreachable".to_string()),
                details: None,
            })
            .send()
            .await
            .unwrap();

        let health = monitor.ask(GetSystemHealth).await.unwrap();
        assert!(health.overall_status.is_unhealthy());

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["overallStatus"]["state"], "unhealthy");
    }
}
