use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_lifecycle::actors::{EventBus, HealthMonitorActor, NotificationDispatcher};
use order_lifecycle::config::{AppConfig, StoreBackend};
use order_lifecycle::domain::order::{NewOrder, OrderItem, OrderNumberGenerator, OrderService, Role};
use order_lifecycle::metrics::{self, Metrics};
use order_lifecycle::realtime::{ClientSession, ConnectionRegistry, NotificationRouter, ServerMessage};
use order_lifecycle::services::{LocalInvoiceGenerator, LogEmailSender};
use order_lifecycle::store::{
    DailyCounter, IdentityStore, IdentitySummary, InMemoryIdentityStore, InMemoryOrderStore,
    OrderStore, RedisDailyCounter, ScyllaOrderStore,
};

use kameo::Actor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_lifecycle=debug")),
        )
        .init();

    tracing::info!("🚀 Starting Order Lifecycle & Real-Time Notification demo");

    let config = AppConfig::from_env()?;
    tracing::info!(store = ?config.store, redis = config.redis_url.is_some(), "Configuration loaded");

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Collaborator stores ===
    let identities = Arc::new(
        InMemoryIdentityStore::new().with_identity(Role::Seller, "seller-42", "Corner Bookshop"),
    );
    identities.insert(
        Role::Buyer,
        "buyer-7",
        IdentitySummary {
            display_name: "Ada Lovelace".to_string(),
            email: Some("ada@example.com".to_string()),
        },
    );
    let identities: Arc<dyn IdentityStore> = identities;

    let store: Arc<dyn OrderStore> = match config.store {
        StoreBackend::Memory => Arc::new(InMemoryOrderStore::new()),
        StoreBackend::Scylla => {
            Arc::new(ScyllaOrderStore::connect(&config.scylla_nodes, &config.scylla_keyspace).await?)
        }
    };

    let order_counter = match config.redis_url {
        Some(ref url) => match RedisDailyCounter::connect(url).await {
            Ok(counter) => Some(Arc::new(counter)),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, numbering uses scan-and-check");
                None
            }
        },
        None => None,
    };

    // === 3. Realtime + event bus ===
    let registry = Arc::new(
        ConnectionRegistry::new(identities.clone(), store.clone()).with_metrics(metrics.clone()),
    );
    let router = Arc::new(
        NotificationRouter::new(registry.clone(), identities.clone()).with_metrics(metrics.clone()),
    );
    let events = EventBus::spawn(
        NotificationDispatcher::new(router, identities.clone()).with_email(Arc::new(LogEmailSender)),
    );

    // === 4. Order service ===
    let mut numbering = OrderNumberGenerator::new(store.clone())
        .with_max_attempts(config.order_number_max_attempts)
        .with_metrics(metrics.clone());
    if let Some(ref counter) = order_counter {
        numbering = numbering.with_counter(counter.clone() as Arc<dyn DailyCounter>);
    }

    let orders = Arc::new(
        OrderService::new(
            store.clone(),
            identities.clone(),
            numbering,
            Arc::new(LocalInvoiceGenerator::new(config.invoice_base_url.clone())),
            Arc::new(events),
        )
        .with_metrics(metrics.clone()),
    );

    // === 5. Health monitor + metrics server ===
    let mut monitor = HealthMonitorActor::new(registry.clone()).with_metrics(metrics.clone());
    if let Some(ref counter) = order_counter {
        monitor = monitor.with_order_counter(counter.clone());
    }
    let health = HealthMonitorActor::spawn(monitor);

    // Start metrics HTTP server in background thread
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!("Metrics runtime error: {}", e);
                return;
            }
        };
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(metrics_registry, health, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 6. Two live connections ===
    let (mut seller, seller_rx) = ClientSession::open(registry.clone(), orders.clone(), config.connection_buffer);
    let (mut buyer, buyer_rx) = ClientSession::open(registry.clone(), orders.clone(), config.connection_buffer);
    let seller_log = tokio::spawn(drain("seller-42", seller_rx));
    let buyer_log = tokio::spawn(drain("buyer-7", buyer_rx));

    seller
        .receive(&json!({"type": "join", "role": "seller", "identityId": "seller-42"}).to_string())
        .await?;
    buyer
        .receive(&json!({"type": "join", "role": "buyer", "identityId": "buyer-7"}).to_string())
        .await?;

    // === 7. Demonstrate full order lifecycle ===
    tracing::info!("📝 Demonstrating order lifecycle with live notifications");

    let order = orders
        .create_order(NewOrder {
            buyer_id: "buyer-7".to_string(),
            seller_id: "seller-42".to_string(),
            items: vec![
                OrderItem::new("book-0451", 2, 12.5),
                OrderItem::new("tote-bag", 1, 8.0).with_color("green"),
            ],
            notes: None,
        })
        .await?;
    tracing::info!(order_number = %order.order_number, "✅ Order created");

    for status in ["Processing", "Shipped"] {
        seller
            .receive(&json!({"type": "updateStatus", "orderId": order.id, "newStatus": status}).to_string())
            .await?;
    }

    // Rejected: buyers cannot cancel a shipped order
    buyer
        .receive(&json!({"type": "cancelOrder", "orderId": order.id, "reason": "changed my mind"}).to_string())
        .await?;

    seller
        .receive(
            &json!({"type": "updateStatus", "orderId": order.id, "newStatus": "Delivered", "notes": "Left at front door"})
                .to_string(),
        )
        .await?;

    seller
        .receive(&json!({"type": "listOrders", "limit": 10}).to_string())
        .await?;

    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    tracing::info!(stats = ?registry.stats(), "Connection registry");

    seller.close();
    buyer.close();
    drop(seller);
    drop(buyer);
    let _ = tokio::join!(seller_log, buyer_log);

    tracing::info!("🎉 Demo complete!");
    Ok(())
}

/// Stand-in for a socket writer: log everything queued for a connection
async fn drain(label: &'static str, mut rx: mpsc::Receiver<ServerMessage>) {
    while let Some(message) = rx.recv().await {
        match serde_json::to_string(&message) {
            Ok(text) => tracing::info!(connection = label, "⬅️ {}", text),
            Err(e) => tracing::warn!(connection = label, error = %e, "Unprintable message"),
        }
    }
}
