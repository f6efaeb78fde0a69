// Rust Client Example: Socket requests and events
// Demonstrates the spar client against a socket server
// - HTTP-style requests over the socket (HTTP fallback while it is down)
// - Filtered subscriptions
// - Forwarding onto a scope

use anyhow::Result;
use serde_json::json;
use spar_client::{Client, ClientConfig, ContextRef, Scope};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Spar Rust Client - Socket Example");

    let config = ClientConfig {
        socket_url: Some("ws://localhost:3000/socket".to_string()),
        fallback_base_url: Some("http://localhost:3000/".to_string()),
        ..Default::default()
    };

    let root = Scope::root();
    let client = Client::builder()
        .config(config)
        .default_context(Arc::new(root.clone()))
        .build()?;
    info!("Client created, connection: {:?}", client.connection_state());

    // Give the socket a moment to come up
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("Request 1: list orders");
    match client.get("/orders", None).await {
        Ok(reply) => info!("Orders: {}", reply),
        Err(e) => info!("Listing orders failed: {}", e),
    }

    info!("Request 2: create an order");
    client
        .post("/orders", json!({"sku": "A-1", "qty": 2}), None)
        .success(|reply| info!("Created: {}", reply))
        .error(|errors, status| info!("Create failed: status={:?} errors={:?}", status, errors))
        .await
        .ok();

    let subscription = client.on_id("Order", 42, |message| {
        info!("Order 42 changed: {}", message);
    });

    let view = root.child();
    let mut events = view.subscribe();
    let target: ContextRef = Arc::new(view.clone());
    client.forward("Order", Some(target));

    info!("Waiting for events on '{}'", subscription.channel());
    if let Ok(Ok(event)) = tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
        info!("Forwarded '{}': {}", event.name, event.payload);
    }

    subscription.unsubscribe();
    root.destroy();
    info!("Done");
    Ok(())
}
