//! End-to-end tests of payment confirmation against a mock order service.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use discovery_gateway::config::NodeConfig;
use discovery_gateway::payments::{Payment, PaymentLedger, PaymentStatus};

mod common;

/// Registry plus payments on one node, gateway off.
fn payments_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.gateway.enabled = false;
    config.payments.enabled = true;
    config.admin.enabled = true;
    config.admin.api_key = "test-key".into();
    config
}

fn seed(node: &common::TestNode) {
    for id in 1..=5 {
        node.ledger.insert(Payment {
            id,
            order_id: id * 10,
            status: PaymentStatus::Criado,
        });
    }
}

async fn confirm(node: &common::TestNode, id: u64) -> (u16, serde_json::Value) {
    let res = common::client()
        .patch(node.url(&format!("/pagamentos/{id}/confirmar")))
        .send()
        .await
        .unwrap();
    let status = res.status().as_u16();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn test_confirmed_with_order_update() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let orders = common::start_programmable_backend(move |req| {
        recorder.lock().unwrap().push(req);
        async { (200, "{}".to_string()) }
    })
    .await;

    let node = common::start_node(payments_config()).await;
    seed(&node);
    common::register(&node, "pedidos", "orders-1", orders).await;

    let (status, body) = confirm(&node, 1).await;
    assert_eq!(status, 200);
    assert_eq!(body, serde_json::json!({ "id": 1, "orderId": 10, "status": "CONFIRMADO" }));
    assert_eq!(node.ledger.get(1).unwrap().status, PaymentStatus::Confirmado);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].method, "PUT");
    assert_eq!(seen[0].path, "/pedidos/10/pago");

    node.shutdown.trigger();
}

#[tokio::test]
async fn test_order_failure_confirms_without_integration() {
    let orders = common::start_programmable_backend(|_| async { (500, "boom".to_string()) }).await;

    let node = common::start_node(payments_config()).await;
    seed(&node);
    common::register(&node, "pedidos", "orders-1", orders).await;

    let (status, body) = confirm(&node, 1).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "CONFIRMADO_SEM_INTEGRACAO");

    // Confirming again returns the recorded outcome.
    let (status, body) = confirm(&node, 1).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "CONFIRMADO_SEM_INTEGRACAO");

    node.shutdown.trigger();
}

#[tokio::test]
async fn test_open_breaker_stops_calling_order_service() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let orders = common::start_programmable_backend(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { (503, "down".to_string()) }
    })
    .await;

    let node = common::start_node(payments_config()).await;
    seed(&node);
    common::register(&node, "pedidos", "orders-1", orders).await;

    for id in 1..=3 {
        let (status, body) = confirm(&node, id).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "CONFIRMADO_SEM_INTEGRACAO");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2, "third call must be short-circuited");

    let breakers: serde_json::Value = common::client()
        .get(node.url("/admin/breakers"))
        .bearer_auth("test-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(breakers[0]["name"], "orders.updateStatus");
    assert_eq!(breakers[0]["state"], "OPEN");

    // An operator reset lets the next confirmation through again.
    let res = common::client()
        .post(node.url("/admin/breakers/orders.updateStatus/reset"))
        .bearer_auth("test-key")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    confirm(&node, 4).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    node.shutdown.trigger();
}

#[tokio::test]
async fn test_no_order_instance_confirms_without_integration() {
    let node = common::start_node(payments_config()).await;
    seed(&node);

    let (status, body) = confirm(&node, 2).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "CONFIRMADO_SEM_INTEGRACAO");

    node.shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_and_cancelled_payments() {
    let node = common::start_node(payments_config()).await;
    node.ledger.insert(Payment {
        id: 7,
        order_id: 70,
        status: PaymentStatus::Cancelado,
    });

    let (status, body) = confirm(&node, 404).await;
    assert_eq!(status, 404);
    assert!(body["error"].is_string());

    let (status, _) = confirm(&node, 7).await;
    assert_eq!(status, 409);

    node.shutdown.trigger();
}

#[tokio::test]
async fn test_discovers_orders_through_remote_registry() {
    let orders = common::start_mock_backend("{}").await;

    let mut registry_config = NodeConfig::default();
    registry_config.gateway.enabled = false;
    let registry = common::start_node(registry_config).await;
    common::register(&registry, "pedidos", "orders-1", orders).await;

    let mut config = payments_config();
    config.registry.enabled = false;
    config.discovery.registry_url = Some(format!("http://{}", registry.addr));
    let node = common::start_node(config).await;
    seed(&node);

    let (status, body) = confirm(&node, 3).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "CONFIRMADO");

    node.shutdown.trigger();
    registry.shutdown.trigger();
}
