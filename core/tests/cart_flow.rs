//! Cart read/mutate flows over HTTP: coalescing, validation, sessions.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use trolley_core::CartClient;
use trolley_core::CartError;
use trolley_core::ClientConfig;
use trolley_core::NullSession;
use trolley_core::SessionHandle;
use trolley_core::SessionRefreshError;
use trolley_protocol::MutationIntent;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn cart_body(version: u64, quantity: u32) -> serde_json::Value {
    let line_total = i64::from(quantity) * 500;
    json!({
        "id": "cart-1",
        "version": version,
        "items": [{
            "id": "line-1",
            "product_id": "prod-1",
            "name": "Widget",
            "quantity": quantity,
            "unit_price": 500,
            "adjustment": 0,
            "line_total": line_total,
        }],
        "totals": {
            "item_count": quantity,
            "subtotal": line_total,
            "adjustment_total": 0,
            "grand_total": line_total,
        },
    })
}

#[tokio::test]
async fn validation_failure_returns_field_errors_and_rolls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_body(1, 2)))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/cart/items/line-1"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "The given data was invalid.",
            "errors": {"quantity": ["Insufficient stock for this item."]},
        })))
        .mount(&server)
        .await;

    let client = CartClient::new(
        ClientConfig::with_base_url(server.uri()),
        Arc::new(NullSession),
    )
    .expect("client");
    client.load().await.expect("load");

    let outcome = client
        .mutate(MutationIntent::UpdateQuantity {
            line_id: "line-1".to_string(),
            quantity: 99,
        })
        .await;

    match outcome {
        Err(CartError::Validation(errors)) => {
            assert_eq!(
                errors.field("quantity"),
                ["Insufficient stock for this item.".to_string()]
            );
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(client.pending_operation_count(), 0);
    let view = client.current_view().expect("view");
    assert_eq!(view.items[0].quantity, 2);
    assert!(matches!(client.last_error(), Some(CartError::Validation(_))));
}

#[tokio::test]
async fn concurrent_reads_coalesce_into_one_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cart"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cart_body(1, 2))
                .set_delay(Duration::from_millis(25)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = CartClient::new(
        ClientConfig::with_base_url(server.uri()),
        Arc::new(NullSession),
    )
    .expect("client");

    let (first, second) = tokio::join!(client.load(), client.load());
    let first = first.expect("first load").expect("cart");
    let second = second.expect("second load").expect("cart");
    assert_eq!(first, second);

    // a third read within the TTL is served from cache
    client.load().await.expect("third load");
    let stats = client.read_stats();
    assert_eq!(stats.coalesced, 1);
    assert_eq!(stats.hits, 1);
    // the mock's expect(1) verifies exactly one upstream call on drop
}

#[tokio::test]
async fn rate_limited_read_surfaces_retry_after_hint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cart"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .mount(&server)
        .await;

    let client = CartClient::new(
        ClientConfig::with_base_url(server.uri()),
        Arc::new(NullSession),
    )
    .expect("client");

    let outcome = client.load().await;
    assert_eq!(
        outcome,
        Err(CartError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        })
    );
}

#[derive(Default)]
struct RecordingSession {
    refreshes: AtomicUsize,
}

#[async_trait]
impl SessionHandle for RecordingSession {
    async fn refresh(&self) -> Result<(), SessionRefreshError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn invalidate_session(&self) {}
}

#[tokio::test]
async fn stale_session_is_refreshed_then_the_mutation_is_resent_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cart"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/cart/items"))
        .respond_with(ResponseTemplate::new(419))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/cart/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_body(1, 1)))
        .mount(&server)
        .await;

    let session = Arc::new(RecordingSession::default());
    let client = CartClient::new(
        ClientConfig::with_base_url(server.uri()),
        Arc::clone(&session) as Arc<dyn SessionHandle>,
    )
    .expect("client");

    let view = client
        .mutate(MutationIntent::AddItem {
            product_id: "prod-1".to_string(),
            quantity: 1,
        })
        .await
        .expect("mutate");
    assert_eq!(view.version, 1);
    assert_eq!(session.refreshes.load(Ordering::SeqCst), 1);
}
