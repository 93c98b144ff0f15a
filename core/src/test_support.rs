//! Scripted transport and fixtures shared by the unit tests.

use crate::transport::CartRequest;
use crate::transport::CartTransport;
use crate::transport::TransportError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use trolley_protocol::Cart;
use trolley_protocol::CartTotals;
use trolley_protocol::LineItem;

/// In-memory transport that replays a scripted response per request, in
/// order, and records every request it saw. An optional delay per response
/// keeps the request "in flight" long enough for tests to overlap calls.
#[derive(Default)]
pub struct FakeTransport {
    script: Mutex<VecDeque<(Result<Cart, TransportError>, Duration)>>,
    seen: Mutex<Vec<CartRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Result<Cart, TransportError>) {
        self.push_delayed(response, Duration::ZERO);
    }

    pub fn push_delayed(&self, response: Result<Cart, TransportError>, delay: Duration) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((response, delay));
    }

    pub fn requests(&self) -> Vec<CartRequest> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mutation_requests(&self) -> Vec<CartRequest> {
        self.requests()
            .into_iter()
            .filter(CartRequest::is_mutation)
            .collect()
    }
}

#[async_trait]
impl CartTransport for FakeTransport {
    async fn execute(&self, request: CartRequest) -> Result<Cart, TransportError> {
        let (response, delay) = {
            self.seen
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request);
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or((
                    Err(TransportError::Network("script exhausted".to_string())),
                    Duration::ZERO,
                ))
        };
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        response
    }
}

/// A one-line cart at the given version: 2 × 500 on line `line-1`.
pub fn sample_cart(version: u64) -> Cart {
    cart_with_quantity(version, 2)
}

pub fn cart_with_quantity(version: u64, quantity: u32) -> Cart {
    let mut cart = Cart {
        id: "cart-1".to_string(),
        version,
        items: vec![LineItem {
            id: "line-1".to_string(),
            product_id: "prod-1".to_string(),
            name: "Widget".to_string(),
            quantity,
            unit_price: 500,
            adjustment: 0,
            line_total: 0,
        }],
        totals: CartTotals::default(),
    };
    cart.recompute_totals();
    cart
}
