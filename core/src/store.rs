use crate::coalesce::CoalesceKey;
use crate::coalesce::RequestCoalescer;
use crate::error::CartError;
use crate::retry::FailureClass;
use crate::retry::classify;
use crate::transport::CartRequest;
use crate::transport::CartTransport;
use crate::transport::TransportError;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use tracing::debug;
use trolley_protocol::Cart;

/// Read endpoint for the canonical cart representation.
pub const CART_PATH: &str = "/api/cart";

/// Outcome of handing a confirmed server response to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedState {
    Stored,
    /// The response carried a version not greater than what is already
    /// stored; the payload was ignored as out-of-order.
    StaleDiscarded,
}

/// Single owner of the last confirmed cart snapshot and its version.
///
/// Nothing else in the crate writes confirmed state: the retry engine and the
/// projection engine only read it or derive from it. Versions for a given
/// cart never move backwards through this type.
pub struct CartStore {
    transport: Arc<dyn CartTransport>,
    coalescer: Arc<RequestCoalescer>,
    read_ttl: Duration,
    confirmed: Mutex<Option<Cart>>,
}

impl CartStore {
    pub fn new(
        transport: Arc<dyn CartTransport>,
        coalescer: Arc<RequestCoalescer>,
        read_ttl: Duration,
    ) -> Self {
        Self {
            transport,
            coalescer,
            read_ttl,
            confirmed: Mutex::new(None),
        }
    }

    /// Fetches the canonical cart through the read coalescer and stores it.
    /// `Ok(None)` means the cart does not exist server-side yet; the first
    /// mutation then goes out without a version precondition and the server
    /// creates one.
    pub async fn load(&self) -> Result<Option<Cart>, CartError> {
        let transport = Arc::clone(&self.transport);
        let fetch = move || async move {
            let cart = transport.execute(CartRequest::get(CART_PATH)).await?;
            serde_json::to_value(&cart).map_err(|err| TransportError::Decode(err.to_string()))
        };
        let fetched = self
            .coalescer
            .get(CoalesceKey::from(CART_PATH), self.read_ttl, fetch)
            .await;
        match fetched {
            Ok(value) => {
                let cart: Cart = serde_json::from_value(value)
                    .map_err(|err| CartError::Decode(err.to_string()))?;
                self.apply_confirmed(cart.clone());
                Ok(Some(cart))
            }
            Err(err) => Self::map_read_failure(err),
        }
    }

    /// Fetches the canonical cart directly, bypassing the coalescer cache.
    /// Used to resynchronize after a version conflict, where a cached
    /// snapshot would resend the same stale precondition.
    pub async fn reload(&self) -> Result<Option<Cart>, CartError> {
        match self.transport.execute(CartRequest::get(CART_PATH)).await {
            Ok(cart) => {
                self.apply_confirmed(cart.clone());
                Ok(Some(cart))
            }
            Err(err) => Self::map_read_failure(err),
        }
    }

    /// Atomically replaces the confirmed snapshot. A response for the same
    /// cart whose version is not numerically greater than the stored one is
    /// out-of-order and discarded; callers still treat their own response as
    /// nominal success.
    pub fn apply_confirmed(&self, cart: Cart) -> AppliedState {
        let mut guard = self
            .confirmed
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = guard.as_ref()
            && existing.id == cart.id
            && cart.version <= existing.version
        {
            debug!(
                stored = existing.version,
                received = cart.version,
                "discarding out-of-order cart snapshot"
            );
            return AppliedState::StaleDiscarded;
        }
        *guard = Some(cart);
        AppliedState::Stored
    }

    pub fn current_version(&self) -> Option<u64> {
        self.confirmed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|cart| cart.version)
    }

    pub fn confirmed(&self) -> Option<Cart> {
        self.confirmed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn map_read_failure(err: TransportError) -> Result<Option<Cart>, CartError> {
        match classify(&err) {
            FailureClass::NotFound => Ok(None),
            class => Err(class.into_cart_error(0)),
        }
    }
}
