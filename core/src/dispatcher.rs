use crate::coalesce::CoalesceStats;
use crate::coalesce::RequestCoalescer;
use crate::config::ClientConfig;
use crate::error::CartError;
use crate::projection::PendingOperation;
use crate::projection::ProjectionEngine;
use crate::retry::RetryLimits;
use crate::retry::RetrySender;
use crate::session::SessionHandle;
use crate::store::CartStore;
use crate::transport::CartRequest;
use crate::transport::CartTransport;
use crate::transport::HttpTransport;
use serde_json::json;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use tracing::debug;
use trolley_protocol::Cart;
use trolley_protocol::MutationIntent;

/// Façade over the whole request layer.
///
/// Turns a caller's [`MutationIntent`] into an outbound request with the
/// right version precondition and a stable idempotency key, optionally
/// applies it to the local view first, and reconciles the pending log when
/// the request resolves. A dispatched mutation always reaches a terminal
/// state: confirmed into the store or rolled back, except that a network
/// failure leaves the speculative change pending because the mutation may
/// still have been applied server-side.
pub struct CartClient {
    config: ClientConfig,
    store: Arc<CartStore>,
    projection: ProjectionEngine,
    sender: RetrySender,
    coalescer: Arc<RequestCoalescer>,
    last_error: Mutex<Option<CartError>>,
}

impl CartClient {
    pub fn new(
        config: ClientConfig,
        session: Arc<dyn SessionHandle>,
    ) -> Result<Self, CartError> {
        let transport = HttpTransport::new(&config)
            .map_err(|err| CartError::Network(err.to_string()))?;
        Ok(Self::with_transport(config, Arc::new(transport), session))
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn CartTransport>,
        session: Arc<dyn SessionHandle>,
    ) -> Self {
        let coalescer = Arc::new(RequestCoalescer::new(config.coalesce_capacity));
        let store = Arc::new(CartStore::new(
            Arc::clone(&transport),
            Arc::clone(&coalescer),
            config.read_ttl,
        ));
        let projection = ProjectionEngine::new(Arc::clone(&store));
        let sender = RetrySender::new(
            transport,
            session,
            Arc::clone(&store),
            RetryLimits::from(&config),
        );
        Self {
            config,
            store,
            projection,
            sender,
            coalescer,
            last_error: Mutex::new(None),
        }
    }

    /// Coalesced read of the canonical cart. `Ok(None)` means no cart exists
    /// yet; the next mutation will go out without a precondition and the
    /// server will create one.
    pub async fn load(&self) -> Result<Option<Cart>, CartError> {
        match self.store.load().await {
            Ok(cart) => {
                self.projection.refresh();
                Ok(cart)
            }
            Err(err) => {
                self.record_error(&err);
                Err(err)
            }
        }
    }

    /// Dispatches a mutation and returns the derived view after it resolved.
    pub async fn mutate(&self, intent: MutationIntent) -> Result<Cart, CartError> {
        let op = PendingOperation::new(intent.clone());
        let op_id = op.id;
        if self.config.optimistic && self.plausible_target(&intent) {
            let applied = self.projection.apply_optimistic(op);
            debug!(%op_id, applied, intent = intent.describe(), "optimistic apply");
        }

        match self.sender.send(Self::request_for(&intent)).await {
            Ok(cart) => {
                self.projection.finalize(op_id, cart.clone());
                self.clear_error();
                Ok(self.projection.current_view().unwrap_or(cart))
            }
            Err(err) => {
                if err.fate_unknown() {
                    // the server may still apply it; keep the speculative
                    // change visible so the caller can offer a retry
                    debug!(%op_id, "mutation fate unknown, leaving pending");
                } else {
                    self.projection.rollback(op_id);
                }
                self.record_error(&err);
                Err(err)
            }
        }
    }

    pub fn current_view(&self) -> Option<Cart> {
        self.projection.current_view()
    }

    pub fn pending_operation_count(&self) -> usize {
        self.projection.pending_count()
    }

    pub fn last_error(&self) -> Option<CartError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn read_stats(&self) -> CoalesceStats {
        self.coalescer.stats()
    }

    fn request_for(intent: &MutationIntent) -> CartRequest {
        match intent {
            MutationIntent::AddItem {
                product_id,
                quantity,
            } => CartRequest::post(
                "/api/cart/items",
                json!({"product_id": product_id, "quantity": quantity}),
            ),
            MutationIntent::UpdateQuantity { line_id, quantity } => CartRequest::patch(
                format!("/api/cart/items/{line_id}"),
                json!({"quantity": quantity}),
            ),
            MutationIntent::RemoveItem { line_id } => {
                CartRequest::delete(format!("/api/cart/items/{line_id}"))
            }
        }
    }

    /// Whether the current derived view holds a line this intent could act
    /// on. Without one there is nothing to show speculatively (new line ids
    /// are server-assigned), so the op is dispatched without touching the
    /// view.
    fn plausible_target(&self, intent: &MutationIntent) -> bool {
        let Some(view) = self.projection.current_view() else {
            return false;
        };
        match intent {
            MutationIntent::AddItem { product_id, .. } => {
                view.line_for_product(product_id).is_some()
            }
            MutationIntent::UpdateQuantity { line_id, .. }
            | MutationIntent::RemoveItem { line_id } => view.line(line_id).is_some(),
        }
    }

    fn record_error(&self, err: &CartError) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(err.clone());
    }

    fn clear_error(&self) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
