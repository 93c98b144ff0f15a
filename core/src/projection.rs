use crate::store::CartStore;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use tracing::debug;
use trolley_protocol::Cart;
use trolley_protocol::MutationIntent;
use uuid::Uuid;

/// A locally-applied, not-yet-confirmed mutation. Lives in the pending log
/// from dispatch until its request resolves; `finalize` and `rollback` are
/// the only exits, so every operation reaches exactly one terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub id: Uuid,
    pub intent: MutationIntent,
}

impl PendingOperation {
    pub fn new(intent: MutationIntent) -> Self {
        Self {
            id: Uuid::new_v4(),
            intent,
        }
    }
}

/// Derives the view shown to callers by replaying the pending log, in
/// creation order, over the store's confirmed snapshot.
///
/// The derived view is never authoritative: the store alone owns confirmed
/// state, and this engine recomputes from it after every change. Replaying in
/// creation order makes the displayed state deterministic regardless of the
/// order in which responses come back.
pub struct ProjectionEngine {
    store: Arc<CartStore>,
    pending: Mutex<Vec<PendingOperation>>,
    view: Mutex<Option<Cart>>,
}

impl ProjectionEngine {
    pub fn new(store: Arc<CartStore>) -> Self {
        Self {
            store,
            pending: Mutex::new(Vec::new()),
            view: Mutex::new(None),
        }
    }

    /// Appends `op` to the pending log and rebuilds the derived view.
    /// Requires a confirmed snapshot; before the first confirmed load nothing
    /// is applied and the op is not recorded. Returns whether the view
    /// actually changed (an add for a product with no existing line is a
    /// speculative no-op, since line identity is server-assigned).
    pub fn apply_optimistic(&self, op: PendingOperation) -> bool {
        let Some(confirmed) = self.store.confirmed() else {
            return false;
        };
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let base = replay(confirmed.clone(), &pending);
        pending.push(op);
        let rebuilt = replay(confirmed, &pending);
        let changed = rebuilt != base;
        self.set_view(Some(rebuilt));
        changed
    }

    /// Records a confirmed response: hands the snapshot to the store (which
    /// may discard it as out-of-order), drops the matching pending op if it
    /// is still in the log, and rebuilds the view from whatever remains.
    /// Completion order does not matter; each finalize only ever removes its
    /// own op.
    pub fn finalize(&self, op_id: Uuid, confirmed: Cart) {
        self.store.apply_confirmed(confirmed);
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.retain(|op| op.id != op_id);
        self.rebuild_locked(&pending);
    }

    /// Drops the pending op after a definitive rejection and rebuilds the
    /// view without it.
    pub fn rollback(&self, op_id: Uuid) {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = pending.len();
        pending.retain(|op| op.id != op_id);
        if pending.len() != before {
            debug!(%op_id, "rolled back optimistic mutation");
        }
        self.rebuild_locked(&pending);
    }

    /// Recomputes the view after the store was refreshed outside of a
    /// finalize, e.g. by a coalesced read.
    pub fn refresh(&self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.rebuild_locked(&pending);
    }

    pub fn current_view(&self) -> Option<Cart> {
        self.view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .or_else(|| self.store.confirmed())
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn rebuild_locked(&self, pending: &[PendingOperation]) {
        let view = self
            .store
            .confirmed()
            .map(|confirmed| replay(confirmed, pending));
        self.set_view(view);
    }

    fn set_view(&self, view: Option<Cart>) {
        *self.view.lock().unwrap_or_else(PoisonError::into_inner) = view;
    }
}

/// Replays the pending log over a confirmed snapshot. Totals are fully
/// recomputed after every step; they are never patched incrementally.
fn replay(confirmed: Cart, pending: &[PendingOperation]) -> Cart {
    let mut cart = confirmed;
    for op in pending {
        apply_intent(&mut cart, &op.intent);
    }
    cart
}

fn apply_intent(cart: &mut Cart, intent: &MutationIntent) {
    match intent {
        MutationIntent::AddItem {
            product_id,
            quantity,
        } => {
            // New lines only ever materialize from a confirmed response;
            // speculatively we can only merge into an existing line.
            if let Some(item) = cart
                .items
                .iter_mut()
                .find(|item| item.product_id == *product_id)
            {
                item.quantity = item.quantity.saturating_add(*quantity);
            }
        }
        MutationIntent::UpdateQuantity { line_id, quantity } => {
            if let Some(item) = cart.items.iter_mut().find(|item| item.id == *line_id) {
                item.quantity = *quantity;
            }
        }
        MutationIntent::RemoveItem { line_id } => {
            cart.items.retain(|item| item.id != *line_id);
        }
    }
    cart.recompute_totals();
}
