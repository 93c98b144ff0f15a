use serde::Deserialize;
use serde::Serialize;

/// Canonical server representation of the cart.
///
/// The `version` is assigned exclusively by the server and increases with
/// every confirmed mutation of the same cart. Totals are always derived from
/// the item list via [`Cart::recompute_totals`]; a cart deserialized from the
/// wire carries the server's totals, a cart rebuilt locally must recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: String,
    pub version: u64,
    pub items: Vec<LineItem>,
    pub totals: CartTotals,
}

/// One cart line. Prices are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: i64,
    /// Per-line discount or surcharge, already resolved by the server.
    #[serde(default)]
    pub adjustment: i64,
    pub line_total: i64,
}

impl LineItem {
    pub fn computed_total(&self) -> i64 {
        i64::from(self.quantity) * self.unit_price + self.adjustment
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub item_count: u32,
    pub subtotal: i64,
    pub adjustment_total: i64,
    pub grand_total: i64,
}

impl Cart {
    pub fn line(&self, line_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|item| item.id == line_id)
    }

    pub fn line_for_product(&self, product_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    /// Recomputes every line total and the aggregate totals from the item
    /// list. Totals are never patched incrementally; any local rebuild of the
    /// item list must go through here.
    pub fn recompute_totals(&mut self) {
        let mut item_count = 0u32;
        let mut subtotal = 0i64;
        let mut adjustment_total = 0i64;
        for item in &mut self.items {
            item.line_total = item.computed_total();
            item_count = item_count.saturating_add(item.quantity);
            subtotal += i64::from(item.quantity) * item.unit_price;
            adjustment_total += item.adjustment;
        }
        self.totals = CartTotals {
            item_count,
            subtotal,
            adjustment_total,
            grand_total: subtotal + adjustment_total,
        };
    }
}
