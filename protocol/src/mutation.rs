use serde::Deserialize;
use serde::Serialize;

/// A caller's mutation intent, before any network or optimistic handling.
///
/// `AddItem` targets a product; the resulting line id is server-assigned and
/// only ever materializes from a confirmed response. The other two target an
/// existing line by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationIntent {
    AddItem { product_id: String, quantity: u32 },
    UpdateQuantity { line_id: String, quantity: u32 },
    RemoveItem { line_id: String },
}

impl MutationIntent {
    /// The line this intent targets, when it targets one that already exists.
    pub fn target_line_id(&self) -> Option<&str> {
        match self {
            MutationIntent::AddItem { .. } => None,
            MutationIntent::UpdateQuantity { line_id, .. }
            | MutationIntent::RemoveItem { line_id } => Some(line_id),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            MutationIntent::AddItem { .. } => "add_item",
            MutationIntent::UpdateQuantity { .. } => "update_quantity",
            MutationIntent::RemoveItem { .. } => "remove_item",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_with_kind_tag() {
        let intent = MutationIntent::UpdateQuantity {
            line_id: "line-1".to_string(),
            quantity: 5,
        };
        let value = serde_json::to_value(&intent).expect("serialize");
        assert_eq!(value["kind"], "update_quantity");
        assert_eq!(value["line_id"], "line-1");
        assert_eq!(value["quantity"], 5);
    }

    #[test]
    fn add_item_has_no_target_line() {
        let intent = MutationIntent::AddItem {
            product_id: "sku-9".to_string(),
            quantity: 1,
        };
        assert_eq!(intent.target_line_id(), None);
    }
}
