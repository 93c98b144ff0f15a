//! Wire and domain types for the trolley cart client.
//!
//! Everything here is plain data: the `core` crate owns all behavior around
//! versions, retries and optimistic projection. Consumers that only need to
//! render a cart can depend on this crate alone.

mod cart;
mod mutation;
mod validation;

pub use cart::Cart;
pub use cart::CartTotals;
pub use cart::LineItem;
pub use mutation::MutationIntent;
pub use validation::ValidationErrors;
