//! Resilient request layer for a server-owned shopping cart.
//!
//! The client keeps a local view of a single server-side cart that stays
//! correct under concurrent user actions, flaky networks, version conflicts
//! and session expiry. Mutations are applied to the view optimistically,
//! carried to the server with a version precondition and a stable
//! idempotency key, retried within fixed bounds on conflict or session
//! staleness, and reconciled against the confirmed response. The displayed
//! state can always be rebuilt from the last confirmed snapshot plus the
//! pending log, and a mutation is never silently lost or applied twice.

pub mod coalesce;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod projection;
pub mod retry;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use coalesce::CoalesceKey;
pub use coalesce::CoalesceStats;
pub use coalesce::RequestCoalescer;
pub use config::ClientConfig;
pub use dispatcher::CartClient;
pub use error::CartError;
pub use projection::PendingOperation;
pub use projection::ProjectionEngine;
pub use retry::RequestAttempt;
pub use retry::RetryLimits;
pub use retry::RetrySender;
pub use session::NullSession;
pub use session::SessionHandle;
pub use session::SessionRefreshError;
pub use store::AppliedState;
pub use store::CartStore;
pub use transport::CartRequest;
pub use transport::CartTransport;
pub use transport::HttpTransport;
pub use transport::TransportError;
