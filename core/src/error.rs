use std::time::Duration;
use thiserror::Error;
use trolley_protocol::ValidationErrors;

/// Terminal failure of a cart operation, after the retry policy has run.
///
/// Only two situations are ever retried internally (version conflicts and a
/// stale session artifact, both within fixed bounds); everything that reaches
/// the caller through this type is final for the logical request. The type is
/// `Clone` so the dispatcher can both return it and remember it as
/// `last_error`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CartError {
    /// Version precondition kept failing after the bounded refetch-and-resend
    /// cycle. `attempts` counts the resends that were tried.
    #[error("cart version conflict persisted after {attempts} retries")]
    Conflict { attempts: u8 },

    /// The server rejected the mutation on business rules. The cart is
    /// unchanged server-side and the optimistic change has been rolled back.
    #[error("cart mutation rejected: {0}")]
    Validation(ValidationErrors),

    /// The session artifact is stale and a refresh did not recover it.
    #[error("session could not be restored")]
    Session,

    /// Authentication is gone entirely; the owning context has been notified
    /// via the session collaborator.
    #[error("not authenticated")]
    Unauthenticated,

    /// Rejected for load; never retried here. The hint comes from the
    /// `Retry-After` response header when the server sent one.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// Transport-level failure or timeout. The fate of the mutation is
    /// unknown, so any optimistic change stays pending rather than being
    /// rolled back.
    #[error("network failure: {0}")]
    Network(String),

    /// The target does not exist server-side. Reads map this to `Ok(None)`
    /// before it reaches the caller; a mutation surfaces it when its target
    /// line was removed concurrently, and the optimistic change is rolled
    /// back.
    #[error("cart not found")]
    NotFound,

    /// A response decoded into something other than a cart representation.
    #[error("malformed server response: {0}")]
    Decode(String),

    /// Response status outside the documented contract.
    #[error("unexpected response status {status}")]
    UnexpectedStatus { status: u16 },
}

impl CartError {
    /// Whether the underlying mutation may still have been applied
    /// server-side. Drives the leave-pending vs roll-back decision.
    pub fn fate_unknown(&self) -> bool {
        matches!(self, CartError::Network(_))
    }
}
