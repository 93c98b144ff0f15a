//! Bounded retry policy for logical mutations.
//!
//! Per logical request the state machine is
//! `Idle -> Sent -> {Succeeded | ConflictRetrying -> Sent | SessionRetrying
//! -> Sent | Failed}`: `Sent` is only ever re-entered through the two retry
//! edges, everything else leaving `Sent` is terminal. Conflicts are retried
//! at most `conflict_retry_limit` times after resynchronizing the store; a
//! stale session artifact is refreshed and retried at most
//! `session_retry_limit` times. Nothing else is ever retried here.

use crate::config::ClientConfig;
use crate::error::CartError;
use crate::session::SessionHandle;
use crate::store::CartStore;
use crate::transport::CartRequest;
use crate::transport::CartTransport;
use crate::transport::TransportError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing::warn;
use trolley_protocol::Cart;
use trolley_protocol::ValidationErrors;
use uuid::Uuid;

/// Retry counters for one logical request. Immutable: each retry edge builds
/// a new value around the same idempotency key, which is what keeps the key
/// stable across every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestAttempt {
    pub idempotency_key: Uuid,
    pub conflict_retries: u8,
    pub session_retries: u8,
}

impl RequestAttempt {
    pub fn new() -> Self {
        Self {
            idempotency_key: Uuid::new_v4(),
            conflict_retries: 0,
            session_retries: 0,
        }
    }

    pub fn with_conflict_retry(self) -> Self {
        Self {
            conflict_retries: self.conflict_retries + 1,
            ..self
        }
    }

    pub fn with_session_retry(self) -> Self {
        Self {
            session_retries: self.session_retries + 1,
            ..self
        }
    }
}

impl Default for RequestAttempt {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryLimits {
    pub conflict: u8,
    pub session: u8,
}

impl From<&ClientConfig> for RetryLimits {
    fn from(config: &ClientConfig) -> Self {
        Self {
            conflict: config.conflict_retry_limit,
            session: config.session_retry_limit,
        }
    }
}

/// Policy classification of a failed response. This is the single place that
/// examines failures; only `Conflict` and `SessionInvalid` ever loop back
/// into the retry engine.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FailureClass {
    Conflict,
    SessionInvalid,
    Unauthenticated,
    Validation(ValidationErrors),
    RateLimited(Option<Duration>),
    NotFound,
    Network(String),
    Decode(String),
    Unexpected(u16),
}

pub(crate) fn classify(error: &TransportError) -> FailureClass {
    match error {
        TransportError::Status { status: 412, .. } => FailureClass::Conflict,
        TransportError::Status { status: 419, .. } => FailureClass::SessionInvalid,
        TransportError::Status { status: 401, .. } => FailureClass::Unauthenticated,
        TransportError::Status { status: 404, .. } => FailureClass::NotFound,
        TransportError::Status {
            status: 422,
            validation,
            ..
        } => FailureClass::Validation(validation.clone().unwrap_or_default()),
        TransportError::Status {
            status: 429,
            retry_after_secs,
            ..
        } => FailureClass::RateLimited(retry_after_secs.map(Duration::from_secs)),
        TransportError::Status { status, .. } => FailureClass::Unexpected(*status),
        TransportError::Network(message) => FailureClass::Network(message.clone()),
        TransportError::Decode(message) => FailureClass::Decode(message.clone()),
    }
}

impl FailureClass {
    pub(crate) fn into_cart_error(self, conflict_attempts: u8) -> CartError {
        match self {
            FailureClass::Conflict => CartError::Conflict {
                attempts: conflict_attempts,
            },
            FailureClass::SessionInvalid => CartError::Session,
            FailureClass::Unauthenticated => CartError::Unauthenticated,
            FailureClass::Validation(errors) => CartError::Validation(errors),
            FailureClass::RateLimited(retry_after) => CartError::RateLimited { retry_after },
            FailureClass::NotFound => CartError::NotFound,
            FailureClass::Network(message) => CartError::Network(message),
            FailureClass::Decode(message) => CartError::Decode(message),
            FailureClass::Unexpected(status) => CartError::UnexpectedStatus { status },
        }
    }
}

/// Drives one logical request through the transport, absorbing version
/// conflicts and session staleness within their bounds.
pub struct RetrySender {
    transport: Arc<dyn CartTransport>,
    session: Arc<dyn SessionHandle>,
    store: Arc<CartStore>,
    limits: RetryLimits,
}

impl RetrySender {
    pub fn new(
        transport: Arc<dyn CartTransport>,
        session: Arc<dyn SessionHandle>,
        store: Arc<CartStore>,
        limits: RetryLimits,
    ) -> Self {
        Self {
            transport,
            session,
            store,
            limits,
        }
    }

    /// Sends `request`, re-stamping the version precondition from the store
    /// before every attempt. Mutations get one idempotency key for the whole
    /// logical request; reads carry neither key nor precondition.
    pub async fn send(&self, request: CartRequest) -> Result<Cart, CartError> {
        let mut attempt = RequestAttempt::new();
        let request = if request.is_mutation() {
            request.with_idempotency_key(attempt.idempotency_key)
        } else {
            request
        };
        loop {
            let outbound = if request.is_mutation() {
                request
                    .clone()
                    .with_precondition(self.store.current_version())
            } else {
                request.clone()
            };
            let error = match self.transport.execute(outbound).await {
                Ok(cart) => {
                    if attempt.conflict_retries > 0 || attempt.session_retries > 0 {
                        debug!(
                            conflict_retries = attempt.conflict_retries,
                            session_retries = attempt.session_retries,
                            "mutation succeeded after retry"
                        );
                    }
                    return Ok(cart);
                }
                Err(error) => error,
            };
            match classify(&error) {
                FailureClass::Conflict => {
                    if !request.replayable || request.idempotency_key.is_none() {
                        return Err(CartError::Conflict {
                            attempts: attempt.conflict_retries,
                        });
                    }
                    if attempt.conflict_retries >= self.limits.conflict {
                        warn!(
                            attempts = attempt.conflict_retries,
                            "version conflict persisted past the retry bound"
                        );
                        return Err(CartError::Conflict {
                            attempts: attempt.conflict_retries,
                        });
                    }
                    // resynchronize before resending with a fresh precondition
                    self.store.reload().await?;
                    attempt = attempt.with_conflict_retry();
                    debug!(
                        retry = attempt.conflict_retries,
                        version = ?self.store.current_version(),
                        "resending after version conflict"
                    );
                }
                FailureClass::SessionInvalid => {
                    if !request.replayable || attempt.session_retries >= self.limits.session {
                        return Err(CartError::Session);
                    }
                    self.session
                        .refresh()
                        .await
                        .map_err(|_| CartError::Session)?;
                    attempt = attempt.with_session_retry();
                    debug!("resending after session refresh");
                }
                FailureClass::Unauthenticated => {
                    self.session.invalidate_session();
                    return Err(CartError::Unauthenticated);
                }
                other => return Err(other.into_cart_error(attempt.conflict_retries)),
            }
        }
    }
}
