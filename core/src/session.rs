use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionRefreshError {
    #[error("session refresh failed: {0}")]
    Refresh(String),
}

/// External session/auth collaborator, consumed but not implemented here.
///
/// `refresh` re-establishes the stale session artifact (anti-forgery token or
/// similar) ahead of a single bounded resend. `invalidate_session` is the
/// global notification fired on an unauthenticated response outside of the
/// session-establishment endpoints; the owning context handles the actual
/// logout/redirect.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    async fn refresh(&self) -> Result<(), SessionRefreshError>;
    fn invalidate_session(&self);
}

/// Session handle that can neither refresh nor be invalidated. Useful when
/// composing the client for anonymous-cart backends and in tests.
#[derive(Debug, Default)]
pub struct NullSession;

#[async_trait]
impl SessionHandle for NullSession {
    async fn refresh(&self) -> Result<(), SessionRefreshError> {
        Ok(())
    }

    fn invalidate_session(&self) {}
}
