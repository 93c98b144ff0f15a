use std::time::Duration;

/// Explicit client configuration, threaded into [`crate::CartClient`] at
/// construction. Nothing in the crate reads ambient/global state; tests build
/// one of these per case.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the cart API, without a trailing slash.
    pub base_url: String,
    /// Transport-level timeout. Expiry surfaces as a network failure, never
    /// as an internal retry.
    pub request_timeout: Duration,
    /// Upper bound on refetch-and-resend cycles after a version conflict.
    pub conflict_retry_limit: u8,
    /// Upper bound on resends after a session refresh.
    pub session_retry_limit: u8,
    /// TTL for coalesced read results.
    pub read_ttl: Duration,
    /// Entry cap for the read coalescer cache.
    pub coalesce_capacity: usize,
    /// Whether mutations are applied to the local view before the server
    /// confirms them.
    pub optimistic: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            request_timeout: Duration::from_secs(10),
            conflict_retry_limit: 3,
            session_retry_limit: 1,
            read_ttl: Duration::from_secs(2),
            coalesce_capacity: 32,
            optimistic: true,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}
