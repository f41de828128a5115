// Shared error taxonomy for the external API clients.

use thiserror::Error;

/// Errors surfaced by the chain-head, block-lookup, and price-index clients.
///
/// All variants are treated as transient by the synchronizers: the failure is
/// logged, the affected work item is skipped, and the next scheduled pass
/// retries it. Nothing here ever terminates a job queue or a timer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited by remote API")]
    RateLimited,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("rpc error: {0}")]
    Rpc(String),
}

impl ClientError {
    /// Whether backing off before the next attempt is likely to help.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ClientError::RateLimited)
    }
}
