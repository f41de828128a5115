// Chain-head oracle: the narrow RPC surface the safe block tracker needs.

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ClientError;
use crate::settings::RpcSettings;

#[async_trait]
pub trait ChainHeadClient: Send + Sync {
    async fn current_block_number(&self) -> Result<u64, ClientError>;
}

/// Provider-backed implementation, generic over the middleware stack.
pub struct EthereumClient<M> {
    provider: Arc<M>,
}

impl<M: Middleware + 'static> EthereumClient<M> {
    pub fn new(provider: Arc<M>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainHeadClient for EthereumClient<M> {
    async fn current_block_number(&self) -> Result<u64, ClientError> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        Ok(number.as_u64())
    }
}

/// Builds an HTTP provider with a bounded request timeout.
pub fn http_provider(settings: &RpcSettings) -> Result<Provider<Http>, ClientError> {
    let url: Url = settings
        .http_url
        .parse()
        .map_err(|e| ClientError::Rpc(format!("invalid RPC url '{}': {}", settings.http_url, e)))?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(settings.timeout_ms))
        .build()?;
    Ok(Provider::new(Http::new_with_client(url, client)))
}
