use anyhow::Result;
use async_trait::async_trait;

/// Produces the signed assertion that answers a node's challenge.
///
/// Implementations typically wrap a DID wallet and may make their own
/// network round trips. The session bounds each call with a timeout and does
/// not retry failures.
#[async_trait]
pub trait IdentitySigner: Send + Sync {
    async fn sign_challenge(&self, challenge: &str) -> Result<String>;
}
