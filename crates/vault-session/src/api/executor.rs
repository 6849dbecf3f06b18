use std::future::Future;

use tracing::{debug, warn};

use crate::auth::{AuthSession, Token};

use super::VaultError;

/// Runs remote calls with a valid token, re-authenticating at most once.
///
/// Every authenticated call site goes through [`execute`](Self::execute):
/// the node rejecting the token with a session-expired error forces one
/// relogin and one more attempt. Nothing else is retried.
#[derive(Clone)]
pub struct RetryingExecutor {
    session: AuthSession,
}

impl RetryingExecutor {
    pub fn new(session: AuthSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Call `call` with the current token; on `SessionExpired`, log in again
    /// and call it once more with the new token.
    ///
    /// A failed `ensure_valid` or relogin is returned as is.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> Result<T, VaultError>
    where
        F: FnMut(Token) -> Fut,
        Fut: Future<Output = Result<T, VaultError>>,
    {
        let token = self.session.ensure_valid().await?;

        match call(token).await {
            Err(e) if e.is_session_expired() => {
                warn!(node = %self.session.config().base_url(), "Node rejected session token, logging in again");
                let token = self.session.force_relogin().await?;
                debug!("Retrying call after relogin");
                call(token).await
            }
            outcome => outcome,
        }
    }
}
