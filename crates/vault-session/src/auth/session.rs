use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::api::{NodeClient, VaultError};
use crate::config::VaultConfig;

use super::credentials::{CredentialStore, StoreKey};
use super::did::DidDocument;
use super::jwt::Claims;
use super::signer::IdentitySigner;
use super::token::{CredentialRecord, Identity, Token};

/// Outcome shared by every caller waiting on one login run.
type LoginFuture = Shared<BoxFuture<'static, Result<Token, VaultError>>>;

struct InFlightLogin {
    id: u64,
    future: LoginFuture,
}

struct SessionState {
    token: Option<Token>,
    identity: Identity,
    login: Option<InFlightLogin>,
    next_login_id: u64,
}

/// A login that reached the node and decoded cleanly. `save_error` is set
/// when the credential store rejected the record.
struct CompletedLogin {
    token: Token,
    identity: Identity,
    save_error: Option<VaultError>,
}

struct SessionInner {
    config: VaultConfig,
    key: StoreKey,
    document: DidDocument,
    client: NodeClient,
    signer: Arc<dyn IdentitySigner>,
    store: Arc<dyn CredentialStore>,
    state: Mutex<SessionState>,
    /// Held while a login writes its record and while `invalidate` purges,
    /// so an abandoned login never writes after the purge.
    persist: tokio::sync::Mutex<()>,
}

/// Authenticated session against one vault node.
///
/// Owns the cached token and identity for `(owner DID, node URL)`, runs the
/// DID challenge-response login when the token is missing or expired, and
/// collapses concurrent logins into one. Clone is cheap and clones share
/// the same session.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

impl AuthSession {
    /// Build a session and restore any record the store holds for this
    /// owner/node pair. An unusable record just means "not logged in".
    pub fn new(
        config: VaultConfig,
        document: DidDocument,
        signer: Arc<dyn IdentitySigner>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, VaultError> {
        config
            .validate()
            .map_err(|e| VaultError::Configuration(format!("{:#}", e)))?;

        let client = NodeClient::new(&config)?;
        let key = StoreKey::new(config.owner_did.clone(), config.base_url());

        let mut token = None;
        let mut identity = Identity::new(config.owner_did.clone());
        match store.load(&key) {
            Ok(Some(record)) => match record.into_session(&config.owner_did) {
                Some((restored_token, restored_identity)) => {
                    debug!(
                        owner_did = %config.owner_did,
                        expired = restored_token.is_expired(),
                        "Restored stored credential"
                    );
                    token = Some(restored_token);
                    identity = restored_identity;
                }
                None => warn!(owner_did = %config.owner_did, "Ignoring incomplete stored credential"),
            },
            Ok(None) => debug!(owner_did = %config.owner_did, "No stored credential"),
            Err(e) => warn!(error = ?e, "Failed to load stored credential"),
        }

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                key,
                document,
                client,
                signer,
                store,
                state: Mutex::new(SessionState {
                    token,
                    identity,
                    login: None,
                    next_login_id: 0,
                }),
                persist: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Return the cached token if it is still valid, otherwise log in.
    ///
    /// Concurrent callers that find no valid token share one login run and
    /// all see its outcome.
    pub async fn ensure_valid(&self) -> Result<Token, VaultError> {
        let login = {
            let mut state = self.inner.state();
            if let Some(token) = state.token.as_ref().filter(|t| t.is_valid()) {
                debug!(expires_at = %token.expires_at(), "Using cached token");
                return Ok(token.clone());
            }
            self.inner.join_or_start_login(&mut state)
        };
        login.await
    }

    /// Drop the cached token and log in again. Joins a login that is
    /// already running instead of starting a second one.
    pub async fn force_relogin(&self) -> Result<Token, VaultError> {
        let login = {
            let mut state = self.inner.state();
            state.token = None;
            self.inner.join_or_start_login(&mut state)
        };
        login.await
    }

    /// Sign out: forget the token and identity claims, abandon any running
    /// login, and purge the stored record.
    pub async fn invalidate(&self) -> Result<(), VaultError> {
        let _persist = self.inner.persist.lock().await;
        {
            let mut state = self.inner.state();
            state.token = None;
            state.identity.reset();
            state.login = None;
        }
        info!(owner_did = %self.inner.config.owner_did, "Session invalidated");
        self.inner.clear_store().await
    }

    /// Snapshot of the cached token, which may be expired.
    pub fn current_token(&self) -> Option<Token> {
        self.inner.state().token.clone()
    }

    pub fn identity(&self) -> Identity {
        self.inner.state().identity.clone()
    }

    pub fn config(&self) -> &VaultConfig {
        &self.inner.config
    }

    pub fn store_key(&self) -> &StoreKey {
        &self.inner.key
    }

    pub fn client(&self) -> &NodeClient {
        &self.inner.client
    }
}

impl SessionInner {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join_or_start_login(self: &Arc<Self>, state: &mut SessionState) -> LoginFuture {
        if let Some(ref login) = state.login {
            debug!(login_id = login.id, "Joining in-flight login");
            return login.future.clone();
        }

        let id = state.next_login_id;
        state.next_login_id += 1;

        let inner = Arc::clone(self);
        let future = async move {
            let outcome = inner.login(id).await;
            inner.complete_login(id, outcome)
        }
        .boxed()
        .shared();

        debug!(login_id = id, node = %self.client.base_url(), "Starting login");
        state.login = Some(InFlightLogin {
            id,
            future: future.clone(),
        });
        future
    }

    fn is_current_login(&self, id: u64) -> bool {
        self.state().login.as_ref().map(|l| l.id) == Some(id)
    }

    /// Install the result of login `id`, unless the session was invalidated
    /// while it ran.
    fn complete_login(
        &self,
        id: u64,
        outcome: Result<CompletedLogin, VaultError>,
    ) -> Result<Token, VaultError> {
        let mut state = self.state();
        if state.login.as_ref().map(|l| l.id) != Some(id) {
            warn!(login_id = id, "Discarding login that finished after sign-out");
            return Err(VaultError::SignedOut);
        }
        state.login = None;

        match outcome {
            Err(e) => {
                warn!(login_id = id, error = %e, "Login failed");
                Err(e)
            }
            Ok(done) => {
                info!(
                    login_id = id,
                    user_did = ?done.identity.user_did,
                    expires_at = %done.token.expires_at(),
                    expires_in_minutes = done.token.minutes_until_expiry(),
                    "Login succeeded"
                );
                state.token = Some(done.token.clone());
                state.identity = done.identity;
                match done.save_error {
                    Some(e) => Err(e),
                    None => Ok(done.token),
                }
            }
        }
    }

    /// One pass of the challenge-response protocol. Nothing is cached here;
    /// the record is persisted before the caller swaps it in, and only while
    /// login `id` is still the session's current one.
    async fn login(&self, id: u64) -> Result<CompletedLogin, VaultError> {
        let challenge = self.client.sign_in(&self.document).await?;
        debug!("Received sign-in challenge");

        if self.config.verify_challenge {
            self.verify_challenge(&challenge)?;
        }

        let assertion = self.request_assertion(&challenge).await?;

        let access_token = self.client.auth(&assertion).await?;
        debug!("Received access token");

        let (token, identity) = self.decode_access_token(access_token)?;

        let _persist = self.persist.lock().await;
        if !self.is_current_login(id) {
            return Err(VaultError::SignedOut);
        }
        let save_error = match self.save_record(&token, &identity).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "Failed to persist credential; token is only kept in memory");
                Some(e)
            }
        };

        Ok(CompletedLogin {
            token,
            identity,
            save_error,
        })
    }

    fn verify_challenge(&self, challenge: &str) -> Result<(), VaultError> {
        let claims = Claims::decode(challenge)?;
        let subject = self.document.subject();

        if claims.audience() != Some(subject) {
            return Err(VaultError::ChallengeMismatch {
                audience: claims.audience().map(str::to_string),
                subject: subject.to_string(),
            });
        }

        if let Some(exp) = claims.expiration() {
            if Utc::now() > exp {
                return Err(VaultError::ChallengeExpired(exp.to_rfc3339()));
            }
        }
        Ok(())
    }

    async fn request_assertion(&self, challenge: &str) -> Result<String, VaultError> {
        let timeout = self.config.signer_timeout();
        match tokio::time::timeout(timeout, self.signer.sign_challenge(challenge)).await {
            Ok(Ok(assertion)) if !assertion.is_empty() => Ok(assertion),
            Ok(Ok(_)) => Err(VaultError::Assertion("signer returned an empty assertion".to_string())),
            Ok(Err(e)) => Err(VaultError::Assertion(format!("{:#}", e))),
            Err(_) => Err(VaultError::Network(format!(
                "identity signer timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    fn decode_access_token(&self, access_token: String) -> Result<(Token, Identity), VaultError> {
        let claims = Claims::decode(&access_token)?;

        let identity = Identity {
            owner_did: self.config.owner_did.clone(),
            user_did: Some(claims.require_str("userDid")?),
            app_id: Some(claims.require_str("appId")?),
            app_instance_did: Some(claims.require_str("appInstanceDid")?),
        };
        let expires_at = claims
            .expiration()
            .ok_or_else(|| VaultError::Protocol("access token has no exp claim".to_string()))?;
        let token = Token::new(access_token, expires_at)
            .ok_or_else(|| VaultError::Protocol("access token is empty".to_string()))?;

        Ok((token, identity))
    }

    async fn save_record(&self, token: &Token, identity: &Identity) -> Result<(), VaultError> {
        let record = CredentialRecord::from_session(token, identity)
            .ok_or_else(|| VaultError::Persistence("identity is incomplete".to_string()))?;
        let store = Arc::clone(&self.store);
        let key = self.key.clone();

        tokio::task::spawn_blocking(move || store.save(&key, &record))
            .await
            .map_err(|e| VaultError::Persistence(format!("credential save task failed: {}", e)))?
            .map_err(|e| VaultError::Persistence(format!("{:#}", e)))
    }

    async fn clear_store(&self) -> Result<(), VaultError> {
        let store = Arc::clone(&self.store);
        let key = self.key.clone();

        tokio::task::spawn_blocking(move || store.clear(&key))
            .await
            .map_err(|e| VaultError::Persistence(format!("credential clear task failed: {}", e)))?
            .map_err(|e| VaultError::Persistence(format!("{:#}", e)))
    }
}
