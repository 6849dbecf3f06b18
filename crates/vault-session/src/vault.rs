//! Connection facade for one vault node.
//!
//! `VaultClient` is what higher-level services hold on to. It owns the
//! session and routes every authenticated request through the retrying
//! executor, so a service only supplies a path and a body.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::api::{RetryingExecutor, VaultError};
use crate::auth::{
    AuthSession, CredentialStore, DidDocument, FileCredentialStore, Identity, IdentitySigner, Token,
};
use crate::config::VaultConfig;

#[derive(Clone)]
pub struct VaultClient {
    executor: RetryingExecutor,
    connected: Arc<AtomicBool>,
}

impl VaultClient {
    pub fn new(
        config: VaultConfig,
        document: DidDocument,
        signer: Arc<dyn IdentitySigner>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, VaultError> {
        let session = AuthSession::new(config, document, signer, store)?;
        Ok(Self {
            executor: RetryingExecutor::new(session),
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Use a file store in the config's `store_dir`.
    pub fn with_file_store(
        config: VaultConfig,
        document: DidDocument,
        signer: Arc<dyn IdentitySigner>,
    ) -> Result<Self, VaultError> {
        let dir = config
            .store_dir()
            .map_err(|e| VaultError::Configuration(format!("{:#}", e)))?;
        Self::new(config, document, signer, Arc::new(FileCredentialStore::new(dir)))
    }

    pub fn session(&self) -> &AuthSession {
        self.executor.session()
    }

    /// Make sure a valid token is held, logging in if needed.
    pub async fn connect(&self) -> Result<Token, VaultError> {
        let token = self.session().ensure_valid().await?;
        if !self.connected.swap(true, Ordering::SeqCst) {
            info!(node = %self.session().config().base_url(), "Connected to vault node");
        }
        Ok(token)
    }

    /// Stop treating the client as connected. The stored credential is kept
    /// so the next `connect` can reuse it.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(node = %self.session().config().base_url(), "Disconnected from vault node");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Disconnect and forget the credential, locally and in the store.
    pub async fn sign_out(&self) -> Result<(), VaultError> {
        self.disconnect();
        self.session().invalidate().await
    }

    pub fn identity(&self) -> Identity {
        self.session().identity()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, VaultError> {
        let client = self.session().client();
        self.executor
            .execute(|token| async move { client.get_json(path, &token).await })
            .await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, VaultError> {
        let client = self.session().client();
        self.executor
            .execute(|token| async move { client.post_json(path, &token, body).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use mockito::Server;
    use serde_json::{json, Value};

    use super::*;
    use crate::auth::MemoryCredentialStore;
    use crate::test_support::{access_jwt, challenge_jwt, document, TestSigner, OWNER_DID};

    #[tokio::test]
    async fn test_connect_disconnect_sign_out() {
        let mut server = Server::new_async().await;
        let access = access_jwt("did:elastos:xyz", "app1", "did:elastos:inst1", Duration::hours(1));
        let sign_in = server
            .mock("POST", "/api/v1/did/sign_in")
            .with_status(200)
            .with_body(json!({ "challenge": challenge_jwt(OWNER_DID, Duration::minutes(5)) }).to_string())
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/api/v1/did/auth")
            .with_status(200)
            .with_body(json!({ "access_token": access }).to_string())
            .create_async()
            .await;

        let store = Arc::new(MemoryCredentialStore::new());
        let client = VaultClient::new(
            VaultConfig::new(server.url(), OWNER_DID),
            document(),
            Arc::new(TestSigner::new("assertion")),
            store.clone(),
        )
        .unwrap();
        assert!(!client.is_connected());

        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(client.identity().user_did.as_deref(), Some("did:elastos:xyz"));

        client.disconnect();
        assert!(!client.is_connected());
        // Reconnecting reuses the cached token
        client.connect().await.unwrap();
        sign_in.assert_async().await;

        client.sign_out().await.unwrap();
        assert!(!client.is_connected());
        assert!(client.session().current_token().is_none());
        assert!(store.load(client.session().store_key()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_post_relogs_in_on_expired_envelope() {
        let mut server = Server::new_async().await;
        let first = access_jwt("did:elastos:xyz", "app1", "did:elastos:inst1", Duration::hours(1));
        let second = access_jwt("did:elastos:xyz", "app1", "did:elastos:inst1", Duration::hours(2));

        server
            .mock("POST", "/api/v1/did/sign_in")
            .with_status(200)
            .with_body(json!({ "challenge": challenge_jwt(OWNER_DID, Duration::minutes(5)) }).to_string())
            .expect(2)
            .create_async()
            .await;
        let first_auth = server
            .mock("POST", "/api/v1/did/auth")
            .with_status(200)
            .with_body(json!({ "access_token": first }).to_string())
            .expect(1)
            .create_async()
            .await;

        let rejected = server
            .mock("POST", "/api/v1/payment/create_order")
            .match_header("authorization", format!("token {}", first).as_str())
            .with_status(200)
            .with_body(r#"{"_status":"ERR","_error":{"code":401,"message":"expired"}}"#)
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("POST", "/api/v1/payment/create_order")
            .match_header("authorization", format!("token {}", second).as_str())
            .with_status(200)
            .with_body(r#"{"_status":"OK","order_id":"o-1"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = VaultClient::new(
            VaultConfig::new(server.url(), OWNER_DID),
            document(),
            Arc::new(TestSigner::new("assertion")),
            Arc::new(MemoryCredentialStore::new()),
        )
        .unwrap();
        client.connect().await.unwrap();
        first_auth.assert_async().await;
        first_auth.remove_async().await;

        server
            .mock("POST", "/api/v1/did/auth")
            .with_status(200)
            .with_body(json!({ "access_token": second }).to_string())
            .expect(1)
            .create_async()
            .await;

        let body: Value = client
            .post("/api/v1/payment/create_order", &json!({ "pricing_name": "Rookie" }))
            .await
            .unwrap();

        rejected.assert_async().await;
        accepted.assert_async().await;
        assert_eq!(body["order_id"], "o-1");
    }

    #[tokio::test]
    async fn test_with_file_store_uses_store_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = VaultConfig::new("https://node.example", OWNER_DID);
        config.store_dir = Some(dir.path().to_path_buf());

        let client = VaultClient::with_file_store(config, document(), Arc::new(TestSigner::new("a"))).unwrap();
        assert!(client.session().current_token().is_none());
        client.sign_out().await.unwrap();
    }
}
