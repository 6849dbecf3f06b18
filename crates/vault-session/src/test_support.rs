//! Fixtures shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;

use crate::auth::jwt::encode_unsigned;
use crate::auth::{CredentialRecord, CredentialStore, DidDocument, IdentitySigner, StoreKey};

pub const OWNER_DID: &str = "did:elastos:abc";

pub fn document() -> DidDocument {
    DidDocument::from_value(json!({ "id": OWNER_DID })).unwrap()
}

pub fn challenge_jwt(audience: &str, expires_in: Duration) -> String {
    encode_unsigned(&json!({
        "aud": audience,
        "exp": (Utc::now() + expires_in).timestamp(),
    }))
}

pub fn access_jwt(user_did: &str, app_id: &str, app_instance_did: &str, expires_in: Duration) -> String {
    encode_unsigned(&json!({
        "userDid": user_did,
        "appId": app_id,
        "appInstanceDid": app_instance_did,
        "exp": (Utc::now() + expires_in).timestamp(),
    }))
}

/// Signer that records the challenges it sees.
pub struct TestSigner {
    assertion: Result<String, String>,
    delay: Option<StdDuration>,
    first_call_delay: Option<StdDuration>,
    calls: AtomicUsize,
    challenges: Mutex<Vec<String>>,
}

impl TestSigner {
    pub fn new(assertion: &str) -> Self {
        Self {
            assertion: Ok(assertion.to_string()),
            delay: None,
            first_call_delay: None,
            calls: AtomicUsize::new(0),
            challenges: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            assertion: Err(message.to_string()),
            ..Self::new("")
        }
    }

    pub fn with_delay(mut self, delay: StdDuration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Only the first challenge is slow; later ones are signed at once.
    pub fn with_first_call_delay(mut self, delay: StdDuration) -> Self {
        self.first_call_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn challenges(&self) -> Vec<String> {
        self.challenges.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentitySigner for TestSigner {
    async fn sign_challenge(&self, challenge: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.challenges.lock().unwrap().push(challenge.to_string());
        if let Some(delay) = self.first_call_delay.filter(|_| call == 0) {
            tokio::time::sleep(delay).await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.assertion.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

/// Store whose every operation fails.
pub struct FailingStore;

impl CredentialStore for FailingStore {
    fn load(&self, _key: &StoreKey) -> Result<Option<CredentialRecord>> {
        anyhow::bail!("disk unavailable")
    }

    fn save(&self, _key: &StoreKey, _record: &CredentialRecord) -> Result<()> {
        anyhow::bail!("disk full")
    }

    fn clear(&self, _key: &StoreKey) -> Result<()> {
        anyhow::bail!("disk unavailable")
    }
}
