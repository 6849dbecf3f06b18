use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use vault_session::{DidDocument, IdentitySigner};

pub const OWNER_DID: &str = "did:elastos:abc";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn unsigned_jwt(claims: &Value) -> String {
    format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

pub fn challenge(audience: &str) -> String {
    unsigned_jwt(&json!({ "aud": audience, "exp": (Utc::now() + Duration::minutes(5)).timestamp() }))
}

pub fn access_token(expires_in: Duration) -> String {
    unsigned_jwt(&json!({
        "userDid": "did:elastos:xyz",
        "appId": "app1",
        "appInstanceDid": "did:elastos:inst1",
        "exp": (Utc::now() + expires_in).timestamp(),
    }))
}

pub fn document() -> DidDocument {
    DidDocument::from_value(json!({
        "id": OWNER_DID,
        "publicKey": [{ "id": "#primary", "type": "ECDSAsecp256r1" }],
    }))
    .unwrap()
}

#[derive(Default)]
pub struct CountingSigner {
    pub calls: AtomicUsize,
}

impl CountingSigner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentitySigner for CountingSigner {
    async fn sign_challenge(&self, challenge: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("signed:{}", challenge.len()))
    }
}
