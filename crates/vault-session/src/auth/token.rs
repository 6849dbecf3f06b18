use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Fixed format `expires_at` is persisted in (UTC, second precision).
pub const EXPIRES_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// The only token type Hive nodes issue; also the Authorization scheme.
pub const TOKEN_TYPE: &str = "token";

/// Access credentials issued by a vault node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    access_token: String,
    refresh_token: String,
    token_type: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    /// Returns `None` for an empty access token. Sub-second precision is
    /// dropped so the token survives a round trip through the store.
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Option<Self> {
        let access_token = access_token.into();
        if access_token.is_empty() {
            return None;
        }
        let expires_at = Utc.timestamp_opt(expires_at.timestamp(), 0).single()?;
        Some(Self {
            access_token,
            refresh_token: String::new(),
            token_type: TOKEN_TYPE.to_string(),
            expires_at,
        })
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = refresh_token.into();
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid()
    }

    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Whole minutes left, never negative.
    pub fn minutes_until_expiry(&self) -> i64 {
        self.time_until_expiry().num_minutes().max(0)
    }

    /// Value for the `Authorization` header of domain calls.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    pub fn expires_at_string(&self) -> String {
        self.expires_at.format(EXPIRES_AT_FORMAT).to_string()
    }
}

/// Who the session is authenticated as. Everything but `owner_did` is
/// learned from the access token's claims.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identity {
    pub owner_did: String,
    pub user_did: Option<String>,
    pub app_id: Option<String>,
    pub app_instance_did: Option<String>,
}

impl Identity {
    pub fn new(owner_did: impl Into<String>) -> Self {
        Self {
            owner_did: owner_did.into(),
            ..Default::default()
        }
    }

    /// Forget everything the node told us, keeping the owner.
    pub fn reset(&mut self) {
        self.user_did = None;
        self.app_id = None;
        self.app_instance_did = None;
    }
}

/// The record kept in a credential store. Each field lives under its own key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    pub expires_at: String,
    pub token_type: String,
    pub user_did: String,
    pub app_id: String,
    pub app_instance_did: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
}

impl CredentialRecord {
    /// Build the record for a completed login. Returns `None` if the identity
    /// has not been populated by the node yet.
    pub fn from_session(token: &Token, identity: &Identity) -> Option<Self> {
        Some(Self {
            access_token: token.access_token.clone(),
            expires_at: token.expires_at_string(),
            token_type: token.token_type.clone(),
            user_did: identity.user_did.clone()?,
            app_id: identity.app_id.clone()?,
            app_instance_did: identity.app_instance_did.clone()?,
            refresh_token: token.refresh_token.clone(),
        })
    }

    /// Rebuild the token and identity. A record with any of the six required
    /// fields empty, or an unparseable expiry, is treated as absent.
    pub fn into_session(self, owner_did: &str) -> Option<(Token, Identity)> {
        let required = [
            &self.access_token,
            &self.expires_at,
            &self.token_type,
            &self.user_did,
            &self.app_id,
            &self.app_instance_did,
        ];
        if required.iter().any(|field| field.is_empty()) {
            return None;
        }

        let expires_at = NaiveDateTime::parse_from_str(&self.expires_at, EXPIRES_AT_FORMAT)
            .ok()?
            .and_utc();

        let token = Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at,
        };
        let identity = Identity {
            owner_did: owner_did.to_string(),
            user_did: Some(self.user_did),
            app_id: Some(self.app_id),
            app_instance_did: Some(self.app_instance_did),
        };
        Some((token, identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            owner_did: "did:elastos:abc".to_string(),
            user_did: Some("did:elastos:xyz".to_string()),
            app_id: Some("app1".to_string()),
            app_instance_did: Some("did:elastos:inst1".to_string()),
        }
    }

    #[test]
    fn test_token_rejects_empty_access_token() {
        assert!(Token::new("", Utc::now()).is_none());
    }

    #[test]
    fn test_token_validity() {
        let valid = Token::new("a", Utc::now() + Duration::hours(1)).unwrap();
        assert!(valid.is_valid());
        assert!(valid.minutes_until_expiry() >= 59);

        let expired = Token::new("a", Utc::now() - Duration::seconds(1)).unwrap();
        assert!(expired.is_expired());
        assert_eq!(expired.minutes_until_expiry(), 0);
    }

    #[test]
    fn test_authorization_header_value() {
        let token = Token::new("abc.def.ghi", Utc::now()).unwrap();
        assert_eq!(token.authorization(), "token abc.def.ghi");
    }

    #[test]
    fn test_record_round_trip() {
        let token = Token::new("access.jwt.sig", Utc::now() + Duration::hours(1))
            .unwrap()
            .with_refresh_token("refresh-value");
        let record = CredentialRecord::from_session(&token, &identity()).unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let loaded: CredentialRecord = serde_json::from_str(&json).unwrap();
        let (restored_token, restored_identity) = loaded.into_session("did:elastos:abc").unwrap();

        assert_eq!(restored_token, token);
        assert_eq!(restored_identity, identity());
    }

    #[test]
    fn test_refresh_token_not_read_from_expiry_key() {
        // Each field must come back from its own key.
        let record = CredentialRecord {
            access_token: "access".to_string(),
            expires_at: "2031-01-02T03:04:05Z".to_string(),
            token_type: TOKEN_TYPE.to_string(),
            user_did: "did:elastos:xyz".to_string(),
            app_id: "app1".to_string(),
            app_instance_did: "did:elastos:inst1".to_string(),
            refresh_token: "refresh-value".to_string(),
        };
        let (token, _) = record.into_session("did:elastos:abc").unwrap();
        assert_eq!(token.refresh_token(), "refresh-value");
        assert_ne!(token.refresh_token(), "2031-01-02T03:04:05Z");
        assert_eq!(token.expires_at_string(), "2031-01-02T03:04:05Z");
    }

    #[test]
    fn test_partial_record_is_absent() {
        let token = Token::new("access", Utc::now() + Duration::hours(1)).unwrap();
        let mut record = CredentialRecord::from_session(&token, &identity()).unwrap();
        record.app_id.clear();
        assert!(record.into_session("did:elastos:abc").is_none());

        let json = r#"{"access_token":"a","expires_at":"2031-01-02T03:04:05Z","token_type":"token"}"#;
        assert!(serde_json::from_str::<CredentialRecord>(json).is_err());
    }

    #[test]
    fn test_unparseable_expiry_is_absent() {
        let token = Token::new("access", Utc::now()).unwrap();
        let mut record = CredentialRecord::from_session(&token, &identity()).unwrap();
        record.expires_at = "tomorrow".to_string();
        assert!(record.into_session("did:elastos:abc").is_none());
    }

    #[test]
    fn test_record_requires_populated_identity() {
        let token = Token::new("access", Utc::now()).unwrap();
        assert!(CredentialRecord::from_session(&token, &Identity::new("did:elastos:abc")).is_none());
    }
}
