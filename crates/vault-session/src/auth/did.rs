use anyhow::{Context, Result};
use serde_json::Value;

/// The local DID document presented to the node at sign-in.
#[derive(Debug, Clone, PartialEq)]
pub struct DidDocument {
    subject: String,
    document: Value,
}

impl DidDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(json).context("Failed to parse DID document")?;
        Self::from_value(document)
    }

    pub fn from_value(document: Value) -> Result<Self> {
        let subject = document
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow::anyhow!("DID document has no id"))?
            .to_string();
        Ok(Self { subject, document })
    }

    /// The DID this document describes; challenges must be addressed to it.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn as_value(&self) -> &Value {
        &self.document
    }
}
