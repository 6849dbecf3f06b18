//! Authentication against a vault node.
//!
//! This module provides:
//! - `AuthSession`: token cache and single-flight DID challenge-response login
//! - `CredentialStore`: persistence of the token record (file, keyring, memory)
//! - `IdentitySigner`: the wallet-side hook that answers a node's challenge
//! - `Token` / `Identity`: what a successful login yields
//!
//! Tokens are restored from the store on startup and re-issued whenever they
//! expire or the node rejects them.

pub mod credentials;
pub mod did;
pub mod jwt;
pub mod session;
pub mod signer;
pub mod token;

pub use credentials::{
    CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore, StoreKey,
};
pub use did::DidDocument;
pub use session::AuthSession;
pub use signer::IdentitySigner;
pub use token::{CredentialRecord, Identity, Token, EXPIRES_AT_FORMAT, TOKEN_TYPE};
