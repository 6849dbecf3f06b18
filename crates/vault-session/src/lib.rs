//! Client-side session management for Hive vault nodes.
//!
//! A vault node authenticates clients with a DID challenge-response login:
//! the client presents its DID document, signs the challenge it gets back,
//! and exchanges the signed assertion for an access token. This crate runs
//! that protocol, caches and persists the token, and re-authenticates once
//! when a node rejects it.
//!
//! - [`AuthSession`] owns the token and performs single-flight logins.
//! - [`RetryingExecutor`] wraps remote calls with bounded relogin-and-retry.
//! - [`VaultClient`] ties both to a [`VaultConfig`] for higher-level services.
//!
//! The wallet side plugs in through [`IdentitySigner`]; token persistence
//! through [`CredentialStore`].

pub mod api;
pub mod auth;
pub mod config;
pub mod vault;

#[cfg(test)]
mod test_support;

pub use api::{NodeClient, RetryingExecutor, VaultError};
pub use auth::{
    AuthSession, CredentialRecord, CredentialStore, DidDocument, FileCredentialStore, Identity,
    IdentitySigner, KeyringCredentialStore, MemoryCredentialStore, StoreKey, Token,
};
pub use config::VaultConfig;
pub use vault::VaultClient;
