//! HTTP side of the vault client.
//!
//! This module provides the `NodeClient` for the node's DID auth endpoints
//! and authenticated JSON calls, the `RetryingExecutor` that every
//! authenticated call goes through, and the `VaultError` taxonomy.
//!
//! Domain calls carry `Authorization: token <access_token>`; a node answering
//! 401 (or an `_error.code` of 401) means the session has expired.

pub mod client;
pub mod error;
pub mod executor;

pub use client::NodeClient;
pub use error::VaultError;
pub use executor::RetryingExecutor;
