use std::collections::hash_map::{self, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use keyring::Entry;
use serde::{Deserialize, Serialize};

use super::token::CredentialRecord;

const SERVICE_NAME: &str = "vault-session";

/// Identifies one stored record: one per (owner DID, node URL) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub owner_did: String,
    pub node_url: String,
}

impl StoreKey {
    pub fn new(owner_did: impl Into<String>, node_url: impl Into<String>) -> Self {
        Self {
            owner_did: owner_did.into(),
            node_url: node_url.into(),
        }
    }

    /// Account name used for keyring entries and map keys.
    pub fn account(&self) -> String {
        format!("{}@{}", self.owner_did, self.node_url)
    }

    /// A filesystem-safe name for this key, distinct for distinct keys.
    fn file_name(&self) -> String {
        format!("{}.json", URL_SAFE_NO_PAD.encode(self.account()))
    }
}

/// On-disk and keychain form: the record tagged with the key it was saved
/// under, so a record is never restored for a different owner or node.
#[derive(Serialize, Deserialize)]
struct KeyedRecord {
    owner_did: String,
    node_url: String,
    #[serde(flatten)]
    record: CredentialRecord,
}

impl KeyedRecord {
    fn encode(key: &StoreKey, record: &CredentialRecord) -> Result<String> {
        let keyed = KeyedRecord {
            owner_did: key.owner_did.clone(),
            node_url: key.node_url.clone(),
            record: record.clone(),
        };
        Ok(serde_json::to_string_pretty(&keyed)?)
    }

    fn decode(key: &StoreKey, contents: &str) -> Result<CredentialRecord> {
        let keyed: KeyedRecord = serde_json::from_str(contents)?;
        if keyed.owner_did != key.owner_did || keyed.node_url != key.node_url {
            anyhow::bail!(
                "record belongs to {}@{}, not {}",
                keyed.owner_did,
                keyed.node_url,
                key.account()
            );
        }
        Ok(keyed.record)
    }
}

/// Durable storage for the cached credential record.
///
/// Calls are synchronous; the session runs saves on a blocking task.
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` when nothing is stored for `key`.
    fn load(&self, key: &StoreKey) -> Result<Option<CredentialRecord>>;
    fn save(&self, key: &StoreKey, record: &CredentialRecord) -> Result<()>;
    fn clear(&self, key: &StoreKey) -> Result<()>;
}

/// Stores each record as a JSON file in a directory.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, key: &StoreKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, key: &StoreKey) -> Result<Option<CredentialRecord>> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read credential file: {}", path.display()))?;
        let record = KeyedRecord::decode(key, &contents)
            .with_context(|| format!("Failed to parse credential file: {}", path.display()))?;
        Ok(Some(record))
    }

    fn save(&self, key: &StoreKey, record: &CredentialRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create credential directory: {}", self.dir.display())
        })?;
        let path = self.record_path(key);
        let contents = KeyedRecord::encode(key, record)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write credential file: {}", path.display()))?;
        Ok(())
    }

    fn clear(&self, key: &StoreKey) -> Result<()> {
        let path = self.record_path(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove credential file: {}", path.display()))?;
        }
        Ok(())
    }
}

/// Keeps the record, serialized as JSON, in the OS keychain.
///
/// Entries are opened once per key and reused, so a backend only has to
/// keep state per entry handle.
#[derive(Default)]
pub struct KeyringCredentialStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(&self, key: &StoreKey, f: impl FnOnce(&Entry) -> Result<T>) -> Result<T> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Keyring entry cache lock poisoned"))?;
        let entry = match entries.entry(key.account()) {
            hash_map::Entry::Occupied(slot) => slot.into_mut(),
            hash_map::Entry::Vacant(slot) => slot.insert(
                Entry::new(SERVICE_NAME, &key.account()).context("Failed to create keyring entry")?,
            ),
        };
        f(entry)
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self, key: &StoreKey) -> Result<Option<CredentialRecord>> {
        self.with_entry(key, |entry| {
            let secret = match entry.get_password() {
                Ok(secret) => secret,
                Err(keyring::Error::NoEntry) => return Ok(None),
                Err(e) => return Err(e).context("Failed to retrieve credential from keychain"),
            };
            let record = KeyedRecord::decode(key, &secret)
                .context("Failed to parse credential stored in keychain")?;
            Ok(Some(record))
        })
    }

    fn save(&self, key: &StoreKey, record: &CredentialRecord) -> Result<()> {
        let secret = KeyedRecord::encode(key, record)?;
        self.with_entry(key, |entry| {
            entry
                .set_password(&secret)
                .context("Failed to store credential in keychain")
        })
    }

    fn clear(&self, key: &StoreKey) -> Result<()> {
        self.with_entry(key, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        })
    }
}

/// Process-local store, for sessions that should not outlive the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: Mutex<HashMap<String, CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CredentialRecord>>> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory credential store lock poisoned"))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, key: &StoreKey) -> Result<Option<CredentialRecord>> {
        Ok(self.records()?.get(&key.account()).cloned())
    }

    fn save(&self, key: &StoreKey, record: &CredentialRecord) -> Result<()> {
        self.records()?.insert(key.account(), record.clone());
        Ok(())
    }

    fn clear(&self, key: &StoreKey) -> Result<()> {
        self.records()?.remove(&key.account());
        Ok(())
    }
}
