//! Credential storage and client resolution
//!
//! Access tokens are kept in ~/.config/roost/credentials.enc, a JSON map
//! encrypted with AES-256-GCM. The key is derived from machine-specific data,
//! so the file is useless when copied elsewhere.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

use crate::api::mastodon::MastodonClient;
use crate::api::{ClientResolver, RemoteClient};
use crate::db::Database;
use crate::models::Account;
use crate::paths;

const NONCE_SIZE: usize = 12;

/// Machine id used for key derivation, falling back to the home directory
fn machine_id() -> String {
    #[cfg(target_os = "linux")]
    {
        for candidate in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
            if let Ok(id) = fs::read_to_string(candidate) {
                return id.trim().to_string();
            }
        }
    }

    dirs::home_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "roost-fallback-key".to_string())
}

fn derive_key() -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(machine_id().as_bytes());
    if let Some(home) = dirs::home_dir() {
        hasher.update(home.to_string_lossy().as_bytes());
    }
    hasher.update(b"roost-sync-engine-v1");
    hasher.finalize().into()
}

fn cipher() -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(&derive_key()).map_err(|_| anyhow!("Invalid key length"))
}

/// Encrypted credential file
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store at the default location
    pub fn open() -> Result<Self> {
        Ok(Self::at(paths::credentials_path()?))
    }

    /// Store at a specific path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let encrypted = fs::read(&self.path).context("Failed to read credentials file")?;
        if encrypted.len() < NONCE_SIZE {
            return Ok(HashMap::new());
        }

        let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
        let plaintext = cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| anyhow!("Failed to decrypt credentials"))?;

        let json = String::from_utf8(plaintext).context("Invalid UTF-8 in credentials")?;
        serde_json::from_str(&json).context("Failed to parse credentials")
    }

    fn save(&self, creds: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_string(creds)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill(&mut nonce_bytes);

        let ciphertext = cipher()?
            .encrypt(Nonce::from_slice(&nonce_bytes), json.as_bytes())
            .map_err(|_| anyhow!("Failed to encrypt credentials"))?;

        let mut output = nonce_bytes.to_vec();
        output.extend(ciphertext);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create credentials directory")?;
        }
        fs::write(&self.path, output).context("Failed to write credentials file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms)?;
        }

        Ok(())
    }

    /// Store the access token of an account
    pub fn store_token(&self, account: &Account, token: &str) -> Result<()> {
        let mut creds = self.load().unwrap_or_default();
        creds.insert(account.credential_key(), token.to_string());
        self.save(&creds)
    }

    /// Access token of an account, if stored
    pub fn token(&self, account: &Account) -> Result<Option<String>> {
        Ok(self.load()?.get(&account.credential_key()).cloned())
    }

    /// Forget the access token of an account
    pub fn delete_token(&self, account: &Account) -> Result<()> {
        let mut creds = self.load().unwrap_or_default();
        creds.remove(&account.credential_key());
        self.save(&creds)
    }

    /// Store OAuth client credentials for an instance
    pub fn store_oauth_client(
        &self,
        instance: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<()> {
        let mut creds = self.load().unwrap_or_default();
        creds.insert(
            format!("oauth:{instance}:client"),
            format!("{client_id}:{client_secret}"),
        );
        self.save(&creds)
    }

    /// OAuth client credentials for an instance
    pub fn oauth_client(&self, instance: &str) -> Result<Option<(String, String)>> {
        let creds = self.load()?;
        Ok(creds
            .get(&format!("oauth:{instance}:client"))
            .and_then(|value| value.split_once(':'))
            .map(|(id, secret)| (id.to_string(), secret.to_string())))
    }
}

/// Resolves account ids to authenticated Mastodon clients.
///
/// Clients are cached per account so repeated fan-outs reuse connections.
pub struct CredentialResolver {
    db: Arc<Mutex<Database>>,
    store: CredentialStore,
    clients: StdMutex<HashMap<i64, Arc<dyn RemoteClient>>>,
}

impl CredentialResolver {
    /// Create a resolver over the account table and a credential store
    pub fn new(db: Arc<Mutex<Database>>, store: CredentialStore) -> Self {
        Self {
            db,
            store,
            clients: StdMutex::new(HashMap::new()),
        }
    }

    /// Drop the cached client of an account (after re-authentication)
    pub fn invalidate(&self, account_id: i64) {
        if let Ok(mut clients) = self.clients.lock() {
            clients.remove(&account_id);
        }
    }

    fn cached(&self, account_id: i64) -> Option<Arc<dyn RemoteClient>> {
        self.clients
            .lock()
            .ok()
            .and_then(|clients| clients.get(&account_id).cloned())
    }
}

#[async_trait]
impl ClientResolver for CredentialResolver {
    async fn client_for(&self, account_id: i64) -> Option<Arc<dyn RemoteClient>> {
        if let Some(client) = self.cached(account_id) {
            return Some(client);
        }

        let account = match self.db.lock().await.get_account(account_id) {
            Ok(Some(account)) => account,
            Ok(None) => {
                tracing::debug!(account_id, "no such account");
                return None;
            }
            Err(e) => {
                tracing::warn!(account_id, "Failed to load account: {e:#}");
                return None;
            }
        };

        let token = match self.store.token(&account) {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!(account_id, "no stored token");
                return None;
            }
            Err(e) => {
                tracing::warn!(account_id, "Failed to read credentials: {e:#}");
                return None;
            }
        };

        let client: Arc<dyn RemoteClient> = Arc::new(MastodonClient::new(&account.server, &token));
        if let Ok(mut clients) = self.clients.lock() {
            clients.insert(account_id, Arc::clone(&client));
        }
        Some(client)
    }
}
