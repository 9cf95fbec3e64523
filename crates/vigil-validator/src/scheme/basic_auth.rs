//! HTTP basic authentication against a credential file.
//!
//! The file holds one `user:hash` entry per line; blank lines and lines
//! starting with `#` are skipped.  Accepted hash forms:
//!
//! | Form            | Meaning                              |
//! |-----------------|--------------------------------------|
//! | `{SHA256}<hex>` | hex SHA-256 digest of the password   |
//! | `{PLAIN}<pw>`   | plain-text password                  |
//! | `<pw>`          | plain-text password                  |
//!
//! The file is watched and reloaded on change.  A reload that fails keeps the
//! previous credentials.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use vigil_kernel::gateway::GatewayRequest;

use super::SchemeValidator;
use crate::error::{ConfigError, ConfigResult, ValidationError};
use crate::spec::Scheme;
use crate::watch::{DEFAULT_DEBOUNCE, FileWatcher};

/// `basicAuth` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BasicAuthSpec {
    /// Path of the credential file.
    pub user_file: String,

    /// Quiet period before a change to the file is reloaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

impl BasicAuthSpec {
    pub fn user_file(path: impl Into<String>) -> Self {
        Self {
            user_file: path.into(),
            debounce_ms: None,
        }
    }
}

/// SHA-256 digest of the expected password; plain-text entries are hashed
/// on load so every comparison has the same length.
type Digest256 = [u8; 32];

fn sha256(data: &[u8]) -> Digest256 {
    Sha256::digest(data).into()
}

fn parse_entry(hash: &str) -> Result<Digest256, String> {
    if let Some(hex_digest) = hash.strip_prefix("{SHA256}") {
        let bytes = hex::decode(hex_digest).map_err(|e| format!("bad SHA256 digest: {e}"))?;
        return Digest256::try_from(bytes.as_slice())
            .map_err(|_| "SHA256 digest must be 32 bytes".to_string());
    }
    Ok(sha256(hash.strip_prefix("{PLAIN}").unwrap_or(hash).as_bytes()))
}

fn parse_credentials(content: &str) -> Result<HashMap<String, Digest256>, String> {
    let mut users = HashMap::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (user, hash) = line
            .split_once(':')
            .ok_or_else(|| format!("line {}: expected user:hash", n + 1))?;
        if user.is_empty() {
            return Err(format!("line {}: empty user name", n + 1));
        }
        let digest = parse_entry(hash).map_err(|e| format!("line {}: {e}", n + 1))?;
        users.insert(user.to_string(), digest);
    }
    Ok(users)
}

struct CredentialStore {
    path: PathBuf,
    users: RwLock<HashMap<String, Digest256>>,
}

impl CredentialStore {
    fn read(path: &Path) -> ConfigResult<HashMap<String, Digest256>> {
        let store_err = |reason: String| ConfigError::CredentialStore {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| store_err(e.to_string()))?;
        parse_credentials(&content).map_err(store_err)
    }

    fn load(path: PathBuf) -> ConfigResult<Self> {
        let users = Self::read(&path)?;
        info!(path = %path.display(), users = users.len(), "Loaded basic auth credentials");
        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }

    fn reload(&self) -> ConfigResult<usize> {
        let users = Self::read(&self.path)?;
        let count = users.len();
        *self.users.write() = users;
        Ok(count)
    }

    fn verify(&self, user: &str, password: &str) -> bool {
        let users = self.users.read();
        let Some(expected) = users.get(user) else {
            return false;
        };
        sha256(password.as_bytes())
            .as_slice()
            .ct_eq(expected.as_slice())
            .into()
    }
}

/// Validator for the `basicAuth` section.
pub struct BasicAuthValidator {
    store: Arc<CredentialStore>,
    watcher: FileWatcher,
}

impl BasicAuthValidator {
    pub fn new(spec: &BasicAuthSpec) -> ConfigResult<Self> {
        if spec.user_file.trim().is_empty() {
            return Err(ConfigError::invalid(Scheme::BasicAuth, "userFile must be specified"));
        }

        let store = Arc::new(CredentialStore::load(PathBuf::from(&spec.user_file))?);
        let debounce = spec
            .debounce_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE);

        let watched = Arc::clone(&store);
        let watcher = FileWatcher::spawn(&store.path, debounce, move |path| {
            match watched.reload() {
                Ok(users) => info!(path = %path.display(), users, "Reloaded basic auth credentials"),
                Err(e) => warn!(error = %e, "Keeping previous basic auth credentials"),
            }
        })?;

        Ok(Self { store, watcher })
    }

    /// Re-read the credential file now.
    pub fn reload(&self) -> ConfigResult<usize> {
        self.store.reload()
    }

    pub fn user_count(&self) -> usize {
        self.store.users.read().len()
    }

    /// Whether the credential file is still watched.
    pub fn is_watching(&self) -> bool {
        self.watcher.is_running()
    }
}

#[async_trait]
impl SchemeValidator for BasicAuthValidator {
    fn scheme(&self) -> Scheme {
        Scheme::BasicAuth
    }

    async fn validate(&self, request: &GatewayRequest) -> Result<(), ValidationError> {
        let encoded = request
            .authorization("Basic")
            .ok_or_else(|| ValidationError::missing("basic credentials not found"))?;
        let decoded = STANDARD
            .decode(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| ValidationError::invalid("malformed basic credentials"))?;
        let (user, password) = decoded
            .split_once(':')
            .ok_or_else(|| ValidationError::invalid("malformed basic credentials"))?;

        if self.store.verify(user, password) {
            Ok(())
        } else {
            Err(ValidationError::invalid("invalid username or password"))
        }
    }

    fn release(&self) {
        self.watcher.stop();
    }
}
