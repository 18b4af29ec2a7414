use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::{debug, warn};

use super::TokenPair;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Keychain service name
const SERVICE_NAME: &str = "mbfhr";

/// Well-known key the serialized pair is stored under
const TOKENS_KEY: &str = "tokens";

/// Durable home for the serialized token pair.
///
/// Implementations write the whole pair in one step; a reader never sees
/// half of one.
pub trait TokenPersistence: Send + Sync {
    fn load(&self) -> Result<Option<TokenPair>>;
    fn save(&self, pair: &TokenPair) -> Result<()>;
    fn remove(&self) -> Result<()>;
}

/// JSON file in the cache directory.
pub struct FileBackend {
    cache_dir: PathBuf,
}

impl FileBackend {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl TokenPersistence for FileBackend {
    fn load(&self) -> Result<Option<TokenPair>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let pair = serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(pair))
    }

    fn save(&self, pair: &TokenPair) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir).context("Failed to create cache directory")?;
        let path = self.session_path();
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(pair)?;
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        std::fs::rename(&tmp, &path).context("Failed to replace session file")?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// OS keychain entry holding the serialized pair.
pub struct KeyringBackend;

impl KeyringBackend {
    fn entry() -> Result<Entry> {
        Entry::new(SERVICE_NAME, TOKENS_KEY).context("Failed to create keyring entry")
    }
}

impl TokenPersistence for KeyringBackend {
    fn load(&self) -> Result<Option<TokenPair>> {
        match Self::entry()?.get_password() {
            Ok(contents) => {
                let pair = serde_json::from_str(&contents)
                    .context("Failed to parse tokens from keychain")?;
                Ok(Some(pair))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve tokens from keychain"),
        }
    }

    fn save(&self, pair: &TokenPair) -> Result<()> {
        let contents = serde_json::to_string(pair)?;
        Self::entry()?
            .set_password(&contents)
            .context("Failed to store tokens in keychain")
    }

    fn remove(&self) -> Result<()> {
        match Self::entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete tokens from keychain"),
        }
    }
}

/// Holder of the current token pair.
///
/// The in-memory copy is authoritative. Persistence is best-effort: backend
/// failures are logged and swallowed so the session state machine never sees
/// them.
pub struct TokenStore {
    current: Mutex<Option<TokenPair>>,
    backend: Option<Box<dyn TokenPersistence>>,
}

impl TokenStore {
    /// Open a store over `backend`, restoring whatever it holds.
    pub fn open(backend: Box<dyn TokenPersistence>) -> Self {
        let restored = match backend.load() {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted tokens, starting anonymous");
                None
            }
        };
        debug!(restored = restored.is_some(), "Token store opened");
        Self {
            current: Mutex::new(restored),
            backend: Some(backend),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            current: Mutex::new(None),
            backend: None,
        }
    }

    pub fn get(&self) -> Option<TokenPair> {
        self.lock().clone()
    }

    pub fn set(&self, pair: TokenPair) {
        if let Some(ref backend) = self.backend {
            if let Err(e) = backend.save(&pair) {
                warn!(error = %e, "Failed to persist tokens, keeping them in memory only");
            }
        }
        *self.lock() = Some(pair);
    }

    pub fn clear(&self) {
        if let Some(ref backend) = self.backend {
            if let Err(e) = backend.remove() {
                warn!(error = %e, "Failed to remove persisted tokens");
            }
        }
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<TokenPair>> {
        // A poisoned lock still holds a complete value; keep going.
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
