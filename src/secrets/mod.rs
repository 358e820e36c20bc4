use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};
use tracing::debug;

use crate::enrichment::SecretSpec;

/// Config key under which a stash reference travels instead of the secret
/// itself
pub const STASH_CONFIG_KEY: &str = "enrichment_secret";

/// A resolved credential. Held in memory for the lifetime of a run and
/// never written to the job store.
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue(..)")
    }
}

/// Identity of the caller submitting or controlling a job. Authentication
/// happens upstream; the engine only consumes the result.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub id: Option<String>,
    /// Whether this actor may read from the external secret store
    pub can_use_secret_store: bool,
}

#[derive(Debug)]
pub enum SecretError {
    /// No link in the chain produced a value; the job must not be created
    Unavailable(String),
    Store(String),
}

impl fmt::Display for SecretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretError::Unavailable(name) => {
                write!(f, "Secret '{}' could not be resolved", name)
            }
            SecretError::Store(msg) => write!(f, "Secret store error: {}", msg),
        }
    }
}

impl std::error::Error for SecretError {}

/// External secret store boundary. The real deployment backs this with an
/// encrypted store; the trait is the seam.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<String>, SecretError>;
}

/// Store that never has anything; used when no SECRETS_FILE is configured
pub struct NoSecretStore;

#[async_trait]
impl SecretStore for NoSecretStore {
    async fn get(&self, _name: &str) -> Result<Option<String>, SecretError> {
        Ok(None)
    }
}

/// JSON-file-backed store for single-node deployments, loaded once at
/// startup
pub struct FileSecretStore {
    values: HashMap<String, String>,
}

impl FileSecretStore {
    pub fn load(path: &str) -> Result<Self, SecretError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SecretError::Store(format!("Could not read {}: {}", path, e)))?;
        let values: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| SecretError::Store(format!("Invalid secrets file {}: {}", path, e)))?;
        Ok(Self { values })
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(self.values.get(name).cloned())
    }
}

/// Resolves named credentials with a fixed priority chain:
/// (1) process environment, (2) the external store when the actor holds the
/// privilege, (3) an ephemeral value stashed at submission time.
///
/// Resolution runs once per job run; the result is cached on the run
/// context, not here.
pub struct SecretResolver {
    store: Box<dyn SecretStore>,
    stash: Mutex<HashMap<String, String>>,
}

impl SecretResolver {
    pub fn new(store: Box<dyn SecretStore>) -> Self {
        Self {
            store,
            stash: Mutex::new(HashMap::new()),
        }
    }

    /// Stash an ephemeral secret supplied at submission. Returns the random
    /// key that rides in the job config in place of the value. The stash
    /// lives in process memory only, so it does not survive a restart.
    pub fn stash(&self, value: &str) -> String {
        let key: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(22)
            .map(char::from)
            .collect();
        self.stash
            .lock()
            .expect("secret stash lock poisoned")
            .insert(key.clone(), value.to_string());
        key
    }

    /// Walk the priority chain for `spec`
    pub async fn resolve(
        &self,
        spec: &SecretSpec,
        config: &Map<String, Value>,
        actor: &Actor,
    ) -> Result<SecretValue, SecretError> {
        if let Ok(value) = env::var(spec.name) {
            debug!("Secret '{}' resolved from environment", spec.name);
            return Ok(SecretValue::new(value));
        }

        if actor.can_use_secret_store {
            if let Some(value) = self.store.get(spec.name).await? {
                debug!("Secret '{}' resolved from store", spec.name);
                return Ok(SecretValue::new(value));
            }
        }

        if let Some(key) = config.get(STASH_CONFIG_KEY).and_then(Value::as_str) {
            let stash = self.stash.lock().expect("secret stash lock poisoned");
            if let Some(value) = stash.get(key) {
                debug!("Secret '{}' resolved from stash", spec.name);
                return Ok(SecretValue::new(value.clone()));
            }
        }

        Err(SecretError::Unavailable(spec.name.to_string()))
    }
}
