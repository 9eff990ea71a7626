//! Durable key/value persistence for session tokens
//!
//! `KeyValueStore` is the raw backend: `FileStore` keeps a JSON object on disk
//! (atomic temp-file + rename, 0600), `MemoryStore` lives only as long as the
//! process. `SessionStore` layers the session contract on top and treats
//! persistence failures as non-fatal: they are logged and the in-memory
//! session keeps working for the rest of the process.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::{Error, Result};
use crate::session::Session;

/// Boxed future returned by `KeyValueStore` methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// String key/value persistence.
///
/// Each call is one scoped acquisition of the backend: it either completes
/// (written and flushed) or fails, and the backend is released either way.
/// Uses `Pin<Box<dyn Future>>` return types so stores can be shared as
/// `Arc<dyn KeyValueStore>`.
pub trait KeyValueStore: Send + Sync {
    /// Read one entry.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Insert or replace several entries in one write.
    fn set<'a>(&'a self, entries: &'a [(&'a str, &'a str)]) -> StoreFuture<'a, ()>;

    /// Remove several entries in one write. Missing keys are ignored.
    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()>;
}

/// JSON-file backed store.
///
/// The Mutex serializes every read-modify-write so concurrent saves from a
/// refresh and a logout cannot interleave on disk.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// If the file doesn't exist, creates it as `{}` (first launch, signed
    /// out).
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::StoreParse(format!("parsing session file: {e}")))?;
            info!(path = %path.display(), entries = entries.len(), "opened session store");
            entries
        } else {
            info!(path = %path.display(), "session file not found, starting signed out");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            Ok(state.get(key).cloned())
        })
    }

    fn set<'a>(&'a self, entries: &'a [(&'a str, &'a str)]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            for (key, value) in entries {
                state.insert((*key).to_string(), (*value).to_string());
            }
            write_atomic(&self.path, &state).await
        })
    }

    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let before = state.len();
            for key in keys {
                state.remove(*key);
            }
            if state.len() == before {
                return Ok(());
            }
            write_atomic(&self.path, &state).await
        })
    }
}

/// In-process store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.state.lock().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, entries: &'a [(&'a str, &'a str)]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            for (key, value) in entries {
                state.insert((*key).to_string(), (*value).to_string());
            }
            Ok(())
        })
    }

    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            for key in keys {
                state.remove(*key);
            }
            Ok(())
        })
    }
}

/// Session persistence over any `KeyValueStore`.
///
/// One attempt per call, no retries. Failures are logged, never returned:
/// an unsynced session still works until the process exits.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Session store with no durable backing (tests, ephemeral clients).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// The raw backend, for collaborators persisting their own entries
    /// (e.g. the cached user profile).
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Restore the persisted session, or an empty one if nothing is stored
    /// or the backend fails.
    pub async fn load(&self) -> Session {
        let access = self.backend.get(ACCESS_TOKEN_KEY).await;
        let refresh = self.backend.get(REFRESH_TOKEN_KEY).await;
        match (access, refresh) {
            (Ok(access), Ok(refresh)) => {
                let session = Session::from_parts(access, refresh);
                debug!(
                    authenticated = session.is_authenticated(),
                    has_refresh_token = session.refresh_token().is_some(),
                    "loaded session"
                );
                session
            }
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "failed to load session tokens");
                Session::empty()
            }
        }
    }

    /// Persist both tokens.
    pub async fn save(&self, access_token: &Secret<String>, refresh_token: &Secret<String>) {
        let entries = [
            (ACCESS_TOKEN_KEY, access_token.expose_str()),
            (REFRESH_TOKEN_KEY, refresh_token.expose_str()),
        ];
        match self.backend.set(&entries).await {
            Ok(()) => debug!("persisted session tokens"),
            Err(e) => error!(error = %e, "failed to save session tokens"),
        }
    }

    /// Remove both tokens from the backend.
    pub async fn clear(&self) {
        match self
            .backend
            .remove(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
            .await
        {
            Ok(()) => debug!("cleared persisted session tokens"),
            Err(e) => error!(error = %e, "failed to clear session tokens"),
        }
    }
}

/// Write entries to a file atomically.
///
/// Writes a temporary file in the same directory and renames it over the
/// target, so a crash mid-write leaves the previous contents intact. The file
/// holds bearer credentials, so it is restricted to 0600 on unix.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::StoreParse(format!("serializing session entries: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("session path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io("session path has no file name".into()))?;

    // Named after the target so stores sharing a directory never collide
    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session file");
    Ok(())
}
