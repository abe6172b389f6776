use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::errors::Error;

use super::Token;

/// Opaque persisted credential storage keyed by service name.
///
/// Implementations may block; [`TokenStore`] calls them on the blocking pool.
pub trait CredentialStore: Send + Sync {
    fn get(&self, service: &str) -> Result<Option<Vec<u8>>, Error>;
    fn set(&self, service: &str, value: Option<&[u8]>) -> Result<(), Error>;
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, service: &str) -> Result<Option<Vec<u8>>, Error> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| Error::Credential("memory store poisoned".into()))?;
        Ok(entries.get(service).cloned())
    }

    fn set(&self, service: &str, value: Option<&[u8]>) -> Result<(), Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Credential("memory store poisoned".into()))?;
        match value {
            Some(bytes) => {
                entries.insert(service.to_string(), bytes.to_vec());
            }
            None => {
                entries.remove(service);
            }
        }
        Ok(())
    }
}

/// One file per service under a directory.
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, service: &str) -> PathBuf {
        let file: String = service
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.credential", file))
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, service: &str) -> Result<Option<Vec<u8>>, Error> {
        match std::fs::read(self.path_for(service)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Credential(format!("read failed: {}", err))),
        }
    }

    fn set(&self, service: &str, value: Option<&[u8]>) -> Result<(), Error> {
        let path = self.path_for(service);
        match value {
            Some(bytes) => {
                let tmp = path.with_extension("tmp");
                std::fs::write(&tmp, bytes)
                    .and_then(|_| std::fs::rename(&tmp, &path))
                    .map_err(|e| Error::Credential(format!("write failed: {}", e)))
            }
            None => match std::fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(Error::Credential(format!("delete failed: {}", err))),
            },
        }
    }
}

/// Typed view over a [`CredentialStore`] entry; reads and writes are serialized.
pub struct TokenStore {
    backend: Arc<dyn CredentialStore>,
    service: String,
    lock: AsyncMutex<()>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn CredentialStore>, service: impl Into<String>) -> Self {
        Self {
            backend,
            service: service.into(),
            lock: AsyncMutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCredentialStore::new()), "default")
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub async fn get(&self) -> Result<Option<Token>, Error> {
        let _guard = self.lock.lock().await;
        let stored = self.blocking(|backend, service| backend.get(service)).await?;
        match stored {
            Some(bytes) => Ok(Some(Token::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, token: Option<&Token>) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let bytes = token.map(Token::to_bytes).transpose()?;
        self.blocking(move |backend, service| backend.set(service, bytes.as_deref()))
            .await?;
        debug!(service = %self.service, present = token.is_some(), "credential.updated");
        Ok(())
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CredentialStore, &str) -> Result<T, Error> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || op(backend.as_ref(), &service))
            .await
            .map_err(|e| Error::Credential(format!("credential store task failed: {}", e)))?
    }

    /// Current access token value, if any.
    pub async fn current_auth(&self) -> Result<Option<String>, Error> {
        Ok(self.get().await?.map(|t| t.auth().to_string()))
    }
}
