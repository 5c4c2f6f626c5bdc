use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use log::info;

use crate::error::Result;

/// Persistence seam for the single session token. The console keeps exactly
/// one token per installation; implementations hold at most one value.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().map(|t| t.clone()).unwrap_or(None)
    }

    fn save(&self, token: &str) -> Result<()> {
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(token.to_string());
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if let Ok(mut slot) = self.token.lock() {
            *slot = None;
        }
        Ok(())
    }
}

/// Single-value token file, the equivalent of the fixed browser-storage key
/// the console used to read at module load.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        fs::read_to_string(&self.path)
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|token| !token.is_empty())
    }

    fn save(&self, token: &str) -> Result<()> {
        fs::write(&self.path, token)?;
        info!("Persisted session token to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_token_path() -> PathBuf {
        std::env::temp_dir().join(format!("ms-session-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.load(), None);

        store.save("mock-jwt-token-123").unwrap();
        assert_eq!(store.load().as_deref(), Some("mock-jwt-token-123"));

        store.clear().unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn file_store_round_trip() {
        let path = temp_token_path();
        let store = FileTokenStore::new(&path);

        assert_eq!(store.load(), None);
        store.save("mock-jwt-token-123").unwrap();
        assert_eq!(store.load().as_deref(), Some("mock-jwt-token-123"));

        store.clear().unwrap();
        assert_eq!(store.load(), None);
        // Clearing twice is not an error.
        store.clear().unwrap();
    }

    #[test]
    fn file_store_trims_trailing_newline() {
        let path = temp_token_path();
        std::fs::write(&path, "mock-jwt-token-123\n").unwrap();

        let store = FileTokenStore::new(&path);
        assert_eq!(store.load().as_deref(), Some("mock-jwt-token-123"));
        store.clear().unwrap();
    }
}
