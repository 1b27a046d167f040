//! Persistence of the local cart across reloads.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tradepost_core::{CartLineItem, ProductId};

use crate::lock;

/// Storage format version written with every snapshot.
const SNAPSHOT_VERSION: u32 = 1;

/// Errors that can occur when loading or saving the cart.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt cart file: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("unsupported cart file version {0}")]
    UnsupportedVersion(u32),
}

/// What survives a reload: the lines and any server work still owed for
/// local edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCart {
    pub version: u32,
    pub items: Vec<CartLineItem>,
    #[serde(default)]
    pub pending_removals: Vec<ProductId>,
    #[serde(default)]
    pub clear_pending: bool,
}

impl PersistedCart {
    #[must_use]
    pub const fn new(
        items: Vec<CartLineItem>,
        pending_removals: Vec<ProductId>,
        clear_pending: bool,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            items,
            pending_removals,
            clear_pending,
        }
    }
}

/// Where the cart is persisted.
pub trait CartStorage: Send + Sync {
    /// Load the last saved cart, `None` if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the stored cart cannot be read or parsed.
    fn load(&self) -> Result<Option<PersistedCart>, StorageError>;

    /// Save the cart, replacing any previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the snapshot cannot be written.
    fn save(&self, cart: &PersistedCart) -> Result<(), StorageError>;
}

/// JSON file storage.
///
/// Writes go to a sibling temp file first and are renamed into place so a
/// crash never leaves a half-written cart.
#[derive(Debug, Clone)]
pub struct FileCartStorage {
    path: PathBuf,
}

impl FileCartStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CartStorage for FileCartStorage {
    fn load(&self) -> Result<Option<PersistedCart>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let cart: PersistedCart = serde_json::from_slice(&bytes)?;
        if cart.version != SNAPSHOT_VERSION {
            return Err(StorageError::UnsupportedVersion(cart.version));
        }
        Ok(Some(cart))
    }

    fn save(&self, cart: &PersistedCart) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_vec_pretty(cart)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}

/// In-memory storage, for tests and sessions that should not touch disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryCartStorage {
    cart: Arc<Mutex<Option<PersistedCart>>>,
}

impl MemoryCartStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently saved snapshot.
    #[must_use]
    pub fn saved(&self) -> Option<PersistedCart> {
        lock(&self.cart).clone()
    }
}

impl CartStorage for MemoryCartStorage {
    fn load(&self) -> Result<Option<PersistedCart>, StorageError> {
        Ok(lock(&self.cart).clone())
    }

    fn save(&self, cart: &PersistedCart) -> Result<(), StorageError> {
        *lock(&self.cart) = Some(cart.clone());
        Ok(())
    }
}
