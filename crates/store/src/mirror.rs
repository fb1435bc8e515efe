//! Persistent key-value mirror for anonymous sessions.
//!
//! Anonymous collections live only on the client. Each collection kind owns
//! one string-valued slot (`cartData`, `wishlistData`, `saveForLaterData`)
//! holding a JSON array of line items.
//!
//! The mirror is best effort. Write failures are logged and swallowed so the
//! session keeps working in memory; unreadable values are deleted and read
//! back as an empty collection.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};
use yoraa_core::{CollectionKind, LineItem};

/// String-keyed, string-valued persistent storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn get(&self, key: &str) -> io::Result<Option<String>>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn set(&self, key: &str, value: &str) -> io::Result<()>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be modified.
    fn remove(&self, key: &str) -> io::Result<()>;
}

// =============================================================================
// MemoryKv
// =============================================================================

/// In-process storage. Values vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> io::Error {
    io::Error::other("memory store lock poisoned")
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

// =============================================================================
// FileKv
// =============================================================================

/// Directory-backed storage: one `<key>.json` file per key.
///
/// Writes go to a temporary sibling and are renamed into place, so a crash
/// mid-write leaves either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileKv {
    dir: PathBuf,
}

impl FileKv {
    /// Open (and create if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileKv {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Mirror
// =============================================================================

/// A collection kind's slot in a [`KeyValueStore`].
#[derive(Clone)]
pub struct Mirror {
    backend: Arc<dyn KeyValueStore>,
    kind: CollectionKind,
}

impl std::fmt::Debug for Mirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mirror")
            .field("key", &self.key())
            .finish_non_exhaustive()
    }
}

impl Mirror {
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>, kind: CollectionKind) -> Self {
        Self { backend, kind }
    }

    /// Storage key for this mirror.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.kind.storage_key()
    }

    /// Serialize and persist items. Returns whether the write succeeded.
    pub fn save(&self, items: &[LineItem]) -> bool {
        let result = serde_json::to_string(items)
            .map_err(io::Error::from)
            .and_then(|json| self.backend.set(self.key(), &json));

        match result {
            Ok(()) => {
                debug!(key = self.key(), items = items.len(), "Saved collection to mirror");
                true
            }
            Err(e) => {
                warn!(key = self.key(), error = %e, "Failed to save collection; continuing in memory");
                false
            }
        }
    }

    /// Read persisted items.
    ///
    /// A missing key yields an empty list. A value that cannot be read or
    /// parsed is deleted and also yields an empty list.
    #[must_use]
    pub fn restore(&self) -> Vec<LineItem> {
        let raw = match self.backend.get(self.key()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key = self.key(), error = %e, "Failed to read mirror");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<LineItem>>(&raw) {
            Ok(items) => {
                debug!(key = self.key(), items = items.len(), "Restored collection from mirror");
                items
            }
            Err(e) => {
                warn!(key = self.key(), error = %e, "Discarding unreadable mirror value");
                self.clear();
                Vec::new()
            }
        }
    }

    /// Delete the key outright.
    pub fn clear(&self) {
        if let Err(e) = self.backend.remove(self.key()) {
            warn!(key = self.key(), error = %e, "Failed to delete mirror key");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use yoraa_core::LineItemDraft;

    use super::*;

    /// Storage that fails every write, like a browser over its quota.
    struct FullStorage;

    impl KeyValueStore for FullStorage {
        fn get(&self, _key: &str) -> io::Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> io::Result<()> {
            Err(io::Error::other("quota exceeded"))
        }

        fn remove(&self, _key: &str) -> io::Result<()> {
            Ok(())
        }
    }

    fn sample_items() -> Vec<LineItem> {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        vec![
            LineItemDraft::new("A", Decimal::new(2550, 2))
                .with_name("Tee")
                .with_size("M")
                .with_color("Blue")
                .with_quantity(2)
                .into_line_item(at),
            LineItemDraft::new("B", Decimal::from(600))
                .with_note("birthday")
                .into_line_item(at),
        ]
    }

    fn memory_mirror(kind: CollectionKind) -> (Arc<MemoryKv>, Mirror) {
        let kv = Arc::new(MemoryKv::new());
        let mirror = Mirror::new(kv.clone(), kind);
        (kv, mirror)
    }

    #[test]
    fn test_round_trip() {
        let (_, mirror) = memory_mirror(CollectionKind::Cart);
        let items = sample_items();
        assert!(mirror.save(&items));
        assert_eq!(mirror.restore(), items);
    }

    #[test]
    fn test_missing_key_restores_empty() {
        let (_, mirror) = memory_mirror(CollectionKind::Wishlist);
        assert!(mirror.restore().is_empty());
    }

    #[test]
    fn test_corrupt_value_is_wiped() {
        let (kv, mirror) = memory_mirror(CollectionKind::SaveForLater);
        kv.set("saveForLaterData", "{not json").unwrap();
        assert!(mirror.restore().is_empty());
        assert_eq!(kv.get("saveForLaterData").unwrap(), None);
    }

    #[test]
    fn test_clear_deletes_key() {
        let (kv, mirror) = memory_mirror(CollectionKind::Cart);
        mirror.save(&sample_items());
        mirror.clear();
        assert_eq!(kv.get("cartData").unwrap(), None);
        assert!(mirror.restore().is_empty());
    }

    #[test]
    fn test_kinds_use_independent_keys() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());
        let cart = Mirror::new(kv.clone(), CollectionKind::Cart);
        let wishlist = Mirror::new(kv, CollectionKind::Wishlist);
        cart.save(&sample_items());
        assert!(wishlist.restore().is_empty());
    }

    #[test]
    fn test_failed_write_degrades_gracefully() {
        let mirror = Mirror::new(Arc::new(FullStorage), CollectionKind::Cart);
        assert!(!mirror.save(&sample_items()));
        assert!(mirror.restore().is_empty());
    }

    #[test]
    fn test_file_kv_round_trip() {
        let dir = std::env::temp_dir().join(format!("yoraa-mirror-{}", uuid::Uuid::new_v4()));
        let kv = FileKv::open(&dir).unwrap();
        assert_eq!(kv.get("cartData").unwrap(), None);
        kv.set("cartData", "[]").unwrap();
        assert_eq!(kv.get("cartData").unwrap().as_deref(), Some("[]"));
        kv.remove("cartData").unwrap();
        kv.remove("cartData").unwrap();
        assert_eq!(kv.get("cartData").unwrap(), None);
        fs::remove_dir_all(dir).unwrap();
    }
}
