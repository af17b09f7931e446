//! Persistent decision cache.
//!
//! A flat JSON object keyed by `<kind>:<absolute path>`.
//! Keys use full paths, so moved or renamed sources are treated as new files.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::archive::category::Category;
use crate::archive::types::{FolderVerdict, MatchMethod};
use crate::print_warning;

/// Which decision a cache entry stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Folder,
    Category,
}

/// Cached value for a folder that was associated with a film.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FolderEntry {
    film_id: String,
    method: MatchMethod,
}

#[derive(Debug, Default)]
pub struct DecisionCache {
    path: Option<PathBuf>,
    entries: BTreeMap<String, Value>,
    dirty: bool,
}

impl CacheKind {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Category => "category",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl DecisionCache {
    /// Load the cache file. A missing file gives an empty cache,
    /// and so does an unreadable one after printing a warning.
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let entries = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str::<BTreeMap<String, Value>>(&content).unwrap_or_else(|error| {
                print_warning!("Ignoring corrupt decision cache {}: {error}", path.display());
                BTreeMap::new()
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => {
                print_warning!("Failed to read decision cache {}: {error}", path.display());
                BTreeMap::new()
            }
        };
        Self {
            path: Some(path.to_path_buf()),
            entries,
            dirty: false,
        }
    }

    /// Cache key for a decision about the given path.
    #[must_use]
    pub fn key(kind: CacheKind, path: &Path) -> String {
        format!("{kind}:{}", crate::path_to_string(path))
    }

    #[must_use]
    pub fn get(&self, kind: CacheKind, path: &Path) -> Option<&Value> {
        self.entries.get(&Self::key(kind, path))
    }

    /// Store a decision. Last write wins.
    pub fn insert(&mut self, kind: CacheKind, path: &Path, value: Value) {
        let key = Self::key(kind, path);
        if self.entries.get(&key) != Some(&value) {
            self.entries.insert(key, value);
            self.dirty = true;
        }
    }

    /// Cached category for a file, if any valid one is stored.
    #[must_use]
    pub fn category(&self, path: &Path) -> Option<Category> {
        self.get(CacheKind::Category, path)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn set_category(&mut self, path: &Path, category: Category) {
        self.insert(CacheKind::Category, path, Value::String(category.as_str().to_string()));
    }

    /// Cached folder verdict. Undecided folders are never stored.
    #[must_use]
    pub fn folder(&self, path: &Path) -> Option<FolderVerdict> {
        match self.get(CacheKind::Folder, path)? {
            Value::Bool(false) => Some(FolderVerdict::NotFilm),
            value @ Value::Object(_) => serde_json::from_value::<FolderEntry>(value.clone())
                .ok()
                .map(|entry| FolderVerdict::Film {
                    film_id: entry.film_id,
                    method: entry.method,
                }),
            _ => None,
        }
    }

    pub fn set_folder(&mut self, path: &Path, verdict: &FolderVerdict) {
        let value = match verdict {
            FolderVerdict::Film { film_id, method } => serde_json::json!({
                "film_id": film_id,
                "method": method,
            }),
            FolderVerdict::NotFilm => Value::Bool(false),
            FolderVerdict::Unknown => return,
        };
        self.insert(CacheKind::Folder, path, value);
    }

    /// Write the cache to disk if anything changed since the last save.
    ///
    /// The file is replaced atomically so an interrupted write never leaves a truncated cache.
    ///
    /// # Errors
    /// Returns an error if the cache directory or file cannot be written.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let parent = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;

        let serialized = serde_json::to_string_pretty(&self.entries).context("Failed to serialize decision cache")?;
        let mut file = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        file.persist(path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;

        self.dirty = false;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod cache_tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn keys_are_prefixed_by_kind() {
        let path = Path::new("/archive/The Kid");
        assert_eq!(DecisionCache::key(CacheKind::Folder, path), "folder:/archive/The Kid");
        assert_eq!(DecisionCache::key(CacheKind::Category, path), "category:/archive/The Kid");
    }

    #[test]
    fn save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("decisions.json");
        let mut cache = DecisionCache::load(Some(&path));
        assert!(cache.is_empty());

        let film = FolderVerdict::Film {
            film_id: "100".to_string(),
            method: MatchMethod::Exact,
        };
        cache.set_folder(Path::new("/src/1921 - The Kid"), &film);
        cache.set_folder(Path::new("/src/Press"), &FolderVerdict::NotFilm);
        cache.set_folder(Path::new("/src/misc"), &FolderVerdict::Unknown);
        cache.set_category(Path::new("/src/1921 - The Kid/poster1.jpg"), Category::Affiches);
        cache.save().unwrap();

        let reloaded = DecisionCache::load(Some(&path));
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.folder(Path::new("/src/1921 - The Kid")), Some(film));
        assert_eq!(reloaded.folder(Path::new("/src/Press")), Some(FolderVerdict::NotFilm));
        assert_eq!(reloaded.folder(Path::new("/src/misc")), None);
        assert_eq!(
            reloaded.category(Path::new("/src/1921 - The Kid/poster1.jpg")),
            Some(Category::Affiches)
        );
    }

    #[test]
    fn last_write_wins() {
        let mut cache = DecisionCache::default();
        let path = Path::new("/src/a.pdf");
        cache.set_category(path, Category::Divers);
        cache.set_category(path, Category::Factures);
        assert_eq!(cache.category(path), Some(Category::Factures));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn corrupt_file_gives_empty_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decisions.json");
        fs::write(&path, "{not json").unwrap();
        let cache = DecisionCache::load(Some(&path));
        assert!(cache.is_empty());
    }

    #[test]
    fn invalid_category_value_is_ignored() {
        let mut cache = DecisionCache::default();
        let path = Path::new("/src/a.pdf");
        cache.insert(CacheKind::Category, path, Value::String("Unknown".to_string()));
        assert_eq!(cache.category(path), None);
    }

    #[test]
    fn in_memory_cache_save_is_noop() {
        let mut cache = DecisionCache::default();
        cache.set_category(Path::new("/x.jpg"), Category::PhotoHd);
        assert!(cache.save().is_ok());
    }
}
