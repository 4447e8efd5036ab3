//! The persisted settings and most-recently-used file list.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Maximum number of entries in the most-recently-used file list.
pub const MRU_CAPACITY: usize = 10;

/// Errors while loading or saving the persisted [`Store`].
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The store file could not be read or written.
    #[error("Failed to access the settings store at {path}")]
    Io {
        /// Location of the store.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The store file does not contain a valid store.
    #[error("The settings store at {path} is malformed")]
    Json {
        /// Location of the store.
        path: PathBuf,
        /// The parser error.
        #[source]
        source: serde_json::Error,
    },
}

/// User settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Read the device memory whenever a device is opened or recovered.
    pub auto_read: bool,
    /// Reset the device after it has been written.
    pub auto_reset: bool,
}

/// Recently used firmware files, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MruFiles(Vec<PathBuf>);

impl MruFiles {
    /// Moves `path` to the front of the list, adding it if it is new.
    ///
    /// The oldest entries are dropped once the list exceeds [`MRU_CAPACITY`].
    pub fn add(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.0.retain(|p| *p != path);
        self.0.insert(0, path);
        self.0.truncate(MRU_CAPACITY);
    }

    /// Removes `path` from the list.
    pub fn remove(&mut self, path: &Path) {
        self.0.retain(|p| p != path);
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// The most recently used file.
    pub fn most_recent(&self) -> Option<&Path> {
        self.0.first().map(PathBuf::as_path)
    }

    /// Iterates over the entries, most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &Path> + '_ {
        self.0.iter().map(PathBuf::as_path)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The key-value document persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Store {
    /// User settings.
    pub settings: Settings,
    /// Recently used firmware files.
    pub mru_files: MruFiles,
}

impl Store {
    /// Loads the store from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings store at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| SettingsError::Json {
            path: path.to_owned(),
            source,
        })
    }

    /// Writes the store to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_error = |source| SettingsError::Io {
            path: path.to_owned(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let contents = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Json {
            path: path.to_owned(),
            source,
        })?;
        std::fs::write(path, contents).map_err(io_error)?;

        tracing::debug!("Saved settings store to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn mru_moves_entries_to_the_front() {
        let mut mru = MruFiles::default();
        mru.add("a.hex");
        mru.add("b.hex");
        mru.add("a.hex");

        let entries: Vec<_> = mru.iter().collect();
        assert_eq!(entries, vec![Path::new("a.hex"), Path::new("b.hex")]);
        assert_eq!(mru.most_recent(), Some(Path::new("a.hex")));
    }

    #[test]
    fn mru_is_capped() {
        let mut mru = MruFiles::default();
        for i in 0..MRU_CAPACITY + 3 {
            mru.add(format!("{i}.hex"));
        }

        assert_eq!(mru.len(), MRU_CAPACITY);
        assert_eq!(
            mru.most_recent(),
            Some(Path::new(&format!("{}.hex", MRU_CAPACITY + 2)))
        );
        assert!(!mru.iter().any(|p| p == Path::new("0.hex")));
    }

    #[test]
    fn store_uses_camel_case_keys() {
        let mut store = Store::default();
        store.settings.auto_read = true;
        store.mru_files.add("/tmp/app.hex");

        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "settings": { "autoRead": true, "autoReset": false },
                "mruFiles": ["/tmp/app.hex"],
            })
        );
    }

    #[test]
    fn partial_store_falls_back_to_defaults() {
        let store: Store = serde_json::from_str(r#"{ "settings": { "autoReset": true } }"#).unwrap();
        assert!(store.settings.auto_reset);
        assert!(!store.settings.auto_read);
        assert!(store.mru_files.is_empty());
    }

    #[test]
    fn missing_store_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::load(&dir.path().join("missing.json")).unwrap();
        assert_eq!(store, Store::default());
    }

    #[test]
    fn store_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let mut store = Store::default();
        store.settings.auto_reset = true;
        store.mru_files.add("fw.hex");
        store.save(&path).unwrap();

        assert_eq!(Store::load(&path).unwrap(), store);
    }

    #[test]
    fn malformed_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(Store::load(&path), Err(SettingsError::Json { .. })));
    }
}
