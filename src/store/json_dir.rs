//! A directory of JSON documents keyed by ID.

use crate::store::StoreError;
use crate::utils::ids::is_valid_record_id;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const EXTENSION: &str = "json";

/// One JSON file per record: `<root>/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonDir {
    root: PathBuf,
}

impl JsonDir {
    /// Open (and create if missing) a record directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding record `id`.
    pub fn record_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_record_id(id) {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(format!("{}.{}", id, EXTENSION)))
    }

    /// Write a record, replacing any existing one with the same ID.
    pub fn write<T: Serialize>(&self, id: &str, value: &T) -> Result<(), StoreError> {
        let target = self.record_path(id)?;
        let tmp = self.write_temp(id, value)?;
        fs::rename(&tmp, &target).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::io(&target, e)
        })
    }

    /// Write a record only if no record with this ID exists yet.
    pub fn create<T: Serialize>(&self, id: &str, value: &T) -> Result<(), StoreError> {
        let target = self.record_path(id)?;
        let tmp = self.write_temp(id, value)?;
        // hard_link refuses to replace an existing target
        let linked = fs::hard_link(&tmp, &target);
        let _ = fs::remove_file(&tmp);
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(id.to_string()))
            }
            Err(e) => Err(StoreError::io(&target, e)),
        }
    }

    /// Read one record. `Ok(None)` when it does not exist.
    pub fn read<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, StoreError> {
        let path = self.record_path(id)?;
        read_file(&path)
    }

    /// IDs of every record in the directory, sorted.
    pub fn ids(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_valid_record_id(stem) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Read every record. Fails on the first unreadable or corrupt one.
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        let mut records = Vec::new();
        for id in self.ids()? {
            // A record removed between listing and reading is simply skipped
            if let Some(record) = self.read(&id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn write_temp<T: Serialize>(&self, id: &str, value: &T) -> Result<PathBuf, StoreError> {
        let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode {
            id: id.to_string(),
            source,
        })?;

        let tmp = self
            .root
            .join(format!(".{}.{}.tmp", id, Uuid::new_v4().simple()));
        let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(&json)
            .and_then(|_| file.sync_all())
            .map_err(|e| {
                let _ = fs::remove_file(&tmp);
                StoreError::io(&tmp, e)
            })?;
        Ok(tmp)
    }
}

fn read_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    fn doc(name: &str, count: u32) -> Doc {
        Doc {
            name: name.to_string(),
            count,
        }
    }

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let dir = JsonDir::open(tmp.path().join("docs")).unwrap();

        dir.write("A-1", &doc("a", 1)).unwrap();
        let loaded: Option<Doc> = dir.read("A-1").unwrap();
        assert_eq!(loaded, Some(doc("a", 1)));
    }

    #[test]
    fn test_read_missing_is_none() {
        let tmp = TempDir::new().unwrap();
        let dir = JsonDir::open(tmp.path()).unwrap();
        let loaded: Option<Doc> = dir.read("NOPE").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_write_overwrites() {
        let tmp = TempDir::new().unwrap();
        let dir = JsonDir::open(tmp.path()).unwrap();

        dir.write("A-1", &doc("a", 1)).unwrap();
        dir.write("A-1", &doc("a", 2)).unwrap();

        let loaded: Doc = dir.read("A-1").unwrap().unwrap();
        assert_eq!(loaded.count, 2);
        assert_eq!(dir.ids().unwrap(), vec!["A-1".to_string()]);
    }

    #[test]
    fn test_create_refuses_existing() {
        let tmp = TempDir::new().unwrap();
        let dir = JsonDir::open(tmp.path()).unwrap();

        dir.create("FB-1", &doc("first", 1)).unwrap();
        let err = dir.create("FB-1", &doc("second", 2)).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        let loaded: Doc = dir.read("FB-1").unwrap().unwrap();
        assert_eq!(loaded.name, "first");
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let tmp = TempDir::new().unwrap();
        let dir = JsonDir::open(tmp.path()).unwrap();

        let err = dir.write("../escape", &doc("x", 0)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidId(_)));
        assert!(dir.read::<Doc>("a/b").is_err());
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let dir = JsonDir::open(tmp.path()).unwrap();
        fs::write(tmp.path().join("BAD.json"), "{not json").unwrap();

        let err = dir.read::<Doc>("BAD").unwrap_err();
        assert!(err.is_corrupt());
        assert!(dir.read_all::<Doc>().is_err());
    }

    #[test]
    fn test_read_all_ignores_temp_and_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let dir = JsonDir::open(tmp.path()).unwrap();

        dir.write("A-1", &doc("a", 1)).unwrap();
        dir.write("A-2", &doc("b", 2)).unwrap();
        fs::write(tmp.path().join(".A-3.abc.tmp"), "partial").unwrap();
        fs::write(tmp.path().join("notes.txt"), "hello").unwrap();

        let all: Vec<Doc> = dir.read_all().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let dir = JsonDir::open(tmp.path()).unwrap();
        dir.write("A-1", &doc("a", 1)).unwrap();
        dir.create("A-2", &doc("b", 2)).unwrap();

        let leftovers = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
