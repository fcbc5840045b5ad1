use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use relistruct_core::storage::{Backend, BackendError};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Durable backend keeping one file per key under a root directory.
/// File names are the URL-safe base64 of the key, so any key is a valid name.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(?root, "initializing file backend");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(encode_key(key))
    }
}

impl Backend for FileBackend {
    #[instrument(skip(self))]
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut file = match File::open(self.path_for(key)) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_err(err)),
        };

        let mut buf = String::new();
        file.read_to_string(&mut buf).map_err(storage_err)?;
        Ok(Some(buf))
    }

    #[instrument(skip(self, value))]
    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        fs::create_dir_all(&self.root).map_err(storage_err)?;

        let mut tmp = NamedTempFile::new_in(&self.root).map_err(storage_err)?;
        tmp.write_all(value.as_bytes()).map_err(storage_err)?;
        tmp.flush().map_err(storage_err)?;
        tmp.persist(self.path_for(key))
            .map_err(|e| storage_err(e.error))?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove(&self, key: &str) -> Result<(), BackendError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }

    #[instrument(skip(self))]
    fn keys(&self) -> Result<Vec<String>, BackendError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(storage_err(err)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(storage_err)?;
            if !entry.file_type().map_err(storage_err)?.is_file() {
                continue;
            }
            // Temp files and foreign names do not decode; skip them.
            if let Some(key) = entry.file_name().to_str().and_then(decode_key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

fn encode_key(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(name).ok()?;
    String::from_utf8(bytes).ok()
}

fn storage_err<E: ToString>(err: E) -> BackendError {
    BackendError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use relistruct_core::{TypeTag, TypedStore};
    use serde_json::json;

    use super::*;

    #[test]
    fn round_trip_and_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path());

        backend.set("app:k", "one").expect("set");
        backend.set("app:k", "two").expect("overwrite");
        assert_eq!(backend.get("app:k").expect("get"), Some("two".to_string()));
        assert_eq!(backend.get("app:missing").expect("get"), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path());
        backend.set("k", "v").expect("set");
        backend.remove("k").expect("remove");
        backend.remove("k").expect("remove again");

        assert_eq!(backend.get("k").expect("get"), None);
    }

    #[test]
    fn keys_decode_names_and_skip_foreign_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path());
        backend.set("app:a/b", "1").expect("set");
        backend.set("other:c", "2").expect("set");
        fs::write(dir.path().join("not base64!"), "x").expect("write stray file");

        let mut keys = backend.keys().expect("keys");
        keys.sort();
        assert_eq!(keys, vec!["app:a/b".to_string(), "other:c".to_string()]);
    }

    #[test]
    fn missing_root_has_no_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::new(dir.path().join("never-created"));
        assert!(backend.keys().expect("keys").is_empty());
    }

    #[test]
    fn records_persist_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        TypedStore::new("app", FileBackend::new(dir.path()))
            .write("count", &json!(7), TypeTag::Int, false)
            .expect("write");

        let reopened = TypedStore::new("app", FileBackend::new(dir.path()));
        assert_eq!(reopened.read("count", false).expect("read"), Some(json!(7)));
        assert_eq!(reopened.clear().expect("clear"), 1);
        assert!(FileBackend::new(dir.path()).keys().expect("keys").is_empty());
    }
}
