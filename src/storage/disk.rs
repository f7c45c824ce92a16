use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use super::record::{WhitelistRecord, WhitelistStatus};
use crate::WhitelistResult;

/// One pretty-printed JSON file per repository under `base_path`.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    base_path: PathBuf,
}

impl DiskStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> WhitelistResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, repository_id: &str) -> PathBuf {
        let mut name = String::with_capacity(repository_id.len() + 5);
        for byte in repository_id.bytes() {
            match byte {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' => name.push(byte as char),
                _ => name.push_str(&format!("_{:02x}", byte)),
            }
        }
        name.push_str(".json");
        self.base_path.join(name)
    }

    pub fn save(&self, record: &WhitelistRecord) -> WhitelistResult<()> {
        let final_path = self.path_for(&record.repository_id);
        let temp_path = final_path.with_extension("json.tmp");

        fs::write(&temp_path, serde_json::to_string_pretty(record)?)?;
        fs::rename(&temp_path, &final_path)?;
        debug!("Persisted whitelist record to {}", final_path.display());
        Ok(())
    }

    pub fn delete(&self, repository_id: &str) -> WhitelistResult<()> {
        match fs::remove_file(self.path_for(repository_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads every persisted record. A run interrupted mid-flight comes back
    /// as `Uninitialized` so it gets scheduled again.
    pub fn load_all(&self) -> WhitelistResult<Vec<WhitelistRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read_to_string(&path)?;
            let mut record: WhitelistRecord = serde_json::from_str(&content)?;
            if record.status == WhitelistStatus::Discovering {
                record.status = WhitelistStatus::Uninitialized;
                record.prefixes.clear();
            }
            records.push(record);
        }
        Ok(records)
    }
}
