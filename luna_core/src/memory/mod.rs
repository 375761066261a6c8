pub mod record;

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::fortune::Fortune;

pub use record::{HistoryEntry, RelationshipRecord, RelationshipStatus};

pub type RelationshipMap = BTreeMap<String, RelationshipRecord>;

/// Owns every relationship record and the JSON file that mirrors them.
///
/// Each mutating call rewrites the whole file before returning, so the file
/// always reflects the latest acknowledged event.
pub struct MemoryStore {
    path: PathBuf,
    records: RelationshipMap,
}

impl MemoryStore {
    /// Read the backing file. A missing file yields an empty map; a file that
    /// exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<RelationshipMap> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No memory file at {:?}, starting fresh", path);
                return Ok(RelationshipMap::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read memory file {:?}", path))
            }
        };

        serde_json::from_str(&contents).with_context(|| {
            format!(
                "Memory file {:?} is malformed; refusing to start from partial relationship state",
                path
            )
        })
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = Self::load(&path)?;
        tracing::info!(
            "Loaded {} relationship record(s) from {:?}",
            records.len(),
            path
        );
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a default record for `id` if none exists.
    pub fn ensure(&mut self, id: &str) {
        if !self.records.contains_key(id) {
            tracing::debug!("First contact with {}, creating relationship record", id);
            self.records
                .insert(id.to_string(), RelationshipRecord::default());
        }
    }

    pub fn append_history(&mut self, id: &str, content: &str) -> Result<()> {
        self.update(id, |record| record.remember(content))
    }

    pub fn adjust_affection(&mut self, id: &str, delta: i64) -> Result<u32> {
        self.update(id, |record| record.adjust_affection(delta))
    }

    pub fn set_status(&mut self, id: &str, status: RelationshipStatus) -> Result<()> {
        self.update(id, |record| record.status = status)
    }

    pub fn status(&self, id: &str) -> Option<RelationshipStatus> {
        self.records.get(id).map(|record| record.status)
    }

    pub fn affection(&self, id: &str) -> Option<u32> {
        self.records.get(id).map(|record| record.affection)
    }

    pub fn record(&self, id: &str) -> Option<&RelationshipRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> &RelationshipMap {
        &self.records
    }

    /// Content of a uniformly chosen history entry for `id`.
    pub fn recall_random(&self, id: &str, fortune: &mut dyn Fortune) -> Option<String> {
        let history = &self.records.get(id)?.history;
        if history.is_empty() {
            return None;
        }
        let index = fortune.index(history.len());
        history.get(index).map(|entry| entry.content.clone())
    }

    /// Apply `f` to the record for `id` (created if absent) and persist. If the
    /// write fails the in-memory state is rolled back to match the file.
    pub fn update<T>(&mut self, id: &str, f: impl FnOnce(&mut RelationshipRecord) -> T) -> Result<T> {
        let mut next = self.records.get(id).cloned().unwrap_or_default();
        let result = f(&mut next);
        let previous = self.records.insert(id.to_string(), next);

        if let Err(e) = self.save() {
            match previous {
                Some(record) => self.records.insert(id.to_string(), record),
                None => self.records.remove(id),
            };
            return Err(e);
        }
        Ok(result)
    }

    /// Rewrite the backing file. The new contents go to a sibling temp file
    /// that is renamed over the old one, so readers never see a partial write.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }

        let json = serde_json::to_string_pretty(&self.records)
            .context("Failed to serialize relationship records")?;

        let temp_path = temp_path_for(&self.path);
        let mut temp = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create {:?}", temp_path))?;
        temp.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write {:?}", temp_path))?;
        temp.sync_all()
            .with_context(|| format!("Failed to flush {:?}", temp_path))?;
        drop(temp);

        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace memory file {:?}", self.path))?;
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "luna_memory.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
