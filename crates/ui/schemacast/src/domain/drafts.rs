//! Saved drafts on disk: `<base>/drafts/<topic>/<name>.json`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use paths::PathContext;
use serde::{Deserialize, Serialize};
use tracing::debug;

const TIMESTAMP_NAME: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a saved draft: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// File contents of a saved draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDraft {
    pub topic: String,
    pub schema_id: u32,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub timestamp: String,
    pub name: String,
}

/// One row of a draft listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftEntry {
    pub name: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

#[derive(Debug, Clone)]
pub struct DraftStore {
    paths: PathContext,
}

impl DraftStore {
    pub fn new(paths: PathContext) -> Self {
        Self { paths }
    }

    /// Persist a draft and return the file it was written to.
    ///
    /// A blank name falls back to the current timestamp. Existing files are
    /// never overwritten; a `_N` suffix is appended instead.
    pub fn save(
        &self,
        topic: &str,
        schema_id: u32,
        payload: &str,
        key: Option<&str>,
        name: Option<&str>,
    ) -> Result<PathBuf, DraftError> {
        let now = chrono::Local::now();
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| n.trim_end_matches(".json").to_string())
            .unwrap_or_else(|| now.format(TIMESTAMP_NAME).to_string());
        let stem = sanitize(&name);

        let dir = self.paths.topic_drafts_dir(topic);
        fs::create_dir_all(&dir).map_err(|source| DraftError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = free_path(&dir, &stem);

        let draft = SavedDraft {
            topic: topic.to_string(),
            schema_id,
            payload: payload.to_string(),
            key: key.filter(|k| !k.is_empty()).map(str::to_string),
            timestamp: now.to_rfc3339(),
            name,
        };
        let body = serde_json::to_string_pretty(&draft).map_err(|source| DraftError::Format {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, body).map_err(|source| DraftError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "draft saved");
        Ok(path)
    }

    /// Drafts saved for `topic`, newest first. A topic without drafts yields an empty list.
    pub fn list(&self, topic: &str) -> Result<Vec<DraftEntry>, DraftError> {
        let dir = self.paths.topic_drafts_dir(topic);
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(DraftError::Io { path: dir, source }),
        };

        let mut entries = Vec::new();
        for item in read {
            let item = item.map_err(|source| DraftError::Io {
                path: dir.clone(),
                source,
            })?;
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") || !path.is_file() {
                continue;
            }
            let modified = item
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            entries.push(DraftEntry {
                name,
                path,
                modified,
            });
        }
        entries.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    pub fn load(&self, path: &Path) -> Result<SavedDraft, DraftError> {
        let raw = fs::read_to_string(path).map_err(|source| DraftError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| DraftError::Format {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn free_path(dir: &Path, stem: &str) -> PathBuf {
    let first = dir.join(format!("{stem}.json"));
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}.json")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> (tempfile::TempDir, DraftStore) {
        let tmp = tempfile::tempdir().unwrap();
        let paths = PathContext::with_base_path(tmp.path(), "schemacast");
        (tmp, DraftStore::new(paths))
    }

    #[test]
    fn save_then_load() {
        let (_tmp, store) = store();
        let path = store
            .save("orders", 42, "{\"id\": 1}", Some("k-1"), Some("first"))
            .unwrap();
        assert!(path.ends_with("drafts/orders/first.json"));

        let draft = store.load(&path).unwrap();
        assert_eq!(draft.topic, "orders");
        assert_eq!(draft.schema_id, 42);
        assert_eq!(draft.payload, "{\"id\": 1}");
        assert_eq!(draft.key.as_deref(), Some("k-1"));
        assert_eq!(draft.name, "first");
    }

    #[test]
    fn name_collisions_get_counter() {
        let (_tmp, store) = store();
        let a = store.save("t", 1, "{}", None, Some("same")).unwrap();
        let b = store.save("t", 1, "{}", None, Some("same.json")).unwrap();
        let c = store.save("t", 1, "{}", None, Some("same")).unwrap();
        assert!(a.ends_with("same.json"));
        assert!(b.ends_with("same_1.json"));
        assert!(c.ends_with("same_2.json"));
    }

    #[test]
    fn blank_name_uses_timestamp() {
        let (_tmp, store) = store();
        let path = store.save("t", 1, "{}", None, Some("   ")).unwrap();
        let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
        assert_eq!(stem.len(), "2024-01-01_00-00-00".len());
    }

    #[test]
    fn listing_missing_topic_is_empty() {
        let (_tmp, store) = store();
        assert!(store.list("nothing-here").unwrap().is_empty());
    }

    #[test]
    fn listing_ignores_other_files() {
        let (tmp, store) = store();
        store.save("t", 1, "{}", None, Some("a")).unwrap();
        std::fs::write(tmp.path().join("drafts/t/notes.txt"), "x").unwrap();

        let names: Vec<_> = store.list("t").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a".to_string()]);
    }

    #[test]
    fn load_rejects_foreign_json() {
        let (tmp, store) = store();
        let path = tmp.path().join("bogus.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(store.load(&path), Err(DraftError::Format { .. })));
    }
}
