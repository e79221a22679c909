//! Persistent `tid -> update time` map deciding which threads need a fetch.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

use fsp_scraper::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::staged::StagedFile;

const VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    New,
    Updated,
    Unchanged,
}

impl ThreadState {
    pub fn needs_fetch(self) -> bool {
        !matches!(self, ThreadState::Unchanged)
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    threads: BTreeMap<String, Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateIndex {
    threads: BTreeMap<String, Timestamp>,
}

impl UpdateIndex {
    /// Reads a snapshot written by [`UpdateIndex::save`], `None` when absent.
    pub fn load(path: &Path) -> Result<Option<Self>, StoreError> {
        let bytes = match fs_err::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != VERSION {
            return Err(StoreError::UnsupportedIndexVersion(snapshot.version));
        }
        Ok(Some(Self {
            threads: snapshot.threads,
        }))
    }

    pub(crate) fn stage(&self, path: &Path) -> Result<StagedFile, StoreError> {
        let mut staged = StagedFile::create(path)?;
        let snapshot = Snapshot {
            version: VERSION,
            threads: self.threads.clone(),
        };
        let file = staged.file();
        serde_json::to_writer_pretty(&mut *file, &snapshot)?;
        file.write_all(b"\n")?;
        Ok(staged)
    }

    /// Replaces the snapshot at `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        self.stage(path)?.commit()
    }

    pub fn get(&self, tid: &str) -> Option<Timestamp> {
        self.threads.get(tid).copied()
    }

    /// Records `updated` for `tid`, returning whether the entry changed.
    pub fn set(&mut self, tid: &str, updated: Timestamp) -> bool {
        match self.threads.get_mut(tid) {
            Some(current) if *current == updated => false,
            Some(current) => {
                *current = updated;
                true
            }
            None => {
                self.threads.insert(tid.to_string(), updated);
                true
            }
        }
    }

    /// A thread needs a fetch unless its indexed time is at least `updated`.
    pub fn state(&self, tid: &str, updated: Timestamp) -> ThreadState {
        match self.get(tid) {
            None => ThreadState::New,
            Some(known) if known >= updated => ThreadState::Unchanged,
            Some(_) => ThreadState::Updated,
        }
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Timestamp)> {
        self.threads.iter().map(|(tid, t)| (tid.as_str(), *t))
    }
}

impl FromIterator<(String, Timestamp)> for UpdateIndex {
    fn from_iter<I: IntoIterator<Item = (String, Timestamp)>>(iter: I) -> Self {
        Self {
            threads: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(text: &str) -> Timestamp {
        Timestamp::parse(text).unwrap()
    }

    #[test]
    fn state_follows_indexed_time() {
        let mut index = UpdateIndex::default();
        assert_eq!(index.state("7", ts("2024-1-5 9:05")), ThreadState::New);

        assert!(index.set("7", ts("2024-1-5 9:05")));
        assert!(!index.set("7", ts("2024-1-5 9:05")));
        assert_eq!(index.state("7", ts("2024-1-5 9:05")), ThreadState::Unchanged);
        assert_eq!(index.state("7", ts("2024-1-4 23:00")), ThreadState::Unchanged);
        assert_eq!(index.state("7", ts("2024-1-5 9:06")), ThreadState::Updated);
        assert!(ThreadState::Updated.needs_fetch());
        assert!(!ThreadState::Unchanged.needs_fetch());
    }

    #[test]
    fn snapshot_is_versioned_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        assert_eq!(UpdateIndex::load(&path).unwrap(), None);

        let index: UpdateIndex = vec![
            ("12".to_string(), ts("2024-1-5 9:05")),
            ("3".to_string(), ts("2024-2-1 10:00:30")),
        ]
        .into_iter()
        .collect();
        index.save(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["threads"]["12"], "2024-01-05 09:05");
        assert_eq!(json["threads"]["3"], "2024-02-01 10:00:30");

        assert_eq!(UpdateIndex::load(&path).unwrap(), Some(index));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, r#"{"version":9,"threads":{}}"#).unwrap();
        assert!(matches!(
            UpdateIndex::load(&path),
            Err(StoreError::UnsupportedIndexVersion(9))
        ));
    }
}
