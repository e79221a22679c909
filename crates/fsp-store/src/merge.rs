use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use fsp_scraper::{ThreadContent, ThreadSummary, Timestamp};

use crate::error::StoreError;
use crate::index::{ThreadState, UpdateIndex};
use crate::record::PersistedRecord;
use crate::table::{Table, Upsert};

/// Counts of what a single [`MergeStore::merge`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

impl MergeOutcome {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

impl fmt::Display for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} new, {} updated, {} unchanged, {} skipped",
            self.inserted, self.updated, self.unchanged, self.skipped
        )
    }
}

/// Keeps one item per tid: the one with the greatest update time, the later
/// one on ties. Items keep the position where their tid was first seen.
pub fn latest_by_tid<T, F>(items: impl IntoIterator<Item = T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (String, Timestamp),
{
    let mut positions: HashMap<String, (usize, Timestamp)> = HashMap::new();
    let mut latest: Vec<T> = vec![];
    for item in items {
        let (tid, updated) = key(&item);
        match positions.get_mut(&tid) {
            Some((pos, best)) if updated >= *best => {
                *best = updated;
                latest[*pos] = item;
            }
            Some(_) => {}
            None => {
                positions.insert(tid, (latest.len(), updated));
                latest.push(item);
            }
        }
    }
    latest
}

/// Owner of the thread table and its update index.
///
/// Every write to either file happens while holding the store lock, so a
/// `MergeStore` can be shared between concurrent section crawls.
#[derive(Debug)]
pub struct MergeStore {
    table: Table,
    index_path: PathBuf,
    index: Mutex<UpdateIndex>,
}

impl MergeStore {
    /// Opens the table and its index, rebuilding the index from the table
    /// when the index file does not exist yet and bringing it up to date
    /// with the table otherwise.
    pub fn open(table: impl Into<PathBuf>, index: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let table = Table::new(table);
        let index_path = index.into();

        let index = match UpdateIndex::load(&index_path)? {
            Some(mut index) if table.exists() => {
                // The table is committed before the index, it wins on mismatch.
                let mut stale = 0;
                for (tid, updated) in table.load()?.update_index().iter() {
                    if index.set(tid, updated) {
                        stale += 1;
                    }
                }
                if stale > 0 {
                    log::warn!(
                        "Update index {} was behind the table on {stale} threads",
                        index_path.display()
                    );
                    index.save(&index_path)?;
                }
                index
            }
            Some(index) => {
                if !index.is_empty() {
                    log::warn!(
                        "Table {} is missing, ignoring {} indexed threads",
                        table.path().display(),
                        index.len()
                    );
                }
                UpdateIndex::default()
            }
            None if table.exists() => {
                let index = table.load()?.update_index();
                log::info!(
                    "Rebuilt update index from {} ({} threads)",
                    table.path().display(),
                    index.len()
                );
                index.save(&index_path)?;
                index
            }
            None => UpdateIndex::default(),
        };

        Ok(Self {
            table,
            index_path,
            index: Mutex::new(index),
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Snapshot of the current index.
    pub fn update_index(&self) -> UpdateIndex {
        self.lock().clone()
    }

    pub fn classify(&self, tid: &str, updated: Timestamp) -> ThreadState {
        self.lock().state(tid, updated)
    }

    /// Writes a batch of fetched threads of `section` to the table.
    ///
    /// The batch is deduplicated by tid, threads the index already knows at
    /// this update time are skipped, then the table and the index are each
    /// replaced atomically if anything changed.
    pub fn merge(
        &self,
        section: &str,
        batch: Vec<(ThreadSummary, ThreadContent)>,
    ) -> Result<MergeOutcome, StoreError> {
        let batch = latest_by_tid(batch, |(summary, _)| {
            (summary.tid.clone(), summary.update_time)
        });

        let mut index = self.lock();
        let mut outcome = MergeOutcome::default();
        let fresh = batch
            .into_iter()
            .filter(|(summary, _)| {
                let keep = index.state(&summary.tid, summary.update_time).needs_fetch();
                if !keep {
                    outcome.skipped += 1;
                }
                keep
            })
            .collect::<Vec<_>>();
        if fresh.is_empty() {
            log::info!("Merged {section}: {outcome}");
            return Ok(outcome);
        }

        let mut rows = self.table.load()?;
        let mut next = index.clone();
        for (summary, content) in &fresh {
            let record = PersistedRecord::new(section, summary, content);
            match rows.upsert(&summary.tid, &record) {
                Upsert::Inserted => outcome.inserted += 1,
                Upsert::Replaced => outcome.updated += 1,
                Upsert::Unchanged => outcome.unchanged += 1,
            }
            next.set(&summary.tid, summary.update_time);
        }

        if let Some(staged) = rows.stage()? {
            staged.commit()?;
        }
        if next != *index {
            next.save(&self.index_path)?;
            *index = next;
        }

        log::info!("Merged {section}: {outcome}");
        Ok(outcome)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UpdateIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
