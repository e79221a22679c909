//! The thread table: a CSV file (UTF-8 with BOM) holding one row per tid.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use csv::StringRecord;
use fsp_scraper::{tid_from_url, Timestamp};

use crate::error::StoreError;
use crate::index::UpdateIndex;
use crate::record::{PersistedRecord, HEADERS, UPDATE_TIME_INDEX, URL_INDEX};
use crate::staged::StagedFile;

const BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone)]
pub struct Table {
    path: PathBuf,
}

impl Table {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads every row and indexes them by the tid found in their URL.
    ///
    /// A missing file reads as an empty table. Rows sharing a tid (tables
    /// written by appending) are collapsed: the last one wins, at the position
    /// of the first, and the table is marked as changed.
    pub fn load(&self) -> Result<TableRows, StoreError> {
        let mut rows = TableRows {
            path: self.path.clone(),
            rows: vec![],
            positions: HashMap::new(),
            dirty: false,
        };

        let bytes = match fs_err::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(rows),
            Err(e) => return Err(e.into()),
        };
        let data = bytes.strip_prefix(BOM).unwrap_or(&bytes);
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(rows);
        }

        let mut rdr = csv::ReaderBuilder::new().from_reader(data);
        let headers = rdr.headers()?;
        if headers.iter().ne(HEADERS) {
            return Err(StoreError::HeaderMismatch {
                path: self.path.clone(),
                found: headers.iter().map(String::from).collect(),
            });
        }

        for record in rdr.records() {
            let record = record?;
            match record.get(URL_INDEX).and_then(tid_from_url) {
                Some(tid) => match rows.positions.get(&tid) {
                    Some(&pos) => {
                        log::warn!("Collapsing duplicate row for tid {tid} in {}", self.path.display());
                        rows.rows[pos] = record;
                        rows.dirty = true;
                    }
                    None => {
                        rows.positions.insert(tid, rows.rows.len());
                        rows.rows.push(record);
                    }
                },
                None => rows.rows.push(record),
            }
        }

        Ok(rows)
    }

    /// Deserialized rows, in table order.
    pub fn records(&self) -> Result<Vec<PersistedRecord>, StoreError> {
        let rows = self.load()?;
        let headers = StringRecord::from(HEADERS.to_vec());
        rows.rows
            .iter()
            .map(|row| row.deserialize(Some(&headers)).map_err(StoreError::from))
            .collect()
    }
}

/// Outcome of writing one record into [`TableRows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
    Unchanged,
}

/// In-memory copy of the table, edited then staged as a whole.
#[derive(Debug, Clone)]
pub struct TableRows {
    path: PathBuf,
    rows: Vec<StringRecord>,
    positions: HashMap<String, usize>,
    dirty: bool,
}

impl TableRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn position(&self, tid: &str) -> Option<usize> {
        self.positions.get(tid).copied()
    }

    pub fn is_changed(&self) -> bool {
        self.dirty
    }

    /// Replaces the row of `tid` in place, or appends it.
    pub fn upsert(&mut self, tid: &str, record: &PersistedRecord) -> Upsert {
        let row = record.to_string_record();
        match self.positions.get(tid) {
            Some(&pos) if self.rows[pos].iter().eq(row.iter()) => Upsert::Unchanged,
            Some(&pos) => {
                self.rows[pos] = row;
                self.dirty = true;
                Upsert::Replaced
            }
            None => {
                self.positions.insert(tid.to_string(), self.rows.len());
                self.rows.push(row);
                self.dirty = true;
                Upsert::Inserted
            }
        }
    }

    /// The `tid -> update time` mapping as stored in the table.
    pub fn update_index(&self) -> UpdateIndex {
        self.positions
            .iter()
            .map(|(tid, &pos)| {
                let updated = self.rows[pos].get(UPDATE_TIME_INDEX).unwrap_or_default();
                (tid.clone(), Timestamp::parse_or_epoch(updated))
            })
            .collect()
    }

    /// Writes the rows to a temporary file next to the table, or returns
    /// `None` when nothing changed since [`Table::load`].
    pub fn stage(&self) -> Result<Option<StagedFile>, StoreError> {
        if !self.dirty {
            return Ok(None);
        }

        let mut staged = StagedFile::create(&self.path)?;
        let file = staged.file();
        file.write_all(BOM)?;
        let mut wtr = csv::Writer::from_writer(file);
        wtr.write_record(HEADERS)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        drop(wtr);

        Ok(Some(staged))
    }
}
