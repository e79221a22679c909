use std::fs::File;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::StoreError;

/// A full replacement of `target`, written to a sibling temporary file.
///
/// Nothing is visible at `target` until [`StagedFile::commit`], which renames
/// the temporary file over it. Dropping a staged file deletes it.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    pub(crate) fn create(target: &Path) -> Result<Self, StoreError> {
        let dir = match target.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs_err::create_dir_all(dir)?;
        let temp = NamedTempFile::new_in(dir)?;
        Ok(Self {
            temp,
            target: target.to_path_buf(),
        })
    }

    pub(crate) fn file(&mut self) -> &mut File {
        self.temp.as_file_mut()
    }

    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn commit(self) -> Result<(), StoreError> {
        let Self { temp, target } = self;
        temp.as_file().sync_all()?;
        temp.persist(&target)
            .map_err(|source| StoreError::Persist {
                path: target.clone(),
                source,
            })?;
        Ok(())
    }
}
