mod error;
pub mod index;
pub mod merge;
pub mod record;
mod staged;
pub mod table;

pub use error::StoreError;
pub use index::{ThreadState, UpdateIndex};
pub use merge::{latest_by_tid, MergeOutcome, MergeStore};
pub use record::{PersistedRecord, HEADERS};
pub use staged::StagedFile;
pub use table::{Table, TableRows, Upsert};
