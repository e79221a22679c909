use std::io;
use std::path::PathBuf;

use fsp_scraper::clean_title;

/// Writes thread texts as `<root>/<section>/<tid>_<title>.txt`.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Threads sharing a title stay apart through their tid.
    pub fn path_for(&self, section: &str, tid: Option<&str>, title: &str) -> PathBuf {
        let title = clean_title(title);
        let name = match tid {
            Some(tid) => format!("{tid}_{title}.txt"),
            None => format!("{title}.txt"),
        };
        self.root.join(clean_title(section)).join(name)
    }

    /// Replaces any previous text of the same thread.
    pub fn write(
        &self,
        section: &str,
        tid: Option<&str>,
        title: &str,
        text: &str,
    ) -> io::Result<PathBuf> {
        let path = self.path_for(section, tid, title);
        if let Some(dir) = path.parent() {
            fs_err::create_dir_all(dir)?;
        }
        fs_err::write(&path, text)?;
        Ok(path)
    }
}
