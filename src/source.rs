// 📥 Document sources
// Retrieval itself lives outside this crate; a source only has to hand over
// text or a fetch failure.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrackerError};

pub trait DocumentSource {
    fn fetch(&self) -> Result<String>;

    /// Where the text came from, for logs.
    fn describe(&self) -> String;
}

/// File on disk, or stdin when the path is `-`.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into() }
    }

    fn is_stdin(&self) -> bool {
        self.path == Path::new("-")
    }
}

impl DocumentSource for FileSource {
    fn fetch(&self) -> Result<String> {
        let text = if self.is_stdin() {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| TrackerError::Fetch(format!("stdin: {e}")))?;
            buf
        } else {
            std::fs::read_to_string(&self.path)
                .map_err(|e| TrackerError::Fetch(format!("{}: {e}", self.path.display())))?
        };

        non_empty(text, &self.describe())
    }

    fn describe(&self) -> String {
        if self.is_stdin() {
            "stdin".to_string()
        } else {
            self.path.display().to_string()
        }
    }
}

/// Text already in memory.
pub struct TextSource {
    text: String,
}

impl TextSource {
    pub fn new(text: impl Into<String>) -> Self {
        TextSource { text: text.into() }
    }
}

impl DocumentSource for TextSource {
    fn fetch(&self) -> Result<String> {
        non_empty(self.text.clone(), "text")
    }

    fn describe(&self) -> String {
        "text".to_string()
    }
}

fn non_empty(text: String, origin: &str) -> Result<String> {
    if text.trim().is_empty() {
        return Err(TrackerError::Fetch(format!("empty document from {origin}")));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_source_reads_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listing.md");
        std::fs::write(&path, "| Model |\n").unwrap();

        let source = FileSource::new(&path);
        assert_eq!(source.fetch().unwrap(), "| Model |\n");
        assert_eq!(source.describe(), path.display().to_string());
    }

    #[test]
    fn test_missing_file_is_fetch_error() {
        let source = FileSource::new("/definitely/not/here.md");
        assert!(matches!(source.fetch(), Err(TrackerError::Fetch(_))));
    }

    #[test]
    fn test_blank_text_is_fetch_error() {
        assert!(matches!(TextSource::new("  \n").fetch(), Err(TrackerError::Fetch(_))));
        assert_eq!(FileSource::new("-").describe(), "stdin");
    }
}
