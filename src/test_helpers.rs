//! Test utilities for creating temporary log files.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct TempLogFile {
    path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TempLogFile {
    /// Create a new, empty temporary log file.
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("test.log");
        File::create(&path)?;

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary log file with initial content.
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append(content)?;
        Ok(temp_file)
    }

    /// Append raw bytes; callers supply their own newlines.
    pub fn append(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Truncate the file in place, keeping the same inode.
    pub fn truncate(&self) -> std::io::Result<()> {
        File::create(&self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_is_raw() {
        let log = TempLogFile::new().unwrap();
        log.append("line 1\n").unwrap();
        log.append("partial").unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content, "line 1\npartial");
    }

    #[test]
    fn test_truncate_empties_the_file() {
        let log = TempLogFile::with_content("initial content\n").unwrap();
        log.truncate().unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.is_empty());
    }
}
