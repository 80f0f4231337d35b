//! Test script on disk

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// A single test script, read once at the start of its run
#[derive(Debug, Clone)]
pub struct TestFile {
    /// Absolute or root-joined path
    pub path: PathBuf,
    /// Path relative to the suite root, `/`-separated
    pub name: String,
    /// Raw file contents, passed to the engines untouched
    pub source: Vec<u8>,
}

impl TestFile {
    /// Read `path`, naming it relative to `root`
    pub fn read(path: &Path, root: &Path) -> Result<Self> {
        let source = std::fs::read(path)
            .map_err(|e| Error::io(format!("failed to read {}", path.display()), e))?;
        Ok(Self {
            path: path.to_path_buf(),
            name: display_name(path, root),
            source,
        })
    }

    /// Build a test file from in-memory contents
    pub fn from_source(name: impl Into<String>, source: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        Self {
            path: PathBuf::from(&name),
            name,
            source: source.into(),
        }
    }
}

/// Root-relative, `/`-separated name used in reports
pub fn display_name(path: &Path, root: &Path) -> String {
    let relative = match path.strip_prefix(root) {
        // the root itself is the test file
        Ok(relative) if relative.as_os_str().is_empty() => {
            path.file_name().map_or(path, Path::new)
        }
        Ok(relative) => relative,
        Err(_) => path,
    };
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
