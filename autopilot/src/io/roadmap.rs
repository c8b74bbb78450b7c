//! Roadmap file access.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::core::roadmap::mvp_reached;

/// Roadmap contents, or `None` when the file does not exist.
pub fn read_roadmap(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read roadmap {}", path.display())),
    }
}

pub fn write_roadmap(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write roadmap {}", path.display()))?;
    info!(path = %path.display(), bytes = contents.len(), "roadmap updated");
    Ok(())
}

/// MVP check against the roadmap on disk. A missing or unreadable roadmap is not MVP.
pub fn is_mvp_reached(path: &Path) -> bool {
    match read_roadmap(path) {
        Ok(Some(contents)) => mvp_reached(&contents),
        Ok(None) => false,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "roadmap unreadable, assuming MVP not reached");
            false
        }
    }
}
