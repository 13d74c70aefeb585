//! Root confinement and extension checks for user supplied paths.

use crate::config::Config;
use crate::error::PathError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PathValidator {
    config: Arc<Config>,
}

impl PathValidator {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.search.root_dir
    }

    /// Resolves `raw_path` to a canonical path that is a strict descendant of
    /// the root and carries an allowed extension.
    ///
    /// Relative paths are taken relative to the root. Symlinks are resolved
    /// before the confinement check, so a link pointing outside the root is
    /// rejected like any other escape.
    pub fn validate(&self, raw_path: &str) -> Result<PathBuf, PathError> {
        let cleaned: String = raw_path
            .chars()
            .filter(|&c| c != '\0')
            .map(|c| if c == '\\' { '/' } else { c })
            .collect();
        if cleaned.trim().is_empty() {
            return Err(PathError::InvalidPath);
        }

        let candidate = Path::new(&cleaned);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root().join(candidate)
        };

        let canonical = fs::canonicalize(&joined).map_err(|_| PathError::InvalidPath)?;

        // Component-wise prefix: "/srv/data-old" never matches root "/srv/data".
        if canonical == self.root() || !canonical.starts_with(self.root()) {
            return Err(PathError::AccessDenied);
        }

        if !self.config.search.is_allowed_extension(&canonical) {
            return Err(PathError::TypeNotAllowed);
        }

        Ok(canonical)
    }
}
