use crate::config::Config;
use ignore::{DirEntry, WalkBuilder};
use log::debug;
use nix::unistd::{AccessFlags, access};
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file that passed every traversal filter and may be content-matched.
#[derive(Debug)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub metadata: Metadata,
}

pub struct TreeWalker {
    config: Arc<Config>,
}

impl TreeWalker {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Depth-first walk of `root`, sorted by file name inside each
    /// directory. Fails only when `root` itself cannot be listed.
    pub fn walk(&self, root: &Path) -> crate::Result<Walk> {
        fs::read_dir(root)?;

        let prune = self.config.clone();
        let inner = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
                if entry.depth() == 0 || !is_dir {
                    return true;
                }
                let excluded = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| prune.search.is_excluded_dir(name));
                if excluded {
                    debug!("Pruning excluded directory: {}", entry.path().display());
                }
                !excluded
            })
            .build();

        Ok(Walk {
            inner,
            config: self.config.clone(),
            skipped: 0,
        })
    }
}

/// Lazy sequence of candidate files. Entries that fail a filter are dropped
/// and counted in [`Walk::skipped`].
pub struct Walk {
    inner: ignore::Walk,
    config: Arc<Config>,
    skipped: usize,
}

impl Walk {
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn accept(&mut self, entry: DirEntry) -> Option<CandidateFile> {
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            return None;
        }
        let path = entry.path();
        let search = &self.config.search;

        let name = entry.file_name().to_string_lossy();
        if search.is_excluded_file(&name) {
            debug!("Skipping excluded file: {}", path.display());
            return None;
        }
        if !search.is_allowed_extension(path) {
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Skipping file without metadata {}: {e}", path.display());
                self.skipped += 1;
                return None;
            }
        };
        if metadata.len() > search.max_file_size {
            debug!(
                "Skipping large file ({} bytes): {}",
                metadata.len(),
                path.display()
            );
            self.skipped += 1;
            return None;
        }
        if !is_readable(path) {
            debug!("Skipping unreadable file: {}", path.display());
            self.skipped += 1;
            return None;
        }

        Some(CandidateFile {
            path: path.to_path_buf(),
            metadata,
        })
    }
}

impl Iterator for Walk {
    type Item = CandidateFile;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(entry) => {
                    if let Some(candidate) = self.accept(entry) {
                        return Some(candidate);
                    }
                }
                Err(e) => {
                    debug!("Skipping unreadable entry: {e}");
                    self.skipped += 1;
                }
            }
        }
    }
}

pub fn is_readable(path: &Path) -> bool {
    access(path, AccessFlags::R_OK).is_ok()
}

pub fn is_writable(path: &Path) -> bool {
    access(path, AccessFlags::W_OK).is_ok()
}
