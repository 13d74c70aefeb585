use aho_corasick::AhoCorasick;
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// ASCII case-insensitive substring test, one line at a time.
///
/// A single line buffer is reused across the whole file, so memory is
/// bounded by the longest line rather than by the file size.
pub struct ContentMatcher {
    needle: AhoCorasick,
}

impl ContentMatcher {
    pub fn new(needle: &str) -> crate::Result<Self> {
        let needle = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build([needle])?;
        Ok(Self { needle })
    }

    /// `false` when the needle is absent or the file cannot be read.
    pub fn matches(&self, path: &Path) -> bool {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                debug!("Cannot open {} for matching: {e}", path.display());
                return false;
            }
        };
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => return false,
                Ok(_) => {
                    if self.needle.is_match(&line) {
                        return true;
                    }
                }
                Err(e) => {
                    debug!("Read error while matching {}: {e}", path.display());
                    return false;
                }
            }
        }
    }
}
