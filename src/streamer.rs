//! Newline-delimited JSON streaming of search results.
//!
//! The streamer pulls candidates from [`TreeWalker`], tests each with a
//! [`ContentMatcher`], and writes every match to a [`RecordSink`] as soon as it
//! is found. Cancellation is cooperative: the token and the sink's disconnect
//! flag are checked once per candidate file.

use crate::config::Config;
use crate::file_info::FileMatch;
use crate::matcher::ContentMatcher;
use crate::metrics::Metrics;
use crate::walker::TreeWalker;
use log::{debug, info, warn};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tokio_util::sync::CancellationToken;

pub const MIN_QUERY_LEN: usize = 2;
pub const COMPLETED_MESSAGE: &str = "Search completed";

/// One line of the response stream.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamRecord {
    File { data: FileMatch },
    Status { message: String },
    Error { message: String },
}

/// Destination of stream records. Implementations deliver each record as
/// one line and must not hold it back once `flush` returns.
pub trait RecordSink {
    fn write_record(&mut self, record: &StreamRecord) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// True once the consumer has gone away.
    fn is_disconnected(&self) -> bool {
        false
    }
}

/// Sink over any byte writer: stdout, a socket, or a `Vec<u8>` in tests.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    disconnected: bool,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            disconnected: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn track(&mut self, result: io::Result<()>) -> io::Result<()> {
        if let Err(e) = &result
            && e.kind() == io::ErrorKind::BrokenPipe
        {
            self.disconnected = true;
        }
        result
    }
}

impl<W: Write> RecordSink for NdjsonWriter<W> {
    fn write_record(&mut self, record: &StreamRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let result = self.writer.write_all(&line);
        self.track(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.writer.flush();
        self.track(result)
    }

    fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

/// A validated search query. Immutable once accepted.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    query_text: String,
    root_scope: PathBuf,
}

impl SearchRequest {
    pub fn new(query: &str, root_scope: &Path) -> crate::Result<Self> {
        let query_text = query.trim();
        if query_text.chars().count() < MIN_QUERY_LEN {
            return Err(crate::error::SfsearchError::QueryTooShort);
        }
        Ok(Self {
            query_text: query_text.to_string(),
            root_scope: root_scope.to_path_buf(),
        })
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    /// Directory the search walks.
    pub fn root_scope(&self) -> &Path {
        &self.root_scope
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    Completed,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub status: SearchStatus,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub matches: usize,
}

impl SearchOutcome {
    fn new(status: SearchStatus) -> Self {
        Self {
            status,
            files_scanned: 0,
            files_skipped: 0,
            matches: 0,
        }
    }
}

pub struct ResultStreamer {
    config: Arc<Config>,
    walker: TreeWalker,
    metrics: Metrics,
}

impl ResultStreamer {
    pub fn new(config: Arc<Config>, metrics: Metrics) -> Self {
        Self {
            walker: TreeWalker::new(config.clone()),
            config,
            metrics,
        }
    }

    /// Runs one search to completion, cancellation, or failure. Never
    /// returns an error: failures become a single `error` record.
    pub fn stream<S: RecordSink>(
        &self,
        query: &str,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> SearchOutcome {
        self.metrics.searches_started.inc();
        let outcome = match self.run(query, sink, cancel) {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = e.to_string();
                warn!("Search for {query:?} failed: {message}");
                let record = StreamRecord::Error {
                    message: message.clone(),
                };
                if let Err(e) = emit(sink, &record) {
                    debug!("Could not deliver error record: {e}");
                }
                SearchOutcome::new(SearchStatus::Failed(message))
            }
        };

        self.metrics.files_scanned.inc_by(outcome.files_scanned as u64);
        self.metrics.files_skipped.inc_by(outcome.files_skipped as u64);
        match outcome.status {
            SearchStatus::Completed => self.metrics.searches_completed.inc(),
            SearchStatus::Cancelled => self.metrics.searches_cancelled.inc(),
            SearchStatus::Failed(_) => {}
        }
        info!(
            "Search {:?} finished: {:?}, {} scanned, {} skipped, {} matched",
            query.trim(),
            outcome.status,
            outcome.files_scanned,
            outcome.files_skipped,
            outcome.matches
        );
        outcome
    }

    fn run<S: RecordSink>(
        &self,
        query: &str,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> crate::Result<SearchOutcome> {
        let request = SearchRequest::new(query, &self.config.search.root_dir)?;
        let matcher = ContentMatcher::new(request.query_text())?;
        let mut walk = self.walker.walk(request.root_scope())?;

        let batch_size = self.config.search.batch_size;
        let pacing_delay = self.config.search.pacing_delay();
        let mut outcome = SearchOutcome::new(SearchStatus::Completed);
        let mut since_pause = 0;

        while let Some(candidate) = walk.next() {
            if cancel.is_cancelled() || sink.is_disconnected() {
                debug!("Search cancelled after {} matches", outcome.matches);
                outcome.status = SearchStatus::Cancelled;
                outcome.files_skipped = walk.skipped();
                return Ok(outcome);
            }

            outcome.files_scanned += 1;
            if !matcher.matches(&candidate.path) {
                continue;
            }

            let record = StreamRecord::File {
                data: FileMatch::from_metadata(&candidate.path, &candidate.metadata),
            };
            if let Err(e) = emit(sink, &record) {
                if sink.is_disconnected() {
                    outcome.status = SearchStatus::Cancelled;
                    outcome.files_skipped = walk.skipped();
                    return Ok(outcome);
                }
                return Err(e.into());
            }
            outcome.matches += 1;
            self.metrics.matches_found.inc();

            since_pause += 1;
            if since_pause >= batch_size {
                since_pause = 0;
                thread::sleep(pacing_delay);
            }
        }

        outcome.files_skipped = walk.skipped();
        if cancel.is_cancelled() || sink.is_disconnected() {
            outcome.status = SearchStatus::Cancelled;
            return Ok(outcome);
        }
        emit(
            sink,
            &StreamRecord::Status {
                message: COMPLETED_MESSAGE.to_string(),
            },
        )?;
        Ok(outcome)
    }
}

fn emit<S: RecordSink>(sink: &mut S, record: &StreamRecord) -> io::Result<()> {
    sink.write_record(record)?;
    sink.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_queries() {
        let root = Path::new("/");
        assert!(SearchRequest::new("a", root).is_err());
        assert!(SearchRequest::new("  a  ", root).is_err());
        let request = SearchRequest::new("  ab ", root).unwrap();
        assert_eq!(request.query_text(), "ab");
        assert_eq!(request.root_scope(), root);
    }

    #[test]
    fn records_serialize_with_type_tag() {
        let status = StreamRecord::Status {
            message: COMPLETED_MESSAGE.to_string(),
        };
        assert_eq!(
            serde_json::to_string(&status).unwrap(),
            r#"{"type":"status","message":"Search completed"}"#
        );
        let error = StreamRecord::Error {
            message: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&error).unwrap(),
            r#"{"type":"error","message":"boom"}"#
        );
    }

    #[test]
    fn writer_sink_emits_one_line_per_record() {
        let mut sink = NdjsonWriter::new(Vec::new());
        emit(
            &mut sink,
            &StreamRecord::Status {
                message: "one".to_string(),
            },
        )
        .unwrap();
        emit(
            &mut sink,
            &StreamRecord::Status {
                message: "two".to_string(),
            },
        )
        .unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 2);
        assert!(out.ends_with('\n'));
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn broken_pipe_marks_writer_disconnected() {
        let mut sink = NdjsonWriter::new(ClosedPipe);
        assert!(!sink.is_disconnected());
        let record = StreamRecord::Status {
            message: "x".to_string(),
        };
        assert!(sink.write_record(&record).is_err());
        assert!(sink.is_disconnected());
    }
}
