pub mod audit;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod file_info;
pub mod file_ops;
pub mod login;
pub mod matcher;
pub mod metrics;
pub mod server;
pub mod streamer;
pub mod validator;
pub mod walker;

pub use crate::config::Config;
pub use crate::error::{AuthError, FileOpError, PathError, Result, SfsearchError};
pub use auth::{RequestAuthorizer, Session, SessionStore};
pub use file_info::{FileMatch, format_file_size};
pub use file_ops::{FileOps, FileView};
pub use matcher::ContentMatcher;
pub use streamer::{NdjsonWriter, RecordSink, ResultStreamer, SearchOutcome, StreamRecord};
pub use validator::PathValidator;
pub use walker::TreeWalker;
