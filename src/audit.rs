use chrono::Local;
use log::warn;
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub user: Option<String>,
    pub ip: Option<String>,
    pub action: String,
    pub status: String,
    pub detail: String,
}

impl AuditEvent {
    pub fn new(action: &str, status: &str, detail: impl Into<String>) -> Self {
        Self {
            user: None,
            ip: None,
            action: action.to_string(),
            status: status.to_string(),
            detail: detail.into(),
        }
    }

    pub fn by(mut self, actor: &Actor) -> Self {
        self.user = actor.user.clone();
        self.ip = actor.ip.clone();
        self
    }
}

/// Who issued a request, as far as the transport knows.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user: Option<String>,
    pub ip: Option<String>,
}

/// Security event trail. Recording must never fail the caller's operation.
#[cfg_attr(test, mockall::automock)]
pub trait AuditLog: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Appends one line per event to a file.
pub struct FileAuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, line: &str) -> io::Result<()> {
        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

pub fn format_event(event: &AuditEvent) -> String {
    format!(
        "[{}] User: {} IP: {} Action: {} Status: {} Details: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        event.user.as_deref().unwrap_or("anonymous"),
        event.ip.as_deref().unwrap_or("-"),
        event.action,
        event.status,
        event.detail.replace('\n', " ")
    )
}

impl AuditLog for FileAuditLog {
    fn record(&self, event: AuditEvent) {
        if let Err(e) = self.append(&format_event(&event)) {
            warn!(
                "Failed to write audit log {}: {e} (event: {} {})",
                self.path.display(),
                event.action,
                event.status
            );
        }
    }
}
