use crate::audit::{Actor, AuditEvent, AuditLog};
use crate::config::Config;
use crate::error::{FileOpError, Result};
use crate::file_info::{
    display_name, display_path, format_file_size, format_modified, format_permissions,
};
use crate::validator::PathValidator;
use crate::walker::{is_readable, is_writable};
use chrono::Utc;
use log::info;
use serde::Serialize;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DELETED_MESSAGE: &str = "File successfully deleted";

/// File content plus display metadata. `content` is untrusted text and must
/// be escaped by whatever renders it.
#[derive(Debug, Clone, Serialize)]
pub struct FileView {
    pub name: String,
    pub path: String,
    pub content: String,
    pub size: String,
    pub modified: String,
    pub permissions: String,
}

#[derive(Debug, Clone)]
pub struct Deleted {
    pub path: PathBuf,
    pub backup: PathBuf,
}

pub struct FileOps {
    config: Arc<Config>,
    validator: PathValidator,
    audit: Arc<dyn AuditLog>,
}

impl FileOps {
    pub fn new(config: Arc<Config>, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            validator: PathValidator::new(config.clone()),
            config,
            audit,
        }
    }

    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    pub fn view(&self, raw_path: &str) -> Result<FileView> {
        let path = self.validator.validate(raw_path)?;
        if !is_readable(&path) {
            return Err(FileOpError::Unreadable.into());
        }

        let metadata = fs::metadata(&path)?;
        if metadata.len() > self.config.search.max_file_size {
            return Err(FileOpError::TooLarge.into());
        }

        let bytes = fs::read(&path).map_err(|_| FileOpError::Unreadable)?;
        let modified = metadata.modified()?;

        Ok(FileView {
            name: display_name(&path),
            path: display_path(&path),
            content: String::from_utf8_lossy(&bytes).into_owned(),
            size: format_file_size(metadata.len()),
            modified: format_modified(modified),
            permissions: format_permissions(metadata.permissions().mode()),
        })
    }

    /// Copies the file into the backup directory, then unlinks it. The
    /// original is left untouched unless the backup copy succeeded. The
    /// outcome is audited either way.
    pub fn delete(&self, raw_path: &str, actor: &Actor) -> Result<Deleted> {
        match self.delete_with_backup(raw_path) {
            Ok(deleted) => {
                info!(
                    "Deleted {} (backup at {})",
                    deleted.path.display(),
                    deleted.backup.display()
                );
                self.audit.record(
                    AuditEvent::new(
                        "delete_file",
                        "success",
                        format!("Deleted: {}", deleted.path.display()),
                    )
                    .by(actor),
                );
                Ok(deleted)
            }
            Err(e) => {
                self.audit
                    .record(AuditEvent::new("delete_file", "error", e.to_string()).by(actor));
                Err(e)
            }
        }
    }

    fn delete_with_backup(&self, raw_path: &str) -> Result<Deleted> {
        let path = self.validator.validate(raw_path)?;
        if !is_writable(&path) {
            return Err(
                FileOpError::DeleteFailed("Cannot delete file: Permission denied".into()).into(),
            );
        }

        let backup = self.backup_file(&path)?;

        fs::remove_file(&path).map_err(|e| {
            FileOpError::DeleteFailed(format!("Failed to delete file: {e}"))
        })?;

        Ok(Deleted { path, backup })
    }

    fn backup_file(&self, path: &Path) -> Result<PathBuf> {
        let backup_dir = &self.config.security.backup_dir;
        fs::create_dir_all(backup_dir).map_err(|e| {
            FileOpError::BackupFailed(format!("Failed to create backup directory: {e}"))
        })?;

        let backup = backup_dir.join(format!(
            "{}.{}.bak",
            display_name(path),
            Utc::now().format("%s%.6f")
        ));
        fs::copy(path, &backup)
            .map_err(|e| FileOpError::BackupFailed(format!("Failed to create backup: {e}")))?;
        Ok(backup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MockAuditLog;
    use crate::error::{PathError, SfsearchError};
    use mockall::predicate::function;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        backups: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("notes.txt"), "<b>hello</b>\n").unwrap();
        fs::write(root.join("big.log"), "x".repeat(64)).unwrap();
        let backups = dir.path().join("backup");
        Fixture {
            root: fs::canonicalize(&root).unwrap(),
            backups,
            _dir: dir,
        }
    }

    fn ops(fx: &Fixture, audit: MockAuditLog, max_size: u64, backups: &Path) -> FileOps {
        let mut config = Config::for_root(&fx.root).unwrap();
        config.search.max_file_size = max_size;
        config.security.backup_dir = backups.to_path_buf();
        FileOps::new(Arc::new(config), Arc::new(audit))
    }

    fn silent_audit() -> MockAuditLog {
        let mut audit = MockAuditLog::new();
        audit.expect_record().never();
        audit
    }

    #[test]
    fn view_returns_raw_content_and_metadata() {
        let fx = fixture();
        let ops = ops(&fx, silent_audit(), 1024, &fx.backups);
        let view = ops.view("notes.txt").unwrap();
        assert_eq!(view.name, "notes.txt");
        assert_eq!(view.content, "<b>hello</b>\n");
        assert_eq!(view.size, "13 B");
        assert_eq!(view.path, fx.root.join("notes.txt").to_string_lossy());
        assert_eq!(view.permissions.len(), 4);
    }

    #[test]
    fn view_rejects_oversized_file_without_content() {
        let fx = fixture();
        let ops = ops(&fx, silent_audit(), 16, &fx.backups);
        let err = ops.view("big.log").unwrap_err();
        assert!(matches!(err, SfsearchError::FileOp(FileOpError::TooLarge)));
        assert!(!err.to_string().contains("xxxx"));
    }

    #[test]
    fn view_propagates_path_errors() {
        let fx = fixture();
        let ops = ops(&fx, silent_audit(), 1024, &fx.backups);
        assert!(matches!(
            ops.view("../outside.txt"),
            Err(SfsearchError::Path(PathError::InvalidPath))
        ));
    }

    #[test]
    fn delete_backs_up_then_unlinks_and_audits_success() {
        let fx = fixture();
        let mut audit = MockAuditLog::new();
        audit
            .expect_record()
            .with(function(|e: &AuditEvent| {
                e.action == "delete_file"
                    && e.status == "success"
                    && e.user.as_deref() == Some("admin")
            }))
            .times(1)
            .return_const(());
        let ops = ops(&fx, audit, 1024, &fx.backups);
        let actor = Actor {
            user: Some("admin".to_string()),
            ip: None,
        };

        let deleted = ops.delete("notes.txt", &actor).unwrap();
        assert!(!fx.root.join("notes.txt").exists());
        assert_eq!(fs::read_to_string(&deleted.backup).unwrap(), "<b>hello</b>\n");
        let backup_name = deleted.backup.file_name().unwrap().to_string_lossy();
        assert!(backup_name.starts_with("notes.txt."));
        assert!(backup_name.ends_with(".bak"));
    }

    #[test]
    fn delete_keeps_original_when_backup_dir_cannot_be_created() {
        let fx = fixture();
        let blocker = fx.root.join("blocker.txt");
        fs::write(&blocker, "plain file").unwrap();
        let mut audit = MockAuditLog::new();
        audit
            .expect_record()
            .with(function(|e: &AuditEvent| e.status == "error"))
            .times(1)
            .return_const(());
        let ops = ops(&fx, audit, 1024, &blocker.join("backup"));

        let err = ops.delete("notes.txt", &Actor::default()).unwrap_err();
        assert!(matches!(err, SfsearchError::FileOp(FileOpError::BackupFailed(_))));
        assert!(fx.root.join("notes.txt").exists());
    }

    #[test]
    fn delete_audits_validation_failures() {
        let fx = fixture();
        let mut audit = MockAuditLog::new();
        audit
            .expect_record()
            .with(function(|e: &AuditEvent| {
                e.status == "error" && e.detail == "File type not allowed"
            }))
            .times(1)
            .return_const(());
        fs::write(fx.root.join("run.exe"), "MZ").unwrap();
        let ops = ops(&fx, audit, 1024, &fx.backups);
        assert!(ops.delete("run.exe", &Actor::default()).is_err());
        assert!(fx.root.join("run.exe").exists());
    }
}
