use byte_unit::{Byte, Unit, UnitType};
use chrono::{DateTime, Local};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fs::Metadata;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const TIB: f64 = 1024.0 * 1024.0 * 1024.0 * 1024.0;

/// One file that matched a search. Built once, then handed to the sink.
#[derive(Debug, Clone)]
pub struct FileMatch {
    pub absolute_path: PathBuf,
    pub display_name: String,
    pub size_bytes: u64,
    pub modified_at: SystemTime,
    pub permission_bits: u32,
}

impl FileMatch {
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        Self {
            absolute_path: path.to_path_buf(),
            display_name: display_name(path),
            size_bytes: metadata.len(),
            modified_at: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            permission_bits: metadata.permissions().mode(),
        }
    }
}

impl Serialize for FileMatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FileMatch", 5)?;
        state.serialize_field("path", &display_path(&self.absolute_path))?;
        state.serialize_field("name", &self.display_name)?;
        state.serialize_field("size", &format_file_size(self.size_bytes))?;
        state.serialize_field("modified", &format_modified(self.modified_at))?;
        state.serialize_field("permissions", &format_permissions(self.permission_bits))?;
        state.end()
    }
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Human readable size in 1024 steps, capped at TB, two decimals at most:
/// `0 B`, `1.5 KB`, `10 MB`.
pub fn format_file_size(bytes: u64) -> String {
    let adjusted = Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary);
    let (value, unit) = match adjusted.get_unit() {
        Unit::B => (adjusted.get_value(), "B"),
        Unit::KiB => (adjusted.get_value(), "KB"),
        Unit::MiB => (adjusted.get_value(), "MB"),
        Unit::GiB => (adjusted.get_value(), "GB"),
        Unit::TiB => (adjusted.get_value(), "TB"),
        _ => (bytes as f64 / TIB, "TB"),
    };
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {unit}")
}

pub fn format_modified(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Last four octal digits of the mode, e.g. `0644`.
pub fn format_permissions(mode: u32) -> String {
    format!("{:04o}", mode & 0o7777)
}
