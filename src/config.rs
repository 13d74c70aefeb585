use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Process-wide settings. Loaded once at startup, finalized, then shared
/// read-only behind an `Arc` by every component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub root_dir: PathBuf,
    pub max_file_size: u64,
    pub batch_size: usize,
    pub pacing_delay_ms: u64,
    pub excluded_dirs: Vec<String>,
    pub excluded_files: Vec<String>,
    pub allowed_extensions: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            batch_size: 20,
            pacing_delay_ms: 10,
            excluded_dirs: to_strings(&["node_modules", ".git", "vendor", ".svn"]),
            excluded_files: to_strings(&[".htaccess", ".env", "php.ini"]),
            allowed_extensions: to_strings(&[
                "txt", "php", "html", "htm", "css", "js", "json", "xml", "md", "log", "csv",
                "yml", "yaml", "ini", "conf", "config", "sh", "bash", "env", "example",
            ]),
        }
    }
}

impl SearchConfig {
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    /// Extension is the text after the last `.` of the file name, so a bare
    /// `.conf` counts as having the `conf` extension.
    pub fn is_allowed_extension(&self, path: &Path) -> bool {
        let ext = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext);
        match ext {
            Some(ext) if !ext.is_empty() => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }

    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.excluded_dirs.iter().any(|d| d == name)
    }

    pub fn is_excluded_file(&self, name: &str) -> bool {
        self.excluded_files.iter().any(|f| f == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    pub backup_dir: PathBuf,
    pub audit_log: PathBuf,
    /// Username to bcrypt password hash (`$2y$`, `$2b$` or `$2a$`).
    pub users: BTreeMap<String, String>,
}

fn default_token_ttl() -> u64 {
    3600
}
fn default_max_tokens() -> usize {
    10
}
fn default_session_ttl() -> u64 {
    7200
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl(),
            max_tokens: default_max_tokens(),
            session_ttl_secs: default_session_ttl(),
            backup_dir: PathBuf::from("backup"),
            audit_log: PathBuf::from("logs/security.log"),
            users: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Loads from an explicit file, or from the first config found on the
    /// search path, or falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_path(),
        };
        if let Some(path) = config_path {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    fn find_config_path() -> Option<PathBuf> {
        if let Some(xdg_config) = dirs::config_dir() {
            let xdg_path = xdg_config.join("sfsearch/config.toml");
            if xdg_path.exists() {
                return Some(xdg_path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let home_path = home.join(".sfsearch.toml");
            if home_path.exists() {
                return Some(home_path);
            }
        }

        let current_path = Path::new(".sfsearch.toml");
        if current_path.exists() {
            return Some(current_path.to_path_buf());
        }

        None
    }

    /// Canonicalizes the root and normalizes the filter sets. Every
    /// component assumes a finalized config.
    pub fn finalize(mut self) -> Result<Self> {
        let root = &self.search.root_dir;
        self.search.root_dir = fs::canonicalize(root)
            .with_context(|| format!("Root directory is not accessible: {}", root.display()))?;
        if !self.search.root_dir.is_dir() {
            anyhow::bail!(
                "Root directory is not a directory: {}",
                self.search.root_dir.display()
            );
        }
        if self.search.batch_size == 0 {
            anyhow::bail!("search.batch_size must be at least 1");
        }
        if self.security.max_tokens == 0 {
            anyhow::bail!("security.max_tokens must be at least 1");
        }
        if self.security.session_ttl_secs < self.security.token_ttl_secs {
            anyhow::bail!(
                "security.session_ttl_secs ({}) must not be shorter than security.token_ttl_secs ({})",
                self.security.session_ttl_secs,
                self.security.token_ttl_secs
            );
        }
        for ext in &mut self.search.allowed_extensions {
            *ext = ext.trim_start_matches('.').to_ascii_lowercase();
        }
        Ok(self)
    }

    /// Finalized config rooted at `root`, everything else default.
    pub fn for_root(root: impl Into<PathBuf>) -> Result<Self> {
        let mut config = Self::default();
        config.search.root_dir = root.into();
        config.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.search.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.search.batch_size, 20);
        assert_eq!(config.search.pacing_delay(), Duration::from_millis(10));
        assert_eq!(config.security.token_ttl_secs, 3600);
        assert_eq!(config.security.max_tokens, 10);
        assert!(config.security.session_ttl_secs >= config.security.token_ttl_secs);
        assert!(config.search.is_excluded_dir("node_modules"));
        assert!(config.search.is_excluded_file(".env"));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let config = Config::default();
        assert!(config.search.is_allowed_extension(Path::new("notes.TXT")));
        assert!(config.search.is_allowed_extension(Path::new("a/b/c.Md")));
        assert!(!config.search.is_allowed_extension(Path::new("image.png")));
        assert!(!config.search.is_allowed_extension(Path::new("Makefile")));
    }

    #[test]
    fn dotfile_name_is_its_own_extension() {
        let config = Config::default();
        assert!(config.search.is_allowed_extension(Path::new(".conf")));
        assert!(config.search.is_allowed_extension(Path::new("dir/.log")));
        assert!(config.search.is_allowed_extension(Path::new("app.env.example")));
        assert!(!config.search.is_allowed_extension(Path::new(".bashrc")));
        assert!(!config.search.is_allowed_extension(Path::new("trailing.")));
    }

    #[test]
    fn finalize_rejects_session_shorter_than_token() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.search.root_dir = dir.path().to_path_buf();
        config.security.session_ttl_secs = 1440;
        assert!(config.clone().finalize().is_err());

        config.security.session_ttl_secs = config.security.token_ttl_secs;
        assert!(config.finalize().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[search]\nbatch_size = 5\n\n[security.users]\nadmin = \"abc\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.search.batch_size, 5);
        assert_eq!(config.search.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.security.users.get("admin").map(String::as_str), Some("abc"));
        assert_eq!(config.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn finalize_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        assert!(Config::for_root(dir.path().join("missing")).is_err());
    }

    #[test]
    fn finalize_canonicalizes_root_and_extensions() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.search.root_dir = dir.path().join(".");
        config.search.allowed_extensions = vec![".TXT".to_string()];
        let config = config.finalize().unwrap();
        assert_eq!(config.search.root_dir, fs::canonicalize(dir.path()).unwrap());
        assert_eq!(config.search.allowed_extensions, vec!["txt".to_string()]);
    }
}
