//! Password check for the login collaborator. Users and their bcrypt
//! password hashes come from configuration.

use crate::auth::random_hex_token;
use crate::config::Config;
use bcrypt::Version;
use log::warn;
use std::hint::black_box;
use std::sync::OnceLock;

/// Work factor for newly generated hashes.
pub const DEFAULT_COST: u32 = 10;

/// Salted bcrypt hash in the `$2y$` format.
pub fn hash_password(password: &str, cost: u32) -> crate::Result<String> {
    let parts = bcrypt::hash_with_result(password, cost)?;
    Ok(parts.format_for_version(Version::TwoY))
}

/// False for a wrong password and for a hash that cannot be parsed.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match bcrypt::verify(password, stored_hash.trim()) {
        Ok(matched) => matched,
        Err(e) => {
            warn!("Unusable password hash: {e}");
            false
        }
    }
}

/// Hash checked for unknown users so that they cost the same as known ones.
fn unknown_user_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| {
        hash_password(&random_hex_token(), DEFAULT_COST).unwrap_or_else(|e| {
            warn!("Failed to prepare unknown-user hash: {e}");
            String::new()
        })
    })
}

/// True when `username` is configured and `password` matches its hash.
pub fn authenticate(config: &Config, username: &str, password: &str) -> bool {
    let username = username.trim();
    let password = password.trim();
    if username.is_empty() || password.is_empty() {
        return false;
    }
    let stored = config.security.users.get(username);
    let hash: &str = stored.map(String::as_str).unwrap_or_else(|| unknown_user_hash());
    let matched = black_box(verify_password(password, hash));
    stored.is_some() && matched
}
