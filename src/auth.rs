//! API key resolution.
//!
//! Precedence: `GEMINI_API_KEY` environment variable, then the cached
//! key file under the config directory, then an interactive prompt that
//! writes the entered key back to the cache. The cache file is created
//! with owner-only permissions on unix.

use anyhow::Result;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::config::Config;

/// Environment variable consulted first.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Failure to obtain a key from any source. Always fatal, and always
/// raised before the first dispatch.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error(
        "No API key found. Set {API_KEY_ENV}, or run gemchat once interactively to enter one."
    )]
    Missing,
    #[error("Failed to access key cache: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the API key from the standard sources.
///
/// Prompts on stdin as a last resort, so this must be called before any
/// terminal mode changes (raw mode, alternate screen).
pub fn resolve_api_key() -> Result<String> {
    let key_path = Config::key_path()?;
    resolve_from(std::env::var(API_KEY_ENV).ok(), &key_path, prompt_for_key)
        .map_err(anyhow::Error::from)
}

/// Resolution with every input injected, for tests and for callers that
/// manage their own paths.
pub fn resolve_from(
    env_key: Option<String>,
    key_path: &Path,
    prompt: impl FnOnce() -> std::io::Result<String>,
) -> Result<String, CredentialError> {
    if let Some(key) = env_key {
        let key = key.trim().to_string();
        if !key.is_empty() {
            debug!("Using API key from environment");
            return Ok(key);
        }
    }

    if let Some(key) = load_cached_key(key_path)? {
        debug!("Using API key from cache file");
        return Ok(key);
    }

    let entered = prompt()?;
    let entered = entered.trim().to_string();
    if entered.is_empty() {
        return Err(CredentialError::Missing);
    }
    store_key(key_path, &entered)?;
    Ok(entered)
}

/// Read the cached key, if present and non-empty.
pub fn load_cached_key(path: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let key = contents.trim().to_string();
            Ok(if key.is_empty() { None } else { Some(key) })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write the key to the cache file with owner-only permissions.
pub fn store_key(path: &Path, key: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, key)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Ask for the key on the terminal. The key is echoed; it is a long-lived
/// static credential the user is pasting, not a password they type.
fn prompt_for_key() -> std::io::Result<String> {
    eprint!("Enter your Gemini API key: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line)
}
