//! Cache root resolution: `UI5_DATA_DIR` env override, then a caller
//! override, then `$HOME/.ui5/`, each probed for writability.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

const ENV_VAR: &str = "UI5_DATA_DIR";

/// Resolve the cache root directory, trying candidates in priority order
/// and skipping any that exist but fail a write probe.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if no candidate is writable.
pub fn resolve_data_dir(caller_override: Option<&Path>) -> Result<PathBuf> {
    let mut tried = Vec::new();
    let mut candidates = Vec::new();

    if let Ok(env_dir) = std::env::var(ENV_VAR) {
        if !env_dir.is_empty() {
            candidates.push(PathBuf::from(env_dir));
        }
    }
    if let Some(dir) = caller_override {
        candidates.push(dir.to_path_buf());
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".ui5"));
    }

    for candidate in candidates {
        tried.push(candidate.display().to_string());
        if is_writable(&candidate) {
            return Ok(candidate);
        }
    }

    Err(Error::Configuration { tried })
}

fn is_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".write-probe");
    let writable = std::fs::write(&probe, b"").is_ok();
    let _ = std::fs::remove_file(&probe);
    writable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins_over_caller_override() {
        let env_dir = tempfile::tempdir().unwrap();
        let caller_dir = tempfile::tempdir().unwrap();
        temp_env::with_var(ENV_VAR, Some(env_dir.path().to_str().unwrap()), || {
            let resolved = resolve_data_dir(Some(caller_dir.path())).unwrap();
            assert_eq!(resolved, env_dir.path());
        });
    }

    #[test]
    fn caller_override_used_when_env_absent() {
        let caller_dir = tempfile::tempdir().unwrap();
        temp_env::with_var_unset(ENV_VAR, || {
            let resolved = resolve_data_dir(Some(caller_dir.path())).unwrap();
            assert_eq!(resolved, caller_dir.path());
        });
    }

    #[test]
    fn falls_back_to_home_ui5_when_nothing_else_given() {
        temp_env::with_var_unset(ENV_VAR, || {
            let resolved = resolve_data_dir(None);
            if let Some(home) = dirs::home_dir() {
                assert_eq!(resolved.unwrap(), home.join(".ui5"));
            }
        });
    }
}
