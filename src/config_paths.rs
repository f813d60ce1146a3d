use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "BATCHNAME_DATA_DIR";
pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const SETTINGS_FILE: &str = "settings.json";

pub fn batchname_config_dir() -> Result<PathBuf, String> {
    if let Some(dir) = std::env::var(DATA_DIR_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        return Ok(PathBuf::from(dir));
    }

    let home = if cfg!(target_os = "windows") {
        std::env::var("USERPROFILE")
            .or_else(|_| std::env::var("HOME"))
            .map_err(|_| "Unable to resolve USERPROFILE/HOME".to_string())?
    } else {
        std::env::var("HOME").map_err(|_| "Unable to resolve HOME".to_string())?
    };

    let mut path = PathBuf::from(home);
    if cfg!(target_os = "macos") {
        path.push("Library");
        path.push("Application Support");
        path.push("batchname");
    } else {
        path.push(".config");
        path.push("batchname");
    }
    Ok(path)
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE)
}

/// Token file candidates in lookup order. The working directory copy wins
/// over the one in the user data directory.
pub fn credential_candidates(data_dir: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(CREDENTIALS_FILE));
    }
    candidates.push(data_dir.join(CREDENTIALS_FILE));
    candidates
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| format!("Failed to create {}: {err}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_lookup_prefers_working_directory() {
        let data_dir = PathBuf::from("/tmp/batchname-data");
        let candidates = credential_candidates(&data_dir);
        assert_eq!(candidates.last(), Some(&data_dir.join(CREDENTIALS_FILE)));
        if candidates.len() == 2 {
            assert!(candidates[0].ends_with(CREDENTIALS_FILE));
            assert_ne!(candidates[0], candidates[1]);
        }
    }
}
