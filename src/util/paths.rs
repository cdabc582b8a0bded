use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::RwLock;

pub const APP_DIR_NAME: &str = "ytq";
pub const CONFIG_DIR_ENV: &str = "YTQ_CONFIG_DIR";

// Global config directory override (for --config flag and tests)
static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Set config directory override (used by --config flag and tests)
pub fn set_config_dir_override(path: Option<PathBuf>) {
    match CONFIG_DIR_OVERRIDE.write() {
        Ok(mut guard) => *guard = path,
        Err(poisoned) => *poisoned.into_inner() = path,
    }
}

pub fn get_config_dir_override() -> Option<PathBuf> {
    match CONFIG_DIR_OVERRIDE.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Config directory: the `--config` override, else `YTQ_CONFIG_DIR`, else
/// the user config directory (`~/.config/ytq/` on Unix). Created if missing.
pub fn find_config_directory() -> Result<PathBuf> {
    let dir = match get_config_dir_override() {
        Some(dir) => dir,
        None => match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => get_user_config_dir()?,
        },
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory {:?}", dir))?;
    tracing::debug!("Using config directory: {:?}", dir);
    Ok(dir)
}

fn get_user_config_dir() -> Result<PathBuf> {
    let base_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine user config directory"))?;
    Ok(base_dir.join(APP_DIR_NAME))
}

/// Absolute path to settings.toml
pub fn get_app_config_path() -> Result<PathBuf> {
    Ok(find_config_directory()?.join("settings.toml"))
}

/// Default output folder: the user's Downloads directory, else `./Downloads`
pub fn resolve_default_download_directory() -> PathBuf {
    if let Some(downloads) = dirs::download_dir() {
        return downloads;
    }
    if let Ok(cwd) = std::env::current_dir() {
        return cwd.join("Downloads");
    }
    PathBuf::from("Downloads")
}

pub fn get_logs_dir() -> Result<PathBuf> {
    Ok(find_config_directory()?.join(".logs"))
}
