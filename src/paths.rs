//! Common paths for Roost data storage
//!
//! All data lives under ~/.config/roost/:
//! - config.toml - sync configuration
//! - credentials.enc - encrypted access tokens
//! - roost.sqlite - local store

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Get the data directory (~/.config/roost/), creating it if needed
pub fn roost_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let dir = home.join(".config").join("roost");
    fs::create_dir_all(&dir).context("Failed to create roost directory")?;
    Ok(dir)
}

/// Get the config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(roost_dir()?.join("config.toml"))
}

/// Get the database file path
pub fn database_path() -> Result<PathBuf> {
    Ok(roost_dir()?.join("roost.sqlite"))
}

/// Get the credentials file path
pub fn credentials_path() -> Result<PathBuf> {
    Ok(roost_dir()?.join("credentials.enc"))
}
