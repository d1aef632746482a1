//! Storage Layer
//!
//! Configuration directory and archival of scanned nameplate photos.

pub mod photos;

pub use photos::{HttpPhotoStore, LocalPhotoStore, PhotoStore, StorageError, StoredPhoto};

use anyhow::Result;
use std::path::PathBuf;

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "nameplatescan", "NameplateScan")
        .ok_or_else(|| anyhow::anyhow!("Could not determine application directories"))
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}
