//! Default location of the mapping file.

use std::path::PathBuf;

use anyhow::{Context, Result};

const APP_DIR: &str = "midimap";
const MAPPINGS_FILE: &str = "mappings.json";

/// Platform config-dir location of the mapping file, creating the app
/// directory on the way (`~/.config/midimap/mappings.json` on Linux,
/// `%APPDATA%\midimap\mappings.json` on Windows).
pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("no platform configuration directory")?;
    let dir = base.join(APP_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    Ok(dir.join(MAPPINGS_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_points_at_the_app_file() {
        if let Ok(path) = default_config_path() {
            assert_eq!(path.file_name().unwrap(), MAPPINGS_FILE);
            assert!(path.parent().unwrap().ends_with(APP_DIR));
        }
    }
}
