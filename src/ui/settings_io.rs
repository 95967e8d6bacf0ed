use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::ui::settings::PlayerSettings;

fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("gal_player");
    path.push("settings.json");
    path
}

pub fn load_settings() -> PlayerSettings {
    load_settings_from(&settings_path())
}

pub fn save_settings(settings: &PlayerSettings) {
    save_settings_to(&settings_path(), settings);
}

/// Missing or unreadable files give the defaults.
pub fn load_settings_from(path: &Path) -> PlayerSettings {
    fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn save_settings_to(path: &Path, settings: &PlayerSettings) {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    match serde_json::to_string_pretty(settings) {
        Ok(json) => {
            if let Err(error) = fs::write(path, json) {
                warn!(path = %path.display(), %error, "could not save settings");
            }
        }
        Err(error) => warn!(%error, "could not serialize settings"),
    }
}
