use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::model::game_save::{SaveSlot, SlotSummary, SAVE_VERSION};

pub const SLOT_COUNT: u8 = 5;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("slot {0} does not exist (slots are 1-5)")]
    InvalidSlot(u8),
    #[error("slot {0} is empty")]
    EmptySlot(u8),
    #[error("save version {found} is newer than this player supports ({supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("save file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("save file is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Numbered save slots plus per-character reading progress.
#[derive(Debug, Clone)]
pub struct SaveStore {
    root: PathBuf,
}

impl SaveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<data dir>/gal_player`, or the working directory if there is none.
    pub fn default_location() -> Self {
        let mut root = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        root.push("gal_player");
        Self::new(root)
    }

    fn slot_path(&self, slot: u8) -> Result<PathBuf, SaveError> {
        if !(1..=SLOT_COUNT).contains(&slot) {
            return Err(SaveError::InvalidSlot(slot));
        }
        Ok(self.root.join("saves").join(format!("slot_{slot}.json")))
    }

    fn progress_path(&self) -> PathBuf {
        self.root.join("progress.json")
    }

    pub fn save(&self, slot: u8, data: &SaveSlot) -> Result<(), SaveError> {
        let path = self.slot_path(slot)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, serde_json::to_string_pretty(data)?)?;
        info!(slot, character = %data.character, "game saved");
        Ok(())
    }

    pub fn load(&self, slot: u8) -> Result<SaveSlot, SaveError> {
        let path = self.slot_path(slot)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(SaveError::EmptySlot(slot)),
            Err(e) => return Err(e.into()),
        };
        let data: SaveSlot = serde_json::from_str(&text)?;
        if data.version > SAVE_VERSION {
            return Err(SaveError::UnsupportedVersion {
                found: data.version,
                supported: SAVE_VERSION,
            });
        }
        info!(slot, character = %data.character, "game loaded");
        Ok(data)
    }

    pub fn delete(&self, slot: u8) -> Result<(), SaveError> {
        match fs::remove_file(self.slot_path(slot)?) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// One entry per slot, `None` for empty or unreadable slots.
    pub fn list(&self) -> Vec<Option<SlotSummary>> {
        (1..=SLOT_COUNT)
            .map(|slot| match self.load(slot) {
                Ok(data) => Some(SlotSummary {
                    slot,
                    saved_at: data.saved_at,
                    character: data.character,
                    preview_text: data.preview_text,
                    position: data.snapshot.current_index,
                    total_frames: data.total_frames,
                }),
                Err(SaveError::EmptySlot(_)) => None,
                Err(error) => {
                    warn!(slot, %error, "unreadable save slot");
                    None
                }
            })
            .collect()
    }

    fn read_progress(&self) -> HashMap<String, usize> {
        fs::read_to_string(self.progress_path())
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Last frame index reached for `character`, if it was ever recorded.
    pub fn progress(&self, character: &str) -> Option<usize> {
        self.read_progress().get(character).copied()
    }

    pub fn store_progress(&self, character: &str, index: usize) -> Result<(), SaveError> {
        let mut progress = self.read_progress();
        progress.insert(character.to_string(), index);
        fs::create_dir_all(&self.root)?;
        fs::write(self.progress_path(), serde_json::to_string_pretty(&progress)?)?;
        Ok(())
    }
}
