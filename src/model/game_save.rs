use serde::{Deserialize, Serialize};

use crate::model::snapshot::PlaylistSnapshot;
use crate::model::transcript::Transcript;

pub const SAVE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveSlot {
    pub version: u32,
    /// Seconds since the Unix epoch.
    pub saved_at: u64,
    pub character: String,
    pub preview_text: String,
    pub total_frames: usize,
    pub transcript: Transcript,
    pub snapshot: PlaylistSnapshot,
}

/// What the save menu shows for a slot without loading the whole file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSummary {
    pub slot: u8,
    pub saved_at: u64,
    pub character: String,
    pub preview_text: String,
    pub position: usize,
    pub total_frames: usize,
}
