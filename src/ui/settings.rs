use serde::{Deserialize, Serialize};
use egui::Color32;
use std::collections::HashMap;

use crate::engine::llm_client::LlmConfig;
use crate::engine::session::SessionConfig;
use crate::engine::typewriter::TypewriterConfig;

const USER_COLOR: [u8; 4] = [0x00, 0xd2, 0xff, 255];

const PALETTE: [[u8; 4]; 7] = [
    [0x00, 0xd2, 0xff, 255],
    [0xff, 0x6e, 0xc7, 255],
    [0xff, 0xd7, 0x00, 255],
    [0x00, 0xff, 0x88, 255],
    [0xff, 0x8c, 0x00, 255],
    [0xb1, 0x9c, 0xd9, 255],
    [0xff, 0x6b, 0x6b, 255],
];

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PlayerSettings {
    pub ui_scale: f32,
    pub font_size: f32,
    pub typewriter: TypewriterConfig,
    pub refresh_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_idle_limit: u32,
    pub llm: LlmConfig,

    // Explicit speaker → color overrides; everyone else gets the palette.
    pub speaker_colors: HashMap<String, [u8; 4]>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            ui_scale: 1.0,
            font_size: 18.0,
            typewriter: TypewriterConfig::default(),
            refresh_interval_ms: 16,
            poll_interval_ms: 500,
            poll_idle_limit: 5,
            llm: LlmConfig::default(),
            speaker_colors: HashMap::new(),
        }
    }
}

impl PlayerSettings {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            typewriter: self.typewriter,
            refresh_interval_ms: self.refresh_interval_ms.max(1),
            poll_interval_ms: self.poll_interval_ms.max(1),
            poll_idle_limit: self.poll_idle_limit.max(1),
        }
    }

    pub fn set_color(&mut self, speaker: &str, color: Color32) {
        self.speaker_colors.insert(
            speaker.to_string(),
            [color.r(), color.g(), color.b(), color.a()],
        );
    }
}

fn to_color(c: [u8; 4]) -> Color32 {
    Color32::from_rgba_unmultiplied(c[0], c[1], c[2], c[3])
}

/// Hands out name-tag colors: overrides first, then the palette in the
/// order speakers are first seen.
#[derive(Debug, Default, Clone)]
pub struct SpeakerColors {
    assigned: HashMap<String, usize>,
}

impl SpeakerColors {
    pub fn color(&mut self, settings: &PlayerSettings, speaker: &str, is_user: bool) -> Color32 {
        if let Some(c) = settings.speaker_colors.get(speaker) {
            return to_color(*c);
        }
        if is_user {
            return to_color(USER_COLOR);
        }
        let next = self.assigned.len();
        let slot = *self.assigned.entry(speaker.to_string()).or_insert(next);
        to_color(PALETTE[slot % PALETTE.len()])
    }

    pub fn reset(&mut self) {
        self.assigned.clear();
    }
}
