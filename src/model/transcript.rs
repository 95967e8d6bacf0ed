use serde::{Deserialize, Serialize};

use crate::model::frame::ImageRef;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterInfo {
    pub name: String,
    #[serde(default)]
    pub avatar: Option<ImageRef>,
}

/// One message as the host stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub speaker_name: String,
    #[serde(default)]
    pub is_user: bool,
    /// Raw stored text: light HTML plus newlines.
    pub raw_content: String,
    #[serde(default)]
    pub attachments: Vec<ImageRef>,
}

impl TranscriptMessage {
    pub fn user(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker_name: name.into(),
            is_user: true,
            raw_content: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn character(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker_name: name.into(),
            is_user: false,
            raw_content: text.into(),
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub character: CharacterInfo,
    #[serde(default)]
    pub messages: Vec<TranscriptMessage>,
}

impl Transcript {
    /// Background used when no message supplies one.
    pub fn session_background(&self) -> ImageRef {
        self.character
            .avatar
            .clone()
            .unwrap_or_else(ImageRef::placeholder)
    }

    pub fn user_name(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_user)
            .map(|m| m.speaker_name.clone())
            .unwrap_or_else(|| "You".to_string())
    }
}
