use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a background image: a local path or a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

const PLACEHOLDER_REF: &str = "placeholder:blank";

impl ImageRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Session-level stand-in used when nothing better is known.
    pub fn placeholder() -> Self {
        Self(PLACEHOLDER_REF.to_string())
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 == PLACEHOLDER_REF
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_remote(&self) -> bool {
        self.0.starts_with("http://") || self.0.starts_with("https://")
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One displayable page: who speaks, what they say, over which background.
///
/// Frames are never edited after construction. The playlist swaps them out
/// wholesale when a message is re-parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub text: String,
    pub speaker_name: Option<String>,
    pub is_user: bool,
    pub background: ImageRef,
    pub source_message_index: usize,
}

impl Frame {
    pub const PLACEHOLDER_TEXT: &'static str = "…";
    pub const PLACEHOLDER_SPEAKER: &'static str = "System";

    /// Stand-in frame used whenever a list of frames would otherwise be empty.
    pub fn placeholder(background: ImageRef, source_message_index: usize) -> Self {
        Self {
            text: Self::PLACEHOLDER_TEXT.to_string(),
            speaker_name: Some(Self::PLACEHOLDER_SPEAKER.to_string()),
            is_user: false,
            background,
            source_message_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_frame_uses_system_speaker() {
        let frame = Frame::placeholder(ImageRef::new("bg.png"), 3);
        assert_eq!(frame.text, "…");
        assert_eq!(frame.speaker_name.as_deref(), Some("System"));
        assert_eq!(frame.background.as_str(), "bg.png");
        assert_eq!(frame.source_message_index, 3);
    }

    #[test]
    fn image_ref_serializes_as_plain_string() {
        let json = serde_json::to_string(&ImageRef::new("a.png")).unwrap();
        assert_eq!(json, "\"a.png\"");
        assert!(ImageRef::placeholder().is_placeholder());
        assert!(ImageRef::new("https://x/y.png").is_remote());
    }
}
