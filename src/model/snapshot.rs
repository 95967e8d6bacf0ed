use serde::{Deserialize, Serialize};

use crate::model::frame::Frame;

/// Opaque playback state handed to the persistence collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSnapshot {
    pub frames: Vec<Frame>,
    pub current_index: usize,
    pub high_water_index: usize,
}

/// One-shot instruction from whoever sets up a session to the playlist it
/// creates. Consumed by value, so it can only be acted on once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBootstrap {
    /// Continue where the reader left off, or at the last frame.
    Resume { saved_index: Option<usize> },
    NewGame,
    Restore(PlaylistSnapshot),
}

impl Default for SessionBootstrap {
    fn default() -> Self {
        SessionBootstrap::Resume { saved_index: None }
    }
}
