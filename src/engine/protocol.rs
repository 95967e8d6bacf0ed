use crate::engine::poller::GenerationProbe;
use crate::engine::typewriter::TypewriterConfig;
use crate::model::choice::Choice;
use crate::model::frame::{Frame, ImageRef};
use crate::model::game_save::SlotSummary;
use crate::model::snapshot::SessionBootstrap;
use crate::model::transcript::Transcript;

/// Identifies one request to the content source. Events carrying any other
/// id come from a request that was cancelled or replaced and are dropped.
pub type GenerationId = u64;

pub enum EngineCommand {
    LoadTranscript {
        transcript: Transcript,
        bootstrap: SessionBootstrap,
    },

    // Content source events
    GenerationStarted(GenerationId),
    TokenReceived {
        generation: GenerationId,
        delta: String,
    },
    /// `final_text` is the authoritative full message, when the source has it.
    GenerationEnded {
        generation: GenerationId,
        final_text: Option<String>,
    },
    GenerationStopped(GenerationId),
    GenerationFailed {
        generation: GenerationId,
        error: String,
    },
    /// Pull-based substitute for the events above.
    StartPolling {
        generation: GenerationId,
        probe: Box<dyn GenerationProbe>,
    },

    // Reader input
    Advance,
    Next,
    Prev,
    JumpTo(usize),
    Restart,
    Skip,
    SubmitPlayerInput(String),
    ContinueStory,
    SelectChoice(Choice),
    StopGeneration,

    UpdateTypewriter(TypewriterConfig),
    RequestHistory,
    ListSlots,
    SaveSlot(u8),
    LoadSlot(u8),
    DeleteSlot(u8),

    Shutdown,
}

/// Everything the viewer needs to draw the current page.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameView {
    pub index: usize,
    pub total: usize,
    pub frame: Frame,
    pub revealed: String,
    pub typing: bool,
    pub streaming: bool,
    pub more_available: bool,
    pub end_reached: bool,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineResponse {
    View(FrameView),
    /// Frames up to the high-water index, with the current index.
    History {
        frames: Vec<Frame>,
        current: usize,
    },
    Busy(bool),
    Notice(String),
    ResetBackground(ImageRef),
    /// One entry per slot, `None` when empty.
    Slots(Vec<Option<SlotSummary>>),
}
