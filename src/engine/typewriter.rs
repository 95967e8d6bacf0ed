//! Character-by-character text reveal.
//!
//! The animator owns no timer. Whoever drives it asks for
//! [`TypewriterAnimator::next_deadline`] and calls
//! [`TypewriterAnimator::tick`] with the current time, passing the frame's
//! text as it is *now*, which may have grown since `start`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypewriterConfig {
    pub enabled: bool,
    /// Milliseconds per character.
    pub speed_ms: u64,
}

impl Default for TypewriterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            speed_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypewriterState {
    Idle,
    Revealing,
    Complete,
}

/// Identifies the frame being revealed. A change means "different frame",
/// even if the text happens to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameKey {
    pub index: usize,
    pub message: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was due.
    Unchanged,
    /// The cursor moved.
    Revealed,
    /// The reveal caught up with the text and stopped.
    Completed,
}

#[derive(Debug, Clone)]
pub struct TypewriterAnimator {
    config: TypewriterConfig,
    state: TypewriterState,
    cursor: usize,
    next_tick_ms: Option<u64>,
    key: Option<FrameKey>,
}

impl TypewriterAnimator {
    pub fn new(config: TypewriterConfig) -> Self {
        Self {
            config,
            state: TypewriterState::Idle,
            cursor: 0,
            next_tick_ms: None,
            key: None,
        }
    }

    pub fn config(&self) -> TypewriterConfig {
        self.config
    }

    /// New settings apply from the next `start`.
    pub fn set_config(&mut self, config: TypewriterConfig) {
        self.config = config;
    }

    pub fn state(&self) -> TypewriterState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn key(&self) -> Option<FrameKey> {
        self.key
    }

    pub fn is_revealing(&self) -> bool {
        self.state == TypewriterState::Revealing
    }

    pub fn next_deadline(&self) -> Option<u64> {
        match self.state {
            TypewriterState::Revealing => self.next_tick_ms,
            _ => None,
        }
    }

    /// Begin revealing `text` for the frame `key`.
    pub fn start(&mut self, key: FrameKey, text: &str, now_ms: u64) -> TickOutcome {
        self.key = Some(key);
        let len = text.chars().count();

        if !self.config.enabled || len == 0 {
            self.cursor = len;
            self.state = TypewriterState::Complete;
            self.next_tick_ms = None;
            return TickOutcome::Completed;
        }

        self.cursor = 1;
        self.state = TypewriterState::Revealing;
        self.next_tick_ms = Some(now_ms + self.config.speed_ms.max(1));
        TickOutcome::Revealed
    }

    /// Process every tick that has come due by `now_ms`. One character per
    /// tick; the cursor never moves backwards.
    pub fn tick(&mut self, now_ms: u64, current_text: &str) -> TickOutcome {
        if self.state != TypewriterState::Revealing {
            return TickOutcome::Unchanged;
        }

        let len = current_text.chars().count();
        let interval = self.config.speed_ms.max(1);
        let mut outcome = TickOutcome::Unchanged;

        while let Some(due) = self.next_tick_ms {
            if due > now_ms {
                break;
            }
            if self.cursor < len {
                self.cursor += 1;
                self.next_tick_ms = Some(due + interval);
                outcome = TickOutcome::Revealed;
            } else {
                self.complete();
                return TickOutcome::Completed;
            }
        }

        outcome
    }

    /// Jump to the end of the text. Returns false if there was nothing to skip.
    pub fn skip(&mut self, current_text: &str) -> bool {
        if self.state != TypewriterState::Revealing {
            return false;
        }
        self.cursor = current_text.chars().count();
        self.complete();
        true
    }

    /// Cancel without completing, e.g. when the reader navigates away.
    pub fn stop(&mut self) {
        self.state = TypewriterState::Idle;
        self.next_tick_ms = None;
        self.key = None;
    }

    fn complete(&mut self) {
        self.state = TypewriterState::Complete;
        self.next_tick_ms = None;
    }

    /// The part of `text` currently visible.
    pub fn revealed<'a>(&self, text: &'a str) -> &'a str {
        match self.state {
            TypewriterState::Revealing => match text.char_indices().nth(self.cursor) {
                Some((byte, _)) => &text[..byte],
                None => text,
            },
            TypewriterState::Idle | TypewriterState::Complete => text,
        }
    }
}
