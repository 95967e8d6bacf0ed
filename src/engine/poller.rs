//! Pull-based stand-in for push token events.

use tracing::{debug, warn};

/// Something that can be asked how generation is going.
pub trait GenerationProbe: Send {
    fn is_generating(&self) -> bool;

    /// Full text produced so far, if any is available yet.
    fn current_text(&self) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollAction {
    /// Not due yet.
    Wait,
    /// Fresh snapshot of the generated text.
    Update(String),
    /// Stop polling and run the final pass with whatever text is known.
    Finalize(Option<String>),
}

#[derive(Debug, Clone)]
pub struct FallbackPoller {
    interval_ms: u64,
    idle_limit: u32,
    idle_polls: u32,
    next_poll_ms: u64,
    last_text: Option<String>,
}

impl FallbackPoller {
    pub fn new(interval_ms: u64, idle_limit: u32, now_ms: u64) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            idle_limit,
            idle_polls: 0,
            next_poll_ms: now_ms + interval_ms.max(1),
            last_text: None,
        }
    }

    pub fn next_deadline(&self) -> u64 {
        self.next_poll_ms
    }

    /// One poll. An idle poll is one where generation is no longer running
    /// and no final text has shown up; after `idle_limit` of them the
    /// poller gives up and asks for finalization with what it last saw.
    pub fn poll(&mut self, probe: &dyn GenerationProbe, now_ms: u64) -> PollAction {
        if now_ms < self.next_poll_ms {
            return PollAction::Wait;
        }
        self.next_poll_ms = now_ms + self.interval_ms;

        let text = probe.current_text();
        if probe.is_generating() {
            self.idle_polls = 0;
            return match text {
                Some(text) if self.last_text.as_deref() != Some(text.as_str()) => {
                    self.last_text = Some(text.clone());
                    PollAction::Update(text)
                }
                _ => PollAction::Wait,
            };
        }

        if text.is_some() {
            debug!("generation finished, finalizing from poller");
            return PollAction::Finalize(text);
        }

        self.idle_polls += 1;
        if self.idle_polls >= self.idle_limit {
            warn!(
                idle_polls = self.idle_polls,
                "generation stopped without text, forcing finalization"
            );
            PollAction::Finalize(self.last_text.clone())
        } else {
            PollAction::Wait
        }
    }
}
