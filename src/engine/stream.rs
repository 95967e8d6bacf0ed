//! Live re-parsing of a message while it is being generated.
//!
//! Frames before the boundary are frozen history. Every pass re-parses the
//! whole accumulated buffer and swaps out everything from the boundary on.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::markup::{parse_markup, parse_markup_partial};
use crate::engine::narrative_parser::{parse_frames, ParseContext};
use crate::engine::playlist::PlaylistStore;
use crate::engine::tokenizer::tokenize;
use crate::model::frame::{Frame, ImageRef};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("no streaming session is active")]
    NoSession,
    #[error("streaming boundary {boundary} is past the end of the playlist ({len} frames)")]
    BoundaryOutOfRange { boundary: usize, len: usize },
}

#[derive(Debug, Clone)]
pub struct StreamingSession {
    buffer_text: String,
    boundary_index: usize,
    speaker: Option<String>,
    message_index: usize,
    last_tail_len: usize,
}

impl StreamingSession {
    pub fn buffer_text(&self) -> &str {
        &self.buffer_text
    }

    pub fn boundary_index(&self) -> usize {
        self.boundary_index
    }
}

/// What a pass did to the reader's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPin {
    /// The reader was on the live tail and was moved to the new tail.
    Followed,
    /// The reader is on an earlier streamed frame; new frames are waiting.
    MoreAvailable,
    /// The reader is in frozen history, or nothing changed.
    Untouched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOutcome {
    pub tail_len: usize,
    pub pin: IndexPin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeReport {
    pub tail_len: usize,
    pub previous_tail_len: usize,
    pub pin: IndexPin,
}

impl FinalizeReport {
    /// The final text produced fewer frames than the last live pass did.
    pub fn shrank(&self) -> bool {
        self.tail_len < self.previous_tail_len
    }
}

#[derive(Debug, Clone)]
pub struct StreamReconciler {
    session: Option<StreamingSession>,
    pending_at: Option<u64>,
    refresh_interval_ms: u64,
    more_available: bool,
}

impl StreamReconciler {
    pub fn new(refresh_interval_ms: u64) -> Self {
        Self {
            session: None,
            pending_at: None,
            refresh_interval_ms,
            more_available: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&StreamingSession> {
        self.session.as_ref()
    }

    pub fn more_available(&self) -> bool {
        self.more_available
    }

    pub fn clear_more_available(&mut self) {
        self.more_available = false;
    }

    /// Freeze `store[..boundary]` as history and open a session for the
    /// message that will follow it.
    pub fn start(
        &mut self,
        store: &mut PlaylistStore,
        boundary: usize,
        speaker: Option<String>,
        message_index: usize,
    ) {
        let boundary = boundary.min(store.authored_len());
        store.replace_tail(boundary, Vec::new());
        store.set_streaming_boundary(Some(boundary));

        self.session = Some(StreamingSession {
            buffer_text: String::new(),
            boundary_index: boundary,
            speaker,
            message_index,
            last_tail_len: 0,
        });
        self.pending_at = None;
        self.more_available = false;
        info!(boundary, message_index, "stream started");
    }

    /// Append a delta and schedule a pass. Arrivals within one refresh
    /// interval share a single pass.
    pub fn on_token(&mut self, delta: &str, now_ms: u64) {
        let Some(session) = self.session.as_mut() else {
            debug!("token received with no active stream, ignoring");
            return;
        };
        session.buffer_text.push_str(delta);
        if self.pending_at.is_none() {
            self.pending_at = Some(now_ms + self.refresh_interval_ms);
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.pending_at
    }

    /// Run the scheduled pass if it has come due.
    pub fn run_due(
        &mut self,
        store: &mut PlaylistStore,
        now_ms: u64,
    ) -> Option<Result<PassOutcome, ReconcileError>> {
        match self.pending_at {
            Some(due) if due <= now_ms => {
                self.pending_at = None;
                Some(self.reconcile_buffer(store))
            }
            _ => None,
        }
    }

    /// Re-derive the tail from the accumulated buffer right away.
    pub fn reconcile_buffer(&mut self, store: &mut PlaylistStore) -> Result<PassOutcome, ReconcileError> {
        let text = self
            .session
            .as_ref()
            .ok_or(ReconcileError::NoSession)?
            .buffer_text
            .clone();
        self.reconcile_text(store, &text, false)
    }

    /// Re-derive the tail from an externally supplied full text, replacing
    /// the buffer. Used by the polling source, which sees whole snapshots.
    pub fn reconcile_snapshot(
        &mut self,
        store: &mut PlaylistStore,
        text: &str,
    ) -> Result<PassOutcome, ReconcileError> {
        let session = self.session.as_mut().ok_or(ReconcileError::NoSession)?;
        session.buffer_text = text.to_string();
        self.pending_at = None;
        self.reconcile_text(store, text, false)
    }

    /// Final authoritative pass. Cancels any pending pass first, then ends
    /// the session whatever the outcome.
    pub fn finish(
        &mut self,
        store: &mut PlaylistStore,
        final_text: Option<&str>,
    ) -> Result<FinalizeReport, ReconcileError> {
        self.pending_at = None;
        let session = self.session.as_ref().ok_or(ReconcileError::NoSession)?;
        let previous_tail_len = session.last_tail_len;
        let text = final_text
            .map(str::to_string)
            .unwrap_or_else(|| session.buffer_text.clone());

        let result = self.reconcile_text(store, &text, true);
        self.session = None;
        store.set_streaming_boundary(None);

        let outcome = result?;
        let report = FinalizeReport {
            tail_len: outcome.tail_len,
            previous_tail_len,
            pin: outcome.pin,
        };
        if report.shrank() {
            warn!(
                previous = previous_tail_len,
                final_frames = report.tail_len,
                "final text produced fewer frames than the live stream"
            );
        }
        info!(frames = store.len(), "stream finished");
        Ok(report)
    }

    fn reconcile_text(
        &mut self,
        store: &mut PlaylistStore,
        text: &str,
        is_final: bool,
    ) -> Result<PassOutcome, ReconcileError> {
        let session = self.session.as_mut().ok_or(ReconcileError::NoSession)?;
        let boundary = session.boundary_index;
        if boundary > store.authored_len() {
            return Err(ReconcileError::BoundaryOutOfRange {
                boundary,
                len: store.authored_len(),
            });
        }

        let initial_background = boundary
            .checked_sub(1)
            .and_then(|i| store.frame(i))
            .map(|frame| frame.background.clone())
            .unwrap_or_else(|| store.session_background().clone());

        let frames = parse_stream_text(
            text,
            &initial_background,
            session.speaker.as_deref(),
            session.message_index,
            is_final,
        );

        if frames.is_empty() && !is_final {
            // Nothing narrative yet (still reasoning, or only markup).
            return Ok(PassOutcome {
                tail_len: session.last_tail_len,
                pin: IndexPin::Untouched,
            });
        }

        let old_len = store.len();
        let current = store.current_index();
        store.replace_tail(boundary, frames);
        let new_len = store.len();

        let pin = if current < boundary {
            IndexPin::Untouched
        } else if current + 1 == old_len {
            store.set_current_index(new_len - 1);
            IndexPin::Followed
        } else if current + 1 < new_len {
            self.more_available = true;
            IndexPin::MoreAvailable
        } else {
            IndexPin::Untouched
        };
        store.raise_high_water(new_len - 1);

        let tail_len = store.authored_len().saturating_sub(boundary);
        session.last_tail_len = tail_len;
        debug!(tail_len, ?pin, is_final, "reconciled stream tail");

        Ok(PassOutcome { tail_len, pin })
    }
}

/// Parse a streaming buffer as one synthetic character message. Until the
/// text is final, a half-written tag at its end is held back.
pub fn parse_stream_text(
    text: &str,
    initial_background: &ImageRef,
    speaker: Option<&str>,
    message_index: usize,
    is_final: bool,
) -> Vec<Frame> {
    let nodes = if is_final {
        parse_markup(text)
    } else {
        parse_markup_partial(text)
    };
    let tokens = tokenize(&nodes);
    let ctx = ParseContext {
        initial_background,
        default_speaker: speaker,
        is_user: false,
        attachment: None,
        message_index,
    };
    parse_frames(&tokens, &ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::snapshot::SessionBootstrap;

    fn history() -> PlaylistStore {
        let frames = vec![
            Frame {
                text: "Earlier".into(),
                speaker_name: Some("Aria".into()),
                is_user: false,
                background: ImageRef::new("room.png"),
                source_message_index: 0,
            },
            Frame {
                text: "Go on".into(),
                speaker_name: Some("You".into()),
                is_user: true,
                background: ImageRef::new("room.png"),
                source_message_index: 1,
            },
        ];
        PlaylistStore::open(frames, ImageRef::new("avatar.png"), SessionBootstrap::Resume { saved_index: None })
    }

    fn started(store: &mut PlaylistStore) -> StreamReconciler {
        let mut reconciler = StreamReconciler::new(16);
        let boundary = store.authored_len();
        reconciler.start(store, boundary, Some("Aria".into()), 2);
        reconciler
    }

    #[test]
    fn tokens_are_coalesced_into_one_pass() {
        let mut store = history();
        let mut rec = started(&mut store);
        rec.on_token("Hel", 100);
        rec.on_token("lo", 105);
        assert_eq!(rec.next_deadline(), Some(116));
        assert!(rec.run_due(&mut store, 110).is_none());
        let outcome = rec.run_due(&mut store, 116).unwrap().unwrap();
        assert_eq!(outcome.tail_len, 1);
        assert_eq!(rec.next_deadline(), None);
        assert_eq!(store.frames()[2].text, "Hello");
    }

    #[test]
    fn new_frames_inherit_background_before_boundary() {
        let mut store = history();
        let mut rec = started(&mut store);
        rec.on_token("Aria: Welcome back.", 0);
        rec.reconcile_buffer(&mut store).unwrap();
        assert_eq!(store.frames()[2].background.as_str(), "room.png");
        assert_eq!(store.frames()[2].speaker_name.as_deref(), Some("Aria"));
    }

    #[test]
    fn reader_in_history_is_not_moved() {
        let mut store = history();
        store.set_current_index(0);
        let mut rec = started(&mut store);
        rec.on_token("One\nTwo", 0);
        let outcome = rec.reconcile_buffer(&mut store).unwrap();
        assert_eq!(outcome.pin, IndexPin::Untouched);
        assert_eq!(store.current_index(), 0);
        assert_eq!(store.high_water_index(), 3);
    }

    #[test]
    fn reader_on_live_tail_follows_growth() {
        let mut store = history();
        let mut rec = started(&mut store);
        rec.on_token("One", 0);
        rec.reconcile_buffer(&mut store).unwrap();
        store.set_current_index(2);

        rec.on_token("\nTwo", 0);
        let outcome = rec.reconcile_buffer(&mut store).unwrap();
        assert_eq!(outcome.pin, IndexPin::Followed);
        assert_eq!(store.current_index(), 3);
    }

    #[test]
    fn reader_on_earlier_streamed_frame_gets_more_available() {
        let mut store = history();
        let mut rec = started(&mut store);
        rec.on_token("One\nTwo", 0);
        rec.reconcile_buffer(&mut store).unwrap();
        store.set_current_index(2);

        rec.on_token("\nThree", 0);
        let outcome = rec.reconcile_buffer(&mut store).unwrap();
        assert_eq!(outcome.pin, IndexPin::MoreAvailable);
        assert_eq!(store.current_index(), 2);
        assert!(rec.more_available());
    }

    #[test]
    fn reasoning_only_buffer_keeps_previous_tail() {
        let mut store = history();
        let mut rec = started(&mut store);
        rec.on_token("<thinking>what should Aria say", 0);
        let outcome = rec.reconcile_buffer(&mut store).unwrap();
        assert_eq!(outcome.tail_len, 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn finish_cancels_pending_pass_and_uses_final_text() {
        let mut store = history();
        let mut rec = started(&mut store);
        rec.on_token("Partial", 0);
        let report = rec.finish(&mut store, Some("Complete line.")).unwrap();
        assert_eq!(report.tail_len, 1);
        assert!(!rec.is_active());
        assert_eq!(rec.next_deadline(), None);
        assert_eq!(store.streaming_boundary(), None);
        assert_eq!(store.frames()[2].text, "Complete line.");
    }

    #[test]
    fn open_angle_bracket_is_held_back_until_the_final_pass() {
        let mut store = history();
        let mut rec = started(&mut store);
        rec.on_token("Keep a<b in mind", 0);
        rec.reconcile_buffer(&mut store).unwrap();
        assert_eq!(store.frames()[2].text, "Keep a");

        rec.finish(&mut store, None).unwrap();
        assert_eq!(store.frames()[2].text, "Keep a<b in mind");
    }

    #[test]
    fn shrinking_final_pass_is_reported() {
        let mut store = history();
        let mut rec = started(&mut store);
        rec.on_token("A\nB\nC", 0);
        rec.reconcile_buffer(&mut store).unwrap();
        let report = rec.finish(&mut store, Some("A B C")).unwrap();
        assert!(report.shrank());
        assert_eq!(report.previous_tail_len, 3);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn vanished_history_is_an_error_not_a_panic() {
        let mut store = history();
        let mut rec = started(&mut store);
        store.replace_all(Vec::new());
        rec.on_token("text", 0);
        assert_eq!(
            rec.reconcile_buffer(&mut store),
            Err(ReconcileError::BoundaryOutOfRange { boundary: 2, len: 0 })
        );
    }

    #[test]
    fn tokens_without_session_are_ignored() {
        let mut store = history();
        let mut rec = StreamReconciler::new(16);
        rec.on_token("stray", 0);
        assert_eq!(rec.next_deadline(), None);
        assert_eq!(rec.finish(&mut store, None), Err(ReconcileError::NoSession));
    }
}
