use tracing::{debug, warn};

use crate::model::frame::{Frame, ImageRef};
use crate::model::snapshot::{PlaylistSnapshot, SessionBootstrap};

/// Authoritative ordered frames plus the reader's position in them.
///
/// Never empty: when there is nothing to show, a single placeholder frame
/// stands in and is reported as such by [`PlaylistStore::is_placeholder`].
#[derive(Debug, Clone)]
pub struct PlaylistStore {
    frames: Vec<Frame>,
    current_index: usize,
    high_water_index: usize,
    streaming_boundary: Option<usize>,
    placeholder: bool,
    session_background: ImageRef,
}

impl PlaylistStore {
    pub fn new(session_background: ImageRef) -> Self {
        Self {
            frames: vec![Frame::placeholder(session_background.clone(), 0)],
            current_index: 0,
            high_water_index: 0,
            streaming_boundary: None,
            placeholder: true,
            session_background,
        }
    }

    /// Build the playlist for a freshly loaded conversation, acting on the
    /// bootstrap instruction exactly once.
    pub fn open(frames: Vec<Frame>, session_background: ImageRef, bootstrap: SessionBootstrap) -> Self {
        let mut store = Self::new(session_background);

        match bootstrap {
            SessionBootstrap::NewGame => {
                store.replace_all(frames);
                store.current_index = 0;
            }
            SessionBootstrap::Resume { saved_index } => {
                store.replace_all(frames);
                let last = store.last_index();
                store.current_index = saved_index.unwrap_or(last).min(last);
            }
            SessionBootstrap::Restore(snapshot) => {
                if snapshot.frames.is_empty() {
                    warn!("restored snapshot has no frames, using parsed transcript");
                    store.replace_all(frames);
                } else {
                    store.replace_all(snapshot.frames);
                }
                let last = store.last_index();
                store.current_index = snapshot.current_index.min(last);
                store.high_water_index = snapshot.high_water_index.min(last);
            }
        }

        store.high_water_index = store.high_water_index.max(store.current_index);
        debug!(
            frames = store.frames.len(),
            current = store.current_index,
            "playlist opened"
        );
        store
    }

    pub fn replace_all(&mut self, frames: Vec<Frame>) {
        self.frames = frames;
        self.placeholder = false;
        self.ensure_not_empty();
        self.clamp_indices();
    }

    /// Keep `frames[..from]`, replace everything after with `frames`.
    pub fn replace_tail(&mut self, from: usize, frames: Vec<Frame>) {
        let from = from.min(self.authored_len());
        if self.placeholder {
            self.frames.clear();
            self.placeholder = false;
        }
        self.frames.truncate(from);
        self.frames.extend(frames);
        self.ensure_not_empty();
        self.clamp_indices();
    }

    fn ensure_not_empty(&mut self) {
        if self.frames.is_empty() {
            self.frames
                .push(Frame::placeholder(self.session_background.clone(), 0));
            self.placeholder = true;
        }
    }

    fn clamp_indices(&mut self) {
        let last = self.last_index();
        self.current_index = self.current_index.min(last);
        self.high_water_index = self.high_water_index.max(self.current_index);
    }

    pub fn current_frame(&self) -> &Frame {
        &self.frames[self.current_index]
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Frames that came from real content; zero while only the placeholder
    /// is showing.
    pub fn authored_len(&self) -> usize {
        if self.placeholder {
            0
        } else {
            self.frames.len()
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn last_index(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    pub fn is_at_end(&self) -> bool {
        self.current_index == self.last_index()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Set the position, clamped into range. Also raises the high-water mark.
    pub fn set_current_index(&mut self, index: usize) {
        self.current_index = index.min(self.last_index());
        self.high_water_index = self.high_water_index.max(self.current_index);
    }

    pub fn high_water_index(&self) -> usize {
        self.high_water_index
    }

    pub fn raise_high_water(&mut self, index: usize) {
        self.high_water_index = self.high_water_index.max(index.min(self.last_index()));
    }

    pub fn streaming_boundary(&self) -> Option<usize> {
        self.streaming_boundary
    }

    pub fn set_streaming_boundary(&mut self, boundary: Option<usize>) {
        self.streaming_boundary = boundary;
    }

    pub fn session_background(&self) -> &ImageRef {
        &self.session_background
    }

    /// Frames the reader has already seen, for the history view.
    pub fn seen_frames(&self) -> &[Frame] {
        &self.frames[..=self.high_water_index.min(self.last_index())]
    }

    pub fn snapshot(&self) -> PlaylistSnapshot {
        PlaylistSnapshot {
            frames: if self.placeholder {
                Vec::new()
            } else {
                self.frames.clone()
            },
            current_index: self.current_index,
            high_water_index: self.high_water_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str, message: usize) -> Frame {
        Frame {
            text: text.to_string(),
            speaker_name: None,
            is_user: false,
            background: ImageRef::new("bg.png"),
            source_message_index: message,
        }
    }

    fn three() -> Vec<Frame> {
        vec![frame("a", 0), frame("b", 0), frame("c", 1)]
    }

    #[test]
    fn empty_playlist_holds_placeholder() {
        let store = PlaylistStore::open(Vec::new(), ImageRef::new("avatar.png"), SessionBootstrap::NewGame);
        assert_eq!(store.len(), 1);
        assert!(store.is_placeholder());
        assert_eq!(store.authored_len(), 0);
        assert_eq!(store.current_frame().text, Frame::PLACEHOLDER_TEXT);
        assert_eq!(store.current_frame().background.as_str(), "avatar.png");
        assert!(store.snapshot().frames.is_empty());
    }

    #[test]
    fn resume_defaults_to_last_frame_and_clamps_saved_index() {
        let bg = ImageRef::new("bg.png");
        let store = PlaylistStore::open(three(), bg.clone(), SessionBootstrap::Resume { saved_index: None });
        assert_eq!(store.current_index(), 2);

        let store = PlaylistStore::open(three(), bg.clone(), SessionBootstrap::Resume { saved_index: Some(1) });
        assert_eq!(store.current_index(), 1);

        let store = PlaylistStore::open(three(), bg, SessionBootstrap::Resume { saved_index: Some(40) });
        assert_eq!(store.current_index(), 2);
    }

    #[test]
    fn new_game_starts_at_zero() {
        let store = PlaylistStore::open(three(), ImageRef::new("bg.png"), SessionBootstrap::NewGame);
        assert_eq!(store.current_index(), 0);
        assert_eq!(store.high_water_index(), 0);
    }

    #[test]
    fn restore_prefers_snapshot_frames() {
        let snapshot = PlaylistSnapshot {
            frames: vec![frame("saved", 0), frame("saved 2", 0)],
            current_index: 5,
            high_water_index: 9,
        };
        let store = PlaylistStore::open(three(), ImageRef::new("bg.png"), SessionBootstrap::Restore(snapshot));
        assert_eq!(store.len(), 2);
        assert_eq!(store.current_frame().text, "saved 2");
        assert_eq!(store.high_water_index(), 1);
    }

    #[test]
    fn restore_without_frames_falls_back_to_transcript() {
        let snapshot = PlaylistSnapshot {
            frames: Vec::new(),
            current_index: 1,
            high_water_index: 1,
        };
        let store = PlaylistStore::open(three(), ImageRef::new("bg.png"), SessionBootstrap::Restore(snapshot));
        assert_eq!(store.len(), 3);
        assert_eq!(store.current_index(), 1);
    }

    #[test]
    fn replace_tail_keeps_head_and_clamps() {
        let mut store = PlaylistStore::open(three(), ImageRef::new("bg.png"), SessionBootstrap::Resume { saved_index: None });
        store.replace_tail(1, vec![frame("x", 2)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.frames()[0].text, "a");
        assert_eq!(store.frames()[1].text, "x");
        assert_eq!(store.current_index(), 1);
        assert_eq!(store.high_water_index(), 2);
    }

    #[test]
    fn replace_tail_over_placeholder_drops_it() {
        let mut store = PlaylistStore::new(ImageRef::new("bg.png"));
        store.replace_tail(0, vec![frame("first", 0)]);
        assert!(!store.is_placeholder());
        assert_eq!(store.len(), 1);
        assert_eq!(store.current_frame().text, "first");
    }

    #[test]
    fn set_current_index_clamps_and_raises_high_water() {
        let mut store = PlaylistStore::open(three(), ImageRef::new("bg.png"), SessionBootstrap::NewGame);
        store.set_current_index(99);
        assert_eq!(store.current_index(), 2);
        assert_eq!(store.high_water_index(), 2);
        store.set_current_index(0);
        assert_eq!(store.high_water_index(), 2);
        assert_eq!(store.seen_frames().len(), 3);
    }
}
