//! The single-threaded heart of the player.
//!
//! `Session` owns every piece of playback state and never blocks or
//! sleeps. The engine thread feeds it commands and timer wake-ups and
//! carries out the [`Effect`]s it asks for.

use tracing::{debug, info, warn};

use crate::engine::choice_detector::detect_choices;
use crate::engine::narrative_parser::{parse_message, parse_transcript};
use crate::engine::navigation::{NavOutcome, NavigationController};
use crate::engine::playlist::PlaylistStore;
use crate::engine::poller::{FallbackPoller, GenerationProbe, PollAction};
use crate::engine::protocol::{EngineCommand, EngineResponse, FrameView, GenerationId};
use crate::engine::stream::StreamReconciler;
use crate::engine::typewriter::{FrameKey, TickOutcome, TypewriterAnimator, TypewriterConfig};
use crate::model::choice::Choice;
use crate::model::frame::ImageRef;
use crate::model::game_save::{SaveSlot, SAVE_VERSION};
use crate::model::snapshot::SessionBootstrap;
use crate::model::transcript::{Transcript, TranscriptMessage};

const PREVIEW_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub typewriter: TypewriterConfig,
    pub refresh_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_idle_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            typewriter: TypewriterConfig::default(),
            refresh_interval_ms: 16,
            poll_interval_ms: 500,
            poll_idle_limit: 5,
        }
    }
}

/// Work the session cannot do itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Ask the content source for the next character message. Its events
    /// must carry `generation`.
    Generate {
        generation: GenerationId,
        transcript: Transcript,
    },
    StopGeneration {
        generation: GenerationId,
    },
    StoreProgress { character: String, index: usize },
}

#[derive(Debug, Default)]
pub struct Output {
    pub responses: Vec<EngineResponse>,
    pub effects: Vec<Effect>,
}

impl Output {
    fn respond(&mut self, response: EngineResponse) {
        self.responses.push(response);
    }

    fn effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty() && self.effects.is_empty()
    }

    /// The most recent view, if this output carries one.
    pub fn last_view(&self) -> Option<&FrameView> {
        self.responses.iter().rev().find_map(|r| match r {
            EngineResponse::View(view) => Some(view),
            _ => None,
        })
    }
}

struct Polling {
    poller: FallbackPoller,
    probe: Box<dyn GenerationProbe>,
}

pub struct Session {
    config: SessionConfig,
    transcript: Transcript,
    store: PlaylistStore,
    reconciler: StreamReconciler,
    animator: TypewriterAnimator,
    polling: Option<Polling>,
    busy: bool,
    /// Last id handed out; ids are never reused within a session.
    last_generation: GenerationId,
    /// The request whose events are currently accepted.
    active_generation: Option<GenerationId>,
    choices: Vec<Choice>,
    end_reached: bool,
    reported_index: Option<usize>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            transcript: Transcript::default(),
            store: PlaylistStore::new(ImageRef::placeholder()),
            reconciler: StreamReconciler::new(config.refresh_interval_ms),
            animator: TypewriterAnimator::new(config.typewriter),
            polling: None,
            busy: false,
            last_generation: 0,
            active_generation: None,
            choices: Vec::new(),
            end_reached: false,
            reported_index: None,
        }
    }

    pub fn store(&self) -> &PlaylistStore {
        &self.store
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn is_streaming(&self) -> bool {
        self.reconciler.is_active()
    }

    /// Earliest time `on_timer` has work to do.
    pub fn next_deadline(&self) -> Option<u64> {
        [
            self.animator.next_deadline(),
            self.reconciler.next_deadline(),
            self.polling.as_ref().map(|p| p.poller.next_deadline()),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn handle(&mut self, command: EngineCommand, now_ms: u64) -> Output {
        let mut out = Output::default();

        match command {
            EngineCommand::LoadTranscript {
                transcript,
                bootstrap,
            } => self.load(transcript, bootstrap, now_ms, &mut out),

            EngineCommand::GenerationStarted(generation) => {
                if self.is_current(generation) {
                    self.begin_stream(&mut out);
                }
            }
            EngineCommand::TokenReceived { generation, delta } => {
                if self.is_current(generation) {
                    self.reconciler.on_token(&delta, now_ms);
                }
            }
            EngineCommand::GenerationEnded {
                generation,
                final_text,
            } => {
                if self.is_current(generation) {
                    self.finish_stream(final_text.as_deref(), now_ms, &mut out);
                }
            }
            EngineCommand::GenerationStopped(generation) => {
                if self.is_current(generation) {
                    self.finish_stream(None, now_ms, &mut out);
                }
            }
            EngineCommand::GenerationFailed { generation, error } => {
                if self.is_current(generation) {
                    warn!(generation, %error, "generation failed");
                    out.respond(EngineResponse::Notice(format!("Generation failed: {error}")));
                    self.finish_stream(None, now_ms, &mut out);
                }
            }
            EngineCommand::StartPolling { generation, probe } => {
                if self.is_current(generation) {
                    self.begin_stream(&mut out);
                    self.polling = Some(Polling {
                        poller: FallbackPoller::new(
                            self.config.poll_interval_ms,
                            self.config.poll_idle_limit,
                            now_ms,
                        ),
                        probe,
                    });
                }
            }

            EngineCommand::Advance => {
                if self.animator.is_revealing() {
                    self.skip(&mut out);
                } else {
                    self.navigate(now_ms, &mut out, |nav| nav.next());
                }
            }
            EngineCommand::Next => self.navigate(now_ms, &mut out, |nav| nav.next()),
            EngineCommand::Prev => self.navigate(now_ms, &mut out, |nav| nav.prev()),
            EngineCommand::JumpTo(index) => {
                self.navigate(now_ms, &mut out, move |nav| nav.jump_to(index))
            }
            EngineCommand::Restart => self.navigate(now_ms, &mut out, |nav| nav.restart()),
            EngineCommand::Skip => self.skip(&mut out),

            EngineCommand::SubmitPlayerInput(text) => self.submit(&text, now_ms, &mut out),
            EngineCommand::SelectChoice(choice) => self.submit(&choice.text, now_ms, &mut out),
            EngineCommand::ContinueStory => {
                self.request_generation(&mut out);
                self.emit_view(&mut out);
            }
            EngineCommand::StopGeneration => {
                if let Some(generation) = self.active_generation {
                    out.effect(Effect::StopGeneration { generation });
                }
            }

            EngineCommand::UpdateTypewriter(config) => {
                self.config.typewriter = config;
                self.animator.set_config(config);
                if !config.enabled && self.animator.is_revealing() {
                    self.skip(&mut out);
                }
            }
            EngineCommand::RequestHistory => out.respond(EngineResponse::History {
                frames: self.store.seen_frames().to_vec(),
                current: self.store.current_index(),
            }),

            EngineCommand::ListSlots
            | EngineCommand::SaveSlot(_)
            | EngineCommand::LoadSlot(_)
            | EngineCommand::DeleteSlot(_)
            | EngineCommand::Shutdown => debug!("command is handled by the engine, not the session"),
        }

        self.report_progress(&mut out);
        out
    }

    /// Run whatever has come due: poll, reconciliation pass, reveal ticks.
    pub fn on_timer(&mut self, now_ms: u64) -> Output {
        let mut out = Output::default();
        let mut changed = false;

        if let Some(polling) = self.polling.as_mut() {
            match polling.poller.poll(polling.probe.as_ref(), now_ms) {
                PollAction::Wait => {}
                PollAction::Update(text) => {
                    match self.reconciler.reconcile_snapshot(&mut self.store, &text) {
                        Ok(_) => changed = true,
                        Err(error) => warn!(%error, "polled reconciliation skipped"),
                    }
                }
                PollAction::Finalize(text) => {
                    self.finish_stream(text.as_deref(), now_ms, &mut out);
                }
            }
        }

        if let Some(result) = self.reconciler.run_due(&mut self.store, now_ms) {
            match result {
                Ok(_) => changed = true,
                Err(error) => warn!(%error, "reconciliation pass skipped"),
            }
        }

        if changed {
            self.sync_animator(now_ms);
        }

        let ticked = self.animator.tick(now_ms, &self.store.current_frame().text);
        if changed || ticked != TickOutcome::Unchanged {
            self.emit_view(&mut out);
        }

        self.report_progress(&mut out);
        out
    }

    /// Everything needed to restore this exact session later.
    pub fn save_slot(&self, saved_at: u64) -> SaveSlot {
        SaveSlot {
            version: SAVE_VERSION,
            saved_at,
            character: self.transcript.character.name.clone(),
            preview_text: self
                .store
                .current_frame()
                .text
                .chars()
                .take(PREVIEW_CHARS)
                .collect(),
            total_frames: self.store.len(),
            transcript: self.transcript.clone(),
            snapshot: self.store.snapshot(),
        }
    }

    fn load(
        &mut self,
        transcript: Transcript,
        bootstrap: SessionBootstrap,
        now_ms: u64,
        out: &mut Output,
    ) {
        self.polling = None;
        self.reconciler = StreamReconciler::new(self.config.refresh_interval_ms);
        self.busy = false;
        self.active_generation = None;
        self.reported_index = None;

        let background = transcript.session_background();
        let frames = parse_transcript(&transcript);
        self.store = PlaylistStore::open(frames, background.clone(), bootstrap);
        self.transcript = transcript;
        info!(
            character = %self.transcript.character.name,
            messages = self.transcript.messages.len(),
            frames = self.store.len(),
            "transcript loaded"
        );

        out.respond(EngineResponse::ResetBackground(background));
        out.respond(EngineResponse::Busy(false));
        self.animator.stop();
        self.sync_animator(now_ms);
        self.emit_view(out);
    }

    fn begin_stream(&mut self, out: &mut Output) {
        if self.reconciler.is_active() {
            debug!(generation = ?self.active_generation, "stream already open, ignoring repeated start");
            return;
        }

        let boundary = self.store.authored_len();
        let speaker = Some(self.transcript.character.name.clone()).filter(|n| !n.is_empty());
        let message_index = self.transcript.messages.len();
        self.reconciler
            .start(&mut self.store, boundary, speaker, message_index);

        if !self.busy {
            self.busy = true;
            out.respond(EngineResponse::Busy(true));
        }
    }

    fn finish_stream(&mut self, final_text: Option<&str>, now_ms: u64, out: &mut Output) {
        self.polling = None;
        self.active_generation = None;

        if self.reconciler.is_active() {
            let text = final_text.map(str::to_string).or_else(|| {
                self.reconciler
                    .session()
                    .map(|s| s.buffer_text().to_string())
            });

            match self.reconciler.finish(&mut self.store, final_text) {
                Ok(report) if report.shrank() => out.respond(EngineResponse::Notice(format!(
                    "Final message has {} pages, the live view had {}",
                    report.tail_len, report.previous_tail_len
                ))),
                Ok(_) => {}
                Err(error) => warn!(%error, "final pass failed, keeping last good playlist"),
            }

            if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
                let speaker = self.transcript.character.name.clone();
                self.transcript
                    .messages
                    .push(TranscriptMessage::character(speaker, text));
            }
        }

        if self.busy {
            self.busy = false;
            out.respond(EngineResponse::Busy(false));
        }
        self.sync_animator(now_ms);
        self.emit_view(out);
    }

    fn navigate(
        &mut self,
        now_ms: u64,
        out: &mut Output,
        step: impl FnOnce(&mut NavigationController<'_>) -> NavOutcome,
    ) {
        let outcome = step(&mut NavigationController::new(&mut self.store));
        if self.store.is_at_end() {
            self.reconciler.clear_more_available();
        }

        match outcome {
            NavOutcome::Unchanged => return,
            NavOutcome::Restarted => out.respond(EngineResponse::ResetBackground(
                self.store.session_background().clone(),
            )),
            NavOutcome::Moved { .. } => {}
        }

        self.animator.stop();
        self.sync_animator(now_ms);
        self.emit_view(out);
    }

    fn skip(&mut self, out: &mut Output) {
        if self.animator.skip(&self.store.current_frame().text) {
            self.emit_view(out);
        }
    }

    fn submit(&mut self, text: &str, now_ms: u64, out: &mut Output) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if self.busy || self.reconciler.is_active() {
            out.respond(EngineResponse::Notice(
                "Wait for the current reply to finish".to_string(),
            ));
            return;
        }

        let message = TranscriptMessage::user(self.transcript.user_name(), text);
        let message_index = self.transcript.messages.len();
        let background = self
            .store
            .frames()
            .last()
            .map(|f| f.background.clone())
            .unwrap_or_else(|| self.store.session_background().clone());
        let frames = parse_message(&message, message_index, &background);
        self.transcript.messages.push(message);

        let first_new = self.store.authored_len();
        self.store.replace_tail(first_new, frames);
        NavigationController::new(&mut self.store).jump_to(first_new);

        self.request_generation(out);
        self.animator.stop();
        self.sync_animator(now_ms);
        self.emit_view(out);
    }

    fn request_generation(&mut self, out: &mut Output) {
        if self.busy || self.reconciler.is_active() {
            debug!("generation already pending");
            return;
        }
        self.last_generation += 1;
        let generation = self.last_generation;
        self.active_generation = Some(generation);
        self.busy = true;
        out.respond(EngineResponse::Busy(true));
        out.effect(Effect::Generate {
            generation,
            transcript: self.transcript.clone(),
        });
    }

    fn is_current(&self, generation: GenerationId) -> bool {
        let current = self.active_generation == Some(generation);
        if !current {
            debug!(
                generation,
                active = ?self.active_generation,
                "dropping event from a stale generation"
            );
        }
        current
    }

    /// Restart the reveal if the frame on screen is a different frame.
    fn sync_animator(&mut self, now_ms: u64) {
        let frame = self.store.current_frame();
        let key = FrameKey {
            index: self.store.current_index(),
            message: frame.source_message_index,
        };
        if self.animator.key() != Some(key) {
            self.animator.start(key, &frame.text, now_ms);
        }
    }

    fn refresh_end_state(&mut self) {
        let settled = !self.animator.is_revealing()
            && self.store.is_at_end()
            && !self.reconciler.is_active()
            && !self.busy;

        if settled {
            self.choices = detect_choices(&self.store.current_frame().text);
            self.end_reached = self.choices.is_empty();
        } else {
            self.choices.clear();
            self.end_reached = false;
        }
    }

    fn emit_view(&mut self, out: &mut Output) {
        self.refresh_end_state();
        let frame = self.store.current_frame();
        out.respond(EngineResponse::View(FrameView {
            index: self.store.current_index(),
            total: self.store.len(),
            frame: frame.clone(),
            revealed: self.animator.revealed(&frame.text).to_string(),
            typing: self.animator.is_revealing(),
            streaming: self.reconciler.is_active(),
            more_available: self.reconciler.more_available(),
            end_reached: self.end_reached,
            choices: self.choices.clone(),
        }));
    }

    fn report_progress(&mut self, out: &mut Output) {
        if self.store.is_placeholder() || self.transcript.character.name.is_empty() {
            return;
        }
        let index = self.store.current_index();
        if self.reported_index != Some(index) {
            self.reported_index = Some(index);
            out.effect(Effect::StoreProgress {
                character: self.transcript.character.name.clone(),
                index,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::transcript::CharacterInfo;

    fn instant() -> SessionConfig {
        SessionConfig {
            typewriter: TypewriterConfig {
                enabled: false,
                speed_ms: 50,
            },
            ..SessionConfig::default()
        }
    }

    fn transcript(messages: Vec<TranscriptMessage>) -> Transcript {
        Transcript {
            character: CharacterInfo {
                name: "Aria".into(),
                avatar: Some(ImageRef::new("avatar.png")),
            },
            messages,
        }
    }

    /// Ask for a reply and return the id its events must carry.
    fn requested(session: &mut Session) -> GenerationId {
        let out = session.handle(EngineCommand::ContinueStory, 0);
        out.effects
            .iter()
            .find_map(|e| match e {
                Effect::Generate { generation, .. } => Some(*generation),
                _ => None,
            })
            .expect("generation requested")
    }

    fn loaded(config: SessionConfig, messages: Vec<TranscriptMessage>, bootstrap: SessionBootstrap) -> Session {
        let mut session = Session::new(config);
        session.handle(
            EngineCommand::LoadTranscript {
                transcript: transcript(messages),
                bootstrap,
            },
            0,
        );
        session
    }

    #[test]
    fn load_resets_background_and_shows_last_frame() {
        let mut session = Session::new(instant());
        let out = session.handle(
            EngineCommand::LoadTranscript {
                transcript: transcript(vec![TranscriptMessage::character("Aria", "One\nTwo")]),
                bootstrap: SessionBootstrap::default(),
            },
            0,
        );
        assert_eq!(
            out.responses[0],
            EngineResponse::ResetBackground(ImageRef::new("avatar.png"))
        );
        let view = out.last_view().unwrap();
        assert_eq!(view.index, 1);
        assert_eq!(view.total, 2);
        assert_eq!(view.revealed, "Two");
        assert!(view.end_reached);
        assert!(out.effects.contains(&Effect::StoreProgress {
            character: "Aria".into(),
            index: 1
        }));
    }

    #[test]
    fn advance_skips_before_moving_on() {
        let config = SessionConfig {
            typewriter: TypewriterConfig {
                enabled: true,
                speed_ms: 50,
            },
            ..SessionConfig::default()
        };
        let mut session = loaded(
            config,
            vec![TranscriptMessage::character("Aria", "Hello\nAgain")],
            SessionBootstrap::NewGame,
        );
        assert_eq!(session.next_deadline(), Some(50));

        let out = session.handle(EngineCommand::Advance, 10);
        let view = out.last_view().unwrap();
        assert_eq!((view.index, view.revealed.as_str(), view.typing), (0, "Hello", false));

        let out = session.handle(EngineCommand::Advance, 20);
        let view = out.last_view().unwrap();
        assert_eq!((view.index, view.revealed.as_str(), view.typing), (1, "A", true));
    }

    #[test]
    fn timer_ticks_reveal_text() {
        let config = SessionConfig {
            typewriter: TypewriterConfig {
                enabled: true,
                speed_ms: 10,
            },
            ..SessionConfig::default()
        };
        let mut session = loaded(
            config,
            vec![TranscriptMessage::character("Aria", "Hey")],
            SessionBootstrap::NewGame,
        );
        assert_eq!(session.on_timer(10).last_view().unwrap().revealed, "He");
        assert!(session.on_timer(15).is_empty());
        let view = session.on_timer(30).last_view().cloned().unwrap();
        assert_eq!(view.revealed, "Hey");
        assert!(!view.typing);
        assert!(view.end_reached);
    }

    #[test]
    fn restart_resets_background() {
        let mut session = loaded(
            instant(),
            vec![TranscriptMessage::character("Aria", "<img src=\"hall.png\">One\nTwo")],
            SessionBootstrap::default(),
        );
        let out = session.handle(EngineCommand::Restart, 0);
        assert!(out
            .responses
            .contains(&EngineResponse::ResetBackground(ImageRef::new("avatar.png"))));
        assert_eq!(out.last_view().unwrap().index, 0);
        assert_eq!(session.store().high_water_index(), 1);
    }

    #[test]
    fn streamed_reply_is_reconciled_and_recorded() {
        let mut session = loaded(
            instant(),
            vec![TranscriptMessage::character("Aria", "Hi.")],
            SessionBootstrap::default(),
        );
        let generation = requested(&mut session);
        session.handle(EngineCommand::GenerationStarted(generation), 0);
        assert!(session.is_streaming());

        session.handle(
            EngineCommand::TokenReceived {
                generation,
                delta: "How are".into(),
            },
            100,
        );
        session.handle(
            EngineCommand::TokenReceived {
                generation,
                delta: " you?".into(),
            },
            105,
        );
        assert_eq!(session.next_deadline(), Some(116));

        let out = session.on_timer(116);
        let view = out.last_view().unwrap();
        assert!(view.streaming);
        assert_eq!(view.total, 2);
        assert!(!view.end_reached);

        let out = session.handle(
            EngineCommand::GenerationEnded {
                generation,
                final_text: Some("How are you?\n「Fine」「Tired」".into()),
            },
            120,
        );
        assert!(out.responses.contains(&EngineResponse::Busy(false)));
        assert_eq!(session.store().len(), 3);
        assert_eq!(session.transcript().messages.len(), 2);
        assert!(!session.is_streaming());
        assert_eq!(session.next_deadline(), None);
    }

    #[test]
    fn choice_selection_submits_player_message() {
        let mut session = loaded(
            instant(),
            vec![TranscriptMessage::character("Aria", "Where to?\n「North」「South」")],
            SessionBootstrap::default(),
        );
        let out = session.handle(EngineCommand::Next, 0);
        assert!(out.is_empty() || out.last_view().is_none());

        let view = session.handle(EngineCommand::RequestHistory, 0);
        assert!(matches!(view.responses[0], EngineResponse::History { current: 1, .. }));

        let out = session.handle(
            EngineCommand::SelectChoice(Choice {
                id: 2,
                text: "South".into(),
            }),
            0,
        );
        let view = out.last_view().unwrap();
        assert_eq!(view.frame.text, "South");
        assert!(view.frame.is_user);
        assert!(out
            .effects
            .iter()
            .any(|e| matches!(e, Effect::Generate { transcript, .. } if transcript.messages.len() == 2)));
        assert!(session.is_busy());

        let out = session.handle(EngineCommand::SubmitPlayerInput("again".into()), 0);
        assert!(matches!(out.responses[0], EngineResponse::Notice(_)));
    }

    #[test]
    fn end_of_playlist_offers_choices() {
        let session_out = {
            let mut session = Session::new(instant());
            session.handle(
                EngineCommand::LoadTranscript {
                    transcript: transcript(vec![TranscriptMessage::character(
                        "Aria",
                        "Pick one 「Tea」「Coffee」",
                    )]),
                    bootstrap: SessionBootstrap::default(),
                },
                0,
            )
        };
        let view = session_out.last_view().unwrap();
        assert_eq!(view.choices.len(), 2);
        assert!(!view.end_reached);
    }

    struct Finished(&'static str);

    impl GenerationProbe for Finished {
        fn is_generating(&self) -> bool {
            false
        }

        fn current_text(&self) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[test]
    fn polling_path_finalizes_from_probe() {
        let mut session = loaded(
            instant(),
            vec![TranscriptMessage::character("Aria", "Hi.")],
            SessionBootstrap::default(),
        );
        let generation = requested(&mut session);
        session.handle(
            EngineCommand::StartPolling {
                generation,
                probe: Box::new(Finished("Done now.")),
            },
            0,
        );
        assert_eq!(session.next_deadline(), Some(500));
        assert!(session.on_timer(499).is_empty());

        let out = session.on_timer(500);
        assert!(out.responses.contains(&EngineResponse::Busy(false)));
        assert_eq!(session.store().frames().last().unwrap().text, "Done now.");
        assert!(!session.is_streaming());
    }

    #[test]
    fn failure_keeps_partial_text() {
        let mut session = loaded(
            instant(),
            vec![TranscriptMessage::character("Aria", "Hi.")],
            SessionBootstrap::default(),
        );
        let generation = requested(&mut session);
        session.handle(EngineCommand::GenerationStarted(generation), 0);
        session.handle(
            EngineCommand::TokenReceived {
                generation,
                delta: "Half a".into(),
            },
            0,
        );
        let out = session.handle(
            EngineCommand::GenerationFailed {
                generation,
                error: "timeout".into(),
            },
            5,
        );
        assert!(matches!(&out.responses[0], EngineResponse::Notice(n) if n.contains("timeout")));
        assert_eq!(session.store().frames().last().unwrap().text, "Half a");
        assert!(!session.is_busy());
    }

    #[test]
    fn events_from_before_a_reload_are_dropped() {
        let mut session = loaded(
            instant(),
            vec![TranscriptMessage::character("Aria", "Hi.")],
            SessionBootstrap::default(),
        );
        let old = requested(&mut session);
        session.handle(EngineCommand::GenerationStarted(old), 0);
        session.handle(
            EngineCommand::TokenReceived {
                generation: old,
                delta: "Half a".into(),
            },
            0,
        );

        let mut bob = transcript(vec![TranscriptMessage::character("Bob", "Yo.")]);
        bob.character.name = "Bob".into();
        session.handle(
            EngineCommand::LoadTranscript {
                transcript: bob,
                bootstrap: SessionBootstrap::default(),
            },
            10,
        );

        let token = session.handle(
            EngineCommand::TokenReceived {
                generation: old,
                delta: " stale tail".into(),
            },
            20,
        );
        let stop = session.handle(EngineCommand::GenerationStopped(old), 30);
        assert!(token.responses.is_empty() && stop.responses.is_empty());
        assert!(!session.is_streaming());
        assert!(!session.is_busy());
        assert_eq!(session.transcript().messages.len(), 1);
        assert_eq!(session.store().len(), 1);
        assert_eq!(session.store().frames()[0].text, "Yo.");
    }

    #[test]
    fn stale_stop_does_not_end_a_newer_stream() {
        let mut session = loaded(
            instant(),
            vec![TranscriptMessage::character("Aria", "Hi.")],
            SessionBootstrap::default(),
        );
        let first = requested(&mut session);
        session.handle(EngineCommand::GenerationStopped(first), 0);
        assert!(!session.is_busy());

        let second = requested(&mut session);
        assert!(second > first);
        session.handle(EngineCommand::GenerationStarted(second), 0);
        session.handle(
            EngineCommand::GenerationFailed {
                generation: first,
                error: "late".into(),
            },
            5,
        );
        assert!(session.is_streaming());
        assert!(session.is_busy());

        let out = session.handle(EngineCommand::StopGeneration, 6);
        assert_eq!(out.effects, vec![Effect::StopGeneration { generation: second }]);
    }

    #[test]
    fn bare_token_does_not_open_a_stream() {
        let mut session = loaded(
            instant(),
            vec![TranscriptMessage::character("Aria", "Hi.")],
            SessionBootstrap::default(),
        );
        let out = session.handle(
            EngineCommand::TokenReceived {
                generation: 1,
                delta: "orphan".into(),
            },
            0,
        );
        assert!(out.is_empty());
        assert!(!session.is_streaming());
        assert_eq!(session.next_deadline(), None);
    }
}
