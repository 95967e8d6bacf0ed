use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gal_player::engine::clock::ManualClock;
use gal_player::engine::engine::{Engine, EngineConfig};
use gal_player::engine::llm_client::LlmConfig;
use gal_player::engine::protocol::{EngineCommand, EngineResponse, FrameView};
use gal_player::engine::save_store::SaveStore;
use gal_player::engine::session::SessionConfig;
use gal_player::engine::typewriter::TypewriterConfig;
use gal_player::model::frame::ImageRef;
use gal_player::model::snapshot::SessionBootstrap;
use gal_player::model::transcript::{CharacterInfo, Transcript, TranscriptMessage};

const WAIT: Duration = Duration::from_secs(10);

struct Harness {
    tx: Sender<EngineCommand>,
    rx: Receiver<EngineResponse>,
    clock: ManualClock,
    handle: JoinHandle<()>,
}

impl Harness {
    fn spawn(save_dir: &std::path::Path) -> Self {
        Self::spawn_with(save_dir, false, LlmConfig::default())
    }

    fn spawn_with(save_dir: &std::path::Path, typewriter: bool, llm: LlmConfig) -> Self {
        let (tx, cmd_rx) = mpsc::channel();
        let (resp_tx, rx) = mpsc::channel();
        let config = EngineConfig {
            session: SessionConfig {
                typewriter: TypewriterConfig {
                    enabled: typewriter,
                    speed_ms: 30,
                },
                ..SessionConfig::default()
            },
            llm,
            saves: SaveStore::new(save_dir),
        };
        let clock = ManualClock::new(0);
        let engine_clock = clock.clone();
        let worker_tx = tx.clone();
        let handle = thread::spawn(move || {
            Engine::new(cmd_rx, worker_tx, resp_tx, config)
                .with_clock(Box::new(engine_clock))
                .run();
        });
        Self {
            tx,
            rx,
            clock,
            handle,
        }
    }

    fn send(&self, command: EngineCommand) {
        self.tx.send(command).unwrap();
    }

    /// Collect responses until one matches, returning it.
    fn wait_for(&self, mut matches: impl FnMut(&EngineResponse) -> bool) -> EngineResponse {
        loop {
            let response = self.rx.recv_timeout(WAIT).expect("engine went quiet");
            if matches(&response) {
                return response;
            }
        }
    }

    fn view(&self) -> FrameView {
        match self.wait_for(|r| matches!(r, EngineResponse::View(_))) {
            EngineResponse::View(view) => view,
            _ => unreachable!(),
        }
    }

    fn shutdown(self) {
        self.send(EngineCommand::Shutdown);
        self.handle.join().unwrap();
    }
}

fn story() -> Transcript {
    Transcript {
        character: CharacterInfo {
            name: "Aria".into(),
            avatar: Some(ImageRef::new("aria.png")),
        },
        messages: vec![
            TranscriptMessage::character("Aria", "Morning.\nThe hall is empty."),
            TranscriptMessage::user("You", "Where is everyone?"),
        ],
    }
}

#[test]
fn save_restart_and_load_round_trip_through_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Harness::spawn(dir.path());

    engine.send(EngineCommand::LoadTranscript {
        transcript: story(),
        bootstrap: SessionBootstrap::NewGame,
    });
    assert_eq!(
        engine.wait_for(|r| matches!(r, EngineResponse::ResetBackground(_))),
        EngineResponse::ResetBackground(ImageRef::new("aria.png"))
    );
    let view = engine.view();
    assert_eq!((view.index, view.total), (0, 3));
    assert_eq!(view.frame.text, "Morning.");

    engine.send(EngineCommand::Next);
    assert_eq!(engine.view().index, 1);

    engine.send(EngineCommand::SaveSlot(1));
    match engine.wait_for(|r| matches!(r, EngineResponse::Slots(_))) {
        EngineResponse::Slots(slots) => {
            assert_eq!(slots.len(), 5);
            let first = slots[0].as_ref().expect("slot 1 filled");
            assert_eq!(first.character, "Aria");
            assert_eq!(first.position, 1);
            assert_eq!(first.preview_text, "The hall is empty.");
            assert!(slots[1..].iter().all(Option::is_none));
        }
        _ => unreachable!(),
    }

    engine.send(EngineCommand::Restart);
    assert_eq!(engine.view().index, 0);

    engine.send(EngineCommand::LoadSlot(1));
    let view = engine.view();
    assert_eq!((view.index, view.total), (1, 3));
    assert_eq!(
        engine.wait_for(|r| matches!(r, EngineResponse::Notice(_))),
        EngineResponse::Notice("Loaded slot 1".into())
    );

    engine.send(EngineCommand::LoadSlot(4));
    match engine.wait_for(|r| matches!(r, EngineResponse::Notice(_))) {
        EngineResponse::Notice(text) => assert!(text.starts_with("Load failed")),
        _ => unreachable!(),
    }

    engine.shutdown();
}

#[test]
fn reopening_resumes_at_recorded_progress() {
    let dir = tempfile::tempdir().unwrap();

    let first = Harness::spawn(dir.path());
    first.send(EngineCommand::LoadTranscript {
        transcript: story(),
        bootstrap: SessionBootstrap::NewGame,
    });
    assert_eq!(first.view().index, 0);
    first.send(EngineCommand::Next);
    assert_eq!(first.view().index, 1);
    first.shutdown();

    let second = Harness::spawn(dir.path());
    second.send(EngineCommand::LoadTranscript {
        transcript: story(),
        bootstrap: SessionBootstrap::default(),
    });
    let view = second.view();
    assert_eq!(view.index, 1);
    assert_eq!(view.total, 3);
    second.shutdown();
}

#[test]
fn reveal_advances_only_with_the_engine_clock() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Harness::spawn_with(dir.path(), true, LlmConfig::default());

    engine.send(EngineCommand::LoadTranscript {
        transcript: story(),
        bootstrap: SessionBootstrap::NewGame,
    });
    let view = engine.view();
    assert_eq!(view.revealed, "M");
    assert!(view.typing);

    // Two reveal intervals pass at once.
    engine.clock.advance(60);
    let view = engine.view();
    assert_eq!(view.revealed, "Mor");
    assert!(view.typing);

    engine.send(EngineCommand::Skip);
    let view = engine.view();
    assert_eq!(view.revealed, "Morning.");
    assert!(!view.typing);

    engine.shutdown();
}

#[test]
fn failed_request_clears_busy_and_later_stray_events_change_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let llm = LlmConfig {
        endpoint: "http://127.0.0.1:1/v1".into(),
        ..LlmConfig::default()
    };
    let engine = Harness::spawn_with(dir.path(), false, llm);

    engine.send(EngineCommand::LoadTranscript {
        transcript: story(),
        bootstrap: SessionBootstrap::NewGame,
    });
    assert_eq!(engine.view().total, 3);

    engine.send(EngineCommand::ContinueStory);
    assert_eq!(
        engine.wait_for(|r| matches!(r, EngineResponse::Busy(_))),
        EngineResponse::Busy(true)
    );
    match engine.wait_for(|r| matches!(r, EngineResponse::Notice(_))) {
        EngineResponse::Notice(text) => assert!(text.starts_with("Generation failed")),
        _ => unreachable!(),
    }
    assert_eq!(
        engine.wait_for(|r| matches!(r, EngineResponse::Busy(_))),
        EngineResponse::Busy(false)
    );
    assert_eq!(engine.view().total, 3);

    // Leftovers from the failed request arrive late.
    engine.send(EngineCommand::TokenReceived {
        generation: 1,
        delta: "ghost".into(),
    });
    engine.send(EngineCommand::GenerationStopped(1));
    engine.send(EngineCommand::RequestHistory);
    match engine.rx.recv_timeout(WAIT).expect("history reply") {
        EngineResponse::History { frames, current } => {
            assert_eq!(current, 0);
            assert_eq!(frames.len(), 1);
        }
        other => panic!("stray events produced {other:?}"),
    }

    engine.shutdown();
}
