use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::engine::clock::{Clock, MonotonicClock};
use crate::engine::llm_client::{CompletionSlot, LlmClient, LlmConfig};
use crate::engine::prompt_builder::PromptBuilder;
use crate::engine::protocol::{EngineCommand, EngineResponse, GenerationId};
use crate::engine::save_store::SaveStore;
use crate::engine::session::{Effect, Output, Session, SessionConfig};
use crate::model::snapshot::SessionBootstrap;
use crate::model::transcript::Transcript;

pub struct EngineConfig {
    pub session: SessionConfig,
    pub llm: LlmConfig,
    pub saves: SaveStore,
}

/// Drives a [`Session`] on its own thread: commands in, responses out,
/// side effects (generation, saves, progress) carried out here.
pub struct Engine {
    rx: Receiver<EngineCommand>,
    /// Handed to generation workers so their events join the same queue.
    cmd_tx: Sender<EngineCommand>,
    tx: Sender<EngineResponse>,
    session: Session,
    clock: Box<dyn Clock>,
    saves: SaveStore,
    llm: LlmConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl Engine {
    pub fn new(
        rx: Receiver<EngineCommand>,
        cmd_tx: Sender<EngineCommand>,
        tx: Sender<EngineResponse>,
        config: EngineConfig,
    ) -> Self {
        Self {
            rx,
            cmd_tx,
            tx,
            session: Session::new(config.session),
            clock: Box::new(MonotonicClock::new()),
            saves: config.saves,
            llm: config.llm,
            cancel: None,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn run(&mut self) {
        info!("engine started");
        loop {
            let received = match self.session.next_deadline() {
                Some(deadline) => {
                    let wait = deadline.saturating_sub(self.clock.now_ms());
                    self.rx.recv_timeout(Duration::from_millis(wait))
                }
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(EngineCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.dispatch(command),
                Err(RecvTimeoutError::Timeout) => {}
            }

            let output = self.session.on_timer(self.clock.now_ms());
            self.perform(output);
        }

        if let Some(cancel) = self.cancel.take() {
            cancel.store(true, Ordering::SeqCst);
        }
        info!("engine stopped");
    }

    fn dispatch(&mut self, command: EngineCommand) {
        let now = self.clock.now_ms();
        match command {
            EngineCommand::LoadTranscript {
                transcript,
                bootstrap,
            } => {
                let bootstrap = match bootstrap {
                    SessionBootstrap::Resume { saved_index: None } => SessionBootstrap::Resume {
                        saved_index: self.saves.progress(&transcript.character.name),
                    },
                    other => other,
                };
                self.open(transcript, bootstrap);
            }

            EngineCommand::ListSlots => self.send(EngineResponse::Slots(self.saves.list())),
            EngineCommand::SaveSlot(slot) => {
                let data = self.session.save_slot(unix_now());
                match self.saves.save(slot, &data) {
                    Ok(()) => self.send(EngineResponse::Notice(format!("Saved to slot {slot}"))),
                    Err(error) => {
                        warn!(slot, %error, "save failed");
                        self.send(EngineResponse::Notice(format!("Save failed: {error}")));
                    }
                }
                self.send(EngineResponse::Slots(self.saves.list()));
            }
            EngineCommand::LoadSlot(slot) => match self.saves.load(slot) {
                Ok(data) => {
                    self.open(data.transcript, SessionBootstrap::Restore(data.snapshot));
                    self.send(EngineResponse::Notice(format!("Loaded slot {slot}")));
                }
                Err(error) => {
                    warn!(slot, %error, "load failed");
                    self.send(EngineResponse::Notice(format!("Load failed: {error}")));
                }
            },
            EngineCommand::DeleteSlot(slot) => {
                if let Err(error) = self.saves.delete(slot) {
                    warn!(slot, %error, "delete failed");
                    self.send(EngineResponse::Notice(format!("Delete failed: {error}")));
                }
                self.send(EngineResponse::Slots(self.saves.list()));
            }

            other => {
                let output = self.session.handle(other, now);
                self.perform(output);
            }
        }
    }

    fn open(&mut self, transcript: Transcript, bootstrap: SessionBootstrap) {
        self.stop_generation();
        let output = self.session.handle(
            EngineCommand::LoadTranscript {
                transcript,
                bootstrap,
            },
            self.clock.now_ms(),
        );
        self.perform(output);
    }

    fn perform(&mut self, output: Output) {
        for response in output.responses {
            self.send(response);
        }

        for effect in output.effects {
            match effect {
                Effect::Generate {
                    generation,
                    transcript,
                } => self.spawn_generation(generation, &transcript),
                Effect::StopGeneration { generation } => {
                    if !self.stop_generation() {
                        // Nothing pushes events in polling mode; stop directly.
                        let output = self.session.handle(
                            EngineCommand::GenerationStopped(generation),
                            self.clock.now_ms(),
                        );
                        self.perform(output);
                    }
                }
                Effect::StoreProgress { character, index } => {
                    if let Err(error) = self.saves.store_progress(&character, index) {
                        warn!(%error, "could not record reading progress");
                    }
                }
            }
        }
    }

    fn send(&self, response: EngineResponse) {
        let _ = self.tx.send(response);
    }

    /// Signal a running stream worker to stop. Returns false if none was running.
    fn stop_generation(&mut self) -> bool {
        match self.cancel.take() {
            Some(cancel) => {
                cancel.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    fn spawn_generation(&mut self, generation: GenerationId, transcript: &Transcript) {
        self.stop_generation();
        let messages = PromptBuilder::build(transcript, &self.llm.system_prompt);
        let client = LlmClient::new(self.llm.clone());
        let sink = self.cmd_tx.clone();
        debug!(
            generation,
            messages = messages.len(),
            stream = self.llm.stream,
            "requesting reply"
        );

        if self.llm.stream {
            let cancel = Arc::new(AtomicBool::new(false));
            self.cancel = Some(Arc::clone(&cancel));
            thread::spawn(move || {
                if let Err(error) = client.stream(generation, &messages, &sink, &cancel) {
                    let _ = sink.send(EngineCommand::GenerationFailed {
                        generation,
                        error: error.to_string(),
                    });
                }
            });
            return;
        }

        let slot = CompletionSlot::default();
        slot.begin();
        let worker_slot = slot.clone();
        thread::spawn(move || match client.complete(&messages) {
            Ok(text) => worker_slot.fulfil(text),
            Err(error) => {
                worker_slot.fail();
                let _ = sink.send(EngineCommand::GenerationFailed {
                    generation,
                    error: error.to_string(),
                });
            }
        });

        let output = self.session.handle(
            EngineCommand::StartPolling {
                generation,
                probe: Box::new(slot),
            },
            self.clock.now_ms(),
        );
        self.perform(output);
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
