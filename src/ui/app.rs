use eframe::egui;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::engine::engine::{Engine, EngineConfig};
use crate::engine::protocol::{EngineCommand, EngineResponse, FrameView};
use crate::engine::save_store::SaveStore;
use crate::engine::transcript_io::load_transcript;
use crate::model::frame::{Frame, ImageRef};
use crate::model::game_save::SlotSummary;
use crate::model::snapshot::SessionBootstrap;
use crate::model::transcript::Transcript;
use crate::ui::center_panel::draw_center_panel;
use crate::ui::menus::{draw_history_window, draw_saves_window, draw_settings_window};
use crate::ui::settings::{PlayerSettings, SpeakerColors};
use crate::ui::textures::BackgroundCache;

const LIVE_REPAINT: Duration = Duration::from_millis(16);
const IDLE_REPAINT: Duration = Duration::from_millis(250);
const NOTICE_TTL: Duration = Duration::from_secs(4);

/* =========================
   UI State
   ========================= */

#[derive(Default)]
pub struct UiState {
    pub view: Option<FrameView>,
    pub background: Option<ImageRef>,
    pub busy: bool,
    pub notice: Option<(String, Instant)>,
    pub input_text: String,

    pub history: Vec<Frame>,
    pub history_current: usize,
    pub slots: Vec<Option<SlotSummary>>,

    pub show_history: bool,
    pub show_settings: bool,
    pub show_saves: bool,
}

/* =========================
   App
   ========================= */

pub struct VnApp {
    pub ui: UiState,
    pub settings: PlayerSettings,
    pub colors: SpeakerColors,
    pub backgrounds: BackgroundCache,

    cmd_tx: mpsc::Sender<EngineCommand>,
    resp_rx: mpsc::Receiver<EngineResponse>,
}

impl VnApp {
    pub fn new(
        settings: PlayerSettings,
        opened: Option<(Transcript, PathBuf)>,
        bootstrap: SessionBootstrap,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (resp_tx, resp_rx) = mpsc::channel();

        let config = EngineConfig {
            session: settings.session_config(),
            llm: settings.llm.clone(),
            saves: SaveStore::default_location(),
        };
        let worker_tx = cmd_tx.clone();
        std::thread::spawn(move || {
            let mut engine = Engine::new(cmd_rx, worker_tx, resp_tx, config);
            engine.run();
        });

        let mut app = Self {
            ui: UiState::default(),
            settings,
            colors: SpeakerColors::default(),
            backgrounds: BackgroundCache::new(),
            cmd_tx,
            resp_rx,
        };
        if let Some((transcript, path)) = opened {
            app.open(transcript, &path, bootstrap);
        }
        app
    }

    pub fn send_command(&self, command: EngineCommand) {
        let _ = self.cmd_tx.send(command);
    }

    fn open(&mut self, transcript: Transcript, path: &std::path::Path, bootstrap: SessionBootstrap) {
        self.backgrounds
            .set_base_dir(path.parent().map(|p| p.to_path_buf()));
        self.colors.reset();
        self.send_command(EngineCommand::LoadTranscript {
            transcript,
            bootstrap,
        });
    }

    pub fn open_file_dialog(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Transcript", &["json", "jsonl"])
            .pick_file()
        else {
            return;
        };
        match load_transcript(&path) {
            Ok(transcript) => self.open(transcript, &path, SessionBootstrap::default()),
            Err(error) => self.notify(format!("Could not open transcript: {error}")),
        }
    }

    pub fn notify(&mut self, text: String) {
        self.ui.notice = Some((text, Instant::now()));
    }

    fn drain_responses(&mut self) {
        while let Ok(resp) = self.resp_rx.try_recv() {
            match resp {
                EngineResponse::View(view) => {
                    self.ui.background = Some(view.frame.background.clone());
                    self.ui.view = Some(view);
                }
                EngineResponse::History { frames, current } => {
                    self.ui.history = frames;
                    self.ui.history_current = current;
                    self.ui.show_history = true;
                }
                EngineResponse::Busy(busy) => self.ui.busy = busy,
                EngineResponse::Notice(text) => self.notify(text),
                EngineResponse::ResetBackground(image) => self.ui.background = Some(image),
                EngineResponse::Slots(slots) => self.ui.slots = slots,
            }
        }
    }

    fn handle_keys(&self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        ctx.input(|i| {
            if i.key_pressed(egui::Key::Space) || i.key_pressed(egui::Key::Enter) {
                self.send_command(EngineCommand::Advance);
            }
            if i.key_pressed(egui::Key::ArrowLeft) || i.key_pressed(egui::Key::Backspace) {
                self.send_command(EngineCommand::Prev);
            }
            if i.key_pressed(egui::Key::Home) {
                self.send_command(EngineCommand::Restart);
            }
            if i.key_pressed(egui::Key::Escape) {
                self.send_command(EngineCommand::Skip);
            }
        });
    }

    fn draw_menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Open…").clicked() {
                    self.open_file_dialog();
                }
                if ui.button("History").clicked() {
                    self.send_command(EngineCommand::RequestHistory);
                }
                if ui.button("Save / Load").clicked() {
                    self.ui.show_saves = true;
                    self.send_command(EngineCommand::ListSlots);
                }
                if ui.button("Settings").clicked() {
                    self.ui.show_settings = true;
                }
                if ui.button("Restart").clicked() {
                    self.send_command(EngineCommand::Restart);
                }

                if let Some((text, since)) = &self.ui.notice {
                    if since.elapsed() < NOTICE_TTL {
                        ui.separator();
                        ui.label(text);
                    }
                }
            });
        });
    }
}

/* =========================
   egui App
   ========================= */

impl eframe::App for VnApp {
    fn update(&mut self, ctx: &egui::Context, _: &mut eframe::Frame) {
        ctx.set_pixels_per_point(self.settings.ui_scale);

        self.drain_responses();
        self.handle_keys(ctx);

        self.draw_menu_bar(ctx);
        draw_center_panel(ctx, self);
        draw_history_window(ctx, self);
        draw_saves_window(ctx, self);
        draw_settings_window(ctx, self);

        let live = self.ui.busy
            || self
                .ui
                .view
                .as_ref()
                .is_some_and(|v| v.typing || v.streaming);
        ctx.request_repaint_after(if live { LIVE_REPAINT } else { IDLE_REPAINT });
    }
}

impl Drop for VnApp {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
    }
}
