use eframe::egui;

use crate::engine::protocol::EngineCommand;
use crate::engine::save_store::SLOT_COUNT;
use crate::ui::settings_io::save_settings;
use super::app::VnApp;

pub fn draw_history_window(ctx: &egui::Context, app: &mut VnApp) {
    let mut open = app.ui.show_history;
    let mut jump = None;

    egui::Window::new("History")
        .open(&mut open)
        .default_width(480.0)
        .default_height(420.0)
        .show(ctx, |ui| {
            egui::ScrollArea::vertical().stick_to_bottom(true).show(ui, |ui| {
                for (index, frame) in app.ui.history.iter().enumerate() {
                    let speaker = frame.speaker_name.as_deref().unwrap_or_default();
                    let color = app.colors.color(&app.settings, speaker, frame.is_user);

                    let row = ui.horizontal_wrapped(|ui| {
                        if !speaker.is_empty() {
                            ui.label(egui::RichText::new(format!("{speaker}:")).strong().color(color));
                        }
                        ui.label(&frame.text);
                    });
                    let row = row.response.interact(egui::Sense::click());
                    if index == app.ui.history_current {
                        ui.painter().rect_stroke(
                            row.rect,
                            2.0,
                            egui::Stroke::new(1.0, egui::Color32::GRAY),
                            egui::StrokeKind::Outside,
                        );
                    }
                    if row.clicked() {
                        jump = Some(index);
                    }
                    ui.separator();
                }
            });
        });

    if let Some(index) = jump {
        app.send_command(EngineCommand::JumpTo(index));
        open = false;
    }
    app.ui.show_history = open;
}

pub fn draw_settings_window(ctx: &egui::Context, app: &mut VnApp) {
    let mut open = app.ui.show_settings;
    let before = app.settings.clone();

    egui::Window::new("Settings").open(&mut open).show(ctx, |ui| {
        let s = &mut app.settings;

        ui.heading("Display");
        ui.label("UI Scale");
        ui.add(egui::Slider::new(&mut s.ui_scale, 0.75..=2.0));
        ui.label("Font size");
        ui.add(egui::Slider::new(&mut s.font_size, 12.0..=32.0));

        ui.separator();
        ui.heading("Typewriter");
        ui.checkbox(&mut s.typewriter.enabled, "Reveal text gradually");
        ui.add_enabled(
            s.typewriter.enabled,
            egui::Slider::new(&mut s.typewriter.speed_ms, 5..=200).suffix(" ms/char"),
        );

        ui.separator();
        ui.collapsing("Model (applies after restart)", |ui| {
            ui.label("Endpoint");
            ui.text_edit_singleline(&mut s.llm.endpoint);
            ui.label("Model");
            ui.text_edit_singleline(&mut s.llm.model);
            ui.add(egui::Slider::new(&mut s.llm.temperature, 0.0..=2.0).text("temperature"));
            ui.checkbox(&mut s.llm.stream, "Stream replies");
            ui.label("System prompt");
            ui.text_edit_multiline(&mut s.llm.system_prompt);
        });
    });

    if app.settings != before {
        if app.settings.typewriter != before.typewriter {
            app.send_command(EngineCommand::UpdateTypewriter(app.settings.typewriter));
        }
        save_settings(&app.settings);
    }
    app.ui.show_settings = open;
}

pub fn draw_saves_window(ctx: &egui::Context, app: &mut VnApp) {
    let mut open = app.ui.show_saves;
    let mut command = None;

    egui::Window::new("Save / Load").open(&mut open).show(ctx, |ui| {
        egui::Grid::new("slots").striped(true).show(ui, |ui| {
            for slot in 1..=SLOT_COUNT {
                let summary = app
                    .ui
                    .slots
                    .get(usize::from(slot - 1))
                    .and_then(Option::as_ref);

                ui.label(format!("Slot {slot}"));
                match summary {
                    Some(s) => ui.label(format!(
                        "{} · {}/{} · {}",
                        s.character,
                        s.position + 1,
                        s.total_frames,
                        s.preview_text
                    )),
                    None => ui.weak("Empty"),
                };

                if ui.button("Save").clicked() {
                    command = Some(EngineCommand::SaveSlot(slot));
                }
                if ui.add_enabled(summary.is_some(), egui::Button::new("Load")).clicked() {
                    command = Some(EngineCommand::LoadSlot(slot));
                }
                if ui.add_enabled(summary.is_some(), egui::Button::new("Delete")).clicked() {
                    command = Some(EngineCommand::DeleteSlot(slot));
                }
                ui.end_row();
            }
        });
    });

    if let Some(command) = command {
        app.send_command(command);
    }
    app.ui.show_saves = open;
}
