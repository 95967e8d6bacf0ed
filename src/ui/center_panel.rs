use eframe::egui;
use egui::{pos2, Align2, Color32, Rect, RichText};

use crate::engine::protocol::{EngineCommand, FrameView};
use super::app::VnApp;

const BOX_HEIGHT_RATIO: f32 = 0.3;
const MARGIN: f32 = 24.0;

pub fn draw_center_panel(ctx: &egui::Context, app: &mut VnApp) {
    let input_id = egui::Id::new("player_input");

    // ---------- Input bar ----------
    egui::TopBottomPanel::bottom("player_input_bar").show(ctx, |ui| {
        let mut send_now = false;

        ui.horizontal(|ui| {
            let response = ui.add_sized(
                [ui.available_width() - 120.0, 28.0],
                egui::TextEdit::singleline(&mut app.ui.input_text)
                    .id(input_id)
                    .hint_text("Say something…"),
            );
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                send_now = true;
            }

            if ui.add_enabled(!app.ui.busy, egui::Button::new("Send")).clicked() {
                send_now = true;
            }
            if app.ui.busy && ui.button("Stop").clicked() {
                app.send_command(EngineCommand::StopGeneration);
            }
        });

        if send_now {
            let text = app.ui.input_text.trim().to_string();
            if !text.is_empty() && !app.ui.busy {
                app.send_command(EngineCommand::SubmitPlayerInput(text));
                app.ui.input_text.clear();
            }
            ui.memory_mut(|m| m.request_focus(input_id));
        }
    });

    // ---------- Stage ----------
    egui::CentralPanel::default()
        .frame(egui::Frame::new().fill(Color32::from_gray(12)))
        .show(ctx, |ui| {
            let rect = ui.max_rect();
            let stage = ui.interact(rect, egui::Id::new("stage"), egui::Sense::click());

            draw_background(ui, app, rect);

            let Some(view) = app.ui.view.clone() else {
                ui.painter().text(
                    rect.center(),
                    Align2::CENTER_CENTER,
                    "Open a transcript to begin",
                    egui::FontId::proportional(20.0),
                    Color32::GRAY,
                );
                return;
            };

            if stage.clicked() {
                app.send_command(EngineCommand::Advance);
            }

            let box_rect = Rect::from_min_max(
                pos2(rect.left() + MARGIN, rect.bottom() - rect.height() * BOX_HEIGHT_RATIO),
                pos2(rect.right() - MARGIN, rect.bottom() - MARGIN / 2.0),
            );
            draw_dialogue_box(ui, app, &view, box_rect);

            let above_box = Rect::from_min_max(
                pos2(rect.left() + MARGIN, rect.top() + MARGIN),
                pos2(rect.right() - MARGIN, box_rect.top() - MARGIN / 2.0),
            );
            draw_choices(ui, app, &view, above_box);

            if app.ui.busy {
                ui.put(
                    Rect::from_min_size(pos2(rect.right() - 40.0, rect.top() + 12.0), egui::vec2(24.0, 24.0)),
                    egui::Spinner::new(),
                );
            }
        });
}

fn draw_background(ui: &mut egui::Ui, app: &mut VnApp, rect: Rect) {
    let Some(image) = app.ui.background.clone() else {
        return;
    };
    let Some(texture) = app.backgrounds.get(ui.ctx(), &image) else {
        return;
    };

    // Cover the stage, cropping whichever side overflows.
    let size = texture.size_vec2();
    let scale = (rect.width() / size.x).max(rect.height() / size.y);
    let drawn = Rect::from_center_size(rect.center(), size * scale);
    ui.painter().image(
        texture.id(),
        drawn,
        Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
        Color32::WHITE,
    );
}

fn draw_dialogue_box(ui: &mut egui::Ui, app: &mut VnApp, view: &FrameView, box_rect: Rect) {
    ui.painter()
        .rect_filled(box_rect, 8.0, Color32::from_black_alpha(200));

    let frame = &view.frame;
    let speaker = frame.speaker_name.as_deref().unwrap_or_default();
    let name_color = app.colors.color(&app.settings, speaker, frame.is_user);
    let font_size = app.settings.font_size;

    ui.scope_builder(egui::UiBuilder::new().max_rect(box_rect.shrink(16.0)), |ui| {
        if !speaker.is_empty() {
            ui.label(
                RichText::new(speaker)
                    .strong()
                    .size(font_size * 1.1)
                    .color(name_color),
            );
        }
        ui.label(
            RichText::new(&view.revealed)
                .size(font_size)
                .color(Color32::WHITE),
        );
    });

    let more = !view.typing && (view.index + 1 < view.total || view.more_available);
    let footer = if more {
        format!("{}/{}  ▼", view.index + 1, view.total)
    } else {
        format!("{}/{}", view.index + 1, view.total)
    };
    ui.painter().text(
        box_rect.right_bottom() - egui::vec2(12.0, 8.0),
        Align2::RIGHT_BOTTOM,
        footer,
        egui::FontId::proportional(14.0),
        Color32::LIGHT_GRAY,
    );
}

fn draw_choices(ui: &mut egui::Ui, app: &mut VnApp, view: &FrameView, area: Rect) {
    if view.choices.is_empty() && !(view.end_reached && !app.ui.busy) {
        return;
    }

    ui.scope_builder(egui::UiBuilder::new().max_rect(area), |ui| {
        ui.with_layout(egui::Layout::bottom_up(egui::Align::Center), |ui| {
            if view.choices.is_empty() {
                if ui.button(RichText::new("Continue ▶").size(18.0)).clicked() {
                    app.send_command(EngineCommand::ContinueStory);
                }
                return;
            }
            // bottom_up lays out in reverse; keep the first option on top.
            for choice in view.choices.iter().rev() {
                let label = RichText::new(&choice.text).size(app.settings.font_size);
                if ui.add(egui::Button::new(label).min_size(egui::vec2(280.0, 32.0))).clicked() {
                    app.send_command(EngineCommand::SelectChoice(choice.clone()));
                }
            }
        });
    });
}
