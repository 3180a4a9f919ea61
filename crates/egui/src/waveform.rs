use eframe::egui::{self, Color32, Pos2, Rect, Sense, Stroke, Vec2};
use stem_core::Track;

pub const ROW_HEIGHT: f32 = 56.0;

/// Pointer interaction on a waveform, in seconds along the song.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scrub {
    Begin(f64),
    Move(f64),
    End,
    Click(f64),
}

/// Draw one stem's envelope with the shared playhead at `fraction` and report scrubbing.
pub fn waveform(ui: &mut egui::Ui, track: &Track, fraction: f64, duration: f64) -> Option<Scrub> {
    let size = Vec2::new(ui.available_width(), ROW_HEIGHT);
    let (rect, response) = ui.allocate_exact_size(size, Sense::click_and_drag());

    if ui.is_rect_visible(rect) {
        paint(ui.painter(), rect, track, fraction);
    }

    let time_at = |pos: Pos2| -> f64 {
        let x = ((pos.x - rect.left()) / rect.width().max(1.0)).clamp(0.0, 1.0);
        x as f64 * duration
    };
    let pointer = response.interact_pointer_pos().map(time_at);

    if response.drag_started() {
        pointer.map(Scrub::Begin)
    } else if response.drag_stopped() {
        Some(Scrub::End)
    } else if response.dragged() {
        pointer.map(Scrub::Move)
    } else if response.clicked() {
        pointer.map(Scrub::Click)
    } else {
        None
    }
}

fn paint(painter: &egui::Painter, rect: Rect, track: &Track, fraction: f64) {
    let [r, g, b] = track.color;
    let level = 0.25 + 0.75 * track.volume as f32 / 100.0;
    let color = Color32::from_rgb(r, g, b).gamma_multiply(level);

    painter.rect_filled(rect, 4.0, Color32::from_gray(28));

    let envelope = &track.envelope;
    if envelope.is_empty() {
        let label = if track.is_loaded() { "silent" } else { "loading…" };
        painter.text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            label,
            egui::FontId::proportional(12.0),
            Color32::from_gray(110),
        );
    } else {
        let peak = envelope.iter().copied().fold(0.0f32, f32::max).max(1e-6);
        let step = rect.width() / envelope.len() as f32;
        let mid = rect.center().y;
        let half = rect.height() * 0.45;
        let stroke = Stroke::new(step.max(1.0), color);

        for (i, value) in envelope.iter().enumerate() {
            let x = rect.left() + (i as f32 + 0.5) * step;
            let h = (value / peak) * half;
            painter.line_segment([Pos2::new(x, mid - h), Pos2::new(x, mid + h)], stroke);
        }
    }

    let x = rect.left() + rect.width() * fraction as f32;
    painter.line_segment(
        [Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())],
        Stroke::new(2.0, Color32::WHITE),
    );
}
