use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eframe::egui;
use stem_client::Health;
use stem_core::export::request_mix;
use stem_core::{
    ALLOWED_EXTENSIONS, ExportError, HttpApi, MixedAudio, ProcessingStatus, SeparationApi,
    Session, StemId, format_time, is_partial_time, parse_time, save_mix,
};
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

use crate::waveform::{self, Scrub};

/// Repaint cadence while a job runs but nothing plays.
const LOADING_REPAINT: Duration = Duration::from_millis(100);
const LABEL_WIDTH: f32 = 90.0;

pub struct PlayerApp {
    session: Session,
    runtime: Runtime,
    api: Arc<HttpApi>,
    health: Option<oneshot::Receiver<Result<Health, String>>>,
    backend: Option<String>,
    export: Option<oneshot::Receiver<Result<MixedAudio, ExportError>>>,
    notice: Option<String>,
    time_input: String,
    editing_time: bool,
    volume_inputs: HashMap<StemId, String>,
}

impl PlayerApp {
    pub fn new(session: Session, runtime: Runtime, api: Arc<HttpApi>) -> Self {
        let (tx, rx) = oneshot::channel();
        let probe = api.clone();
        runtime.spawn(async move {
            let _ = tx.send(probe.health().await.map_err(|e| e.to_string()));
        });

        Self {
            session,
            runtime,
            api,
            health: Some(rx),
            backend: None,
            export: None,
            notice: None,
            time_input: format_time(0.0),
            editing_time: false,
            volume_inputs: HashMap::new(),
        }
    }

    fn open_file(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Audio", &ALLOWED_EXTENSIONS)
            .pick_file()
        else {
            return;
        };
        self.new_song();
        self.load(path);
    }

    fn load(&mut self, path: PathBuf) {
        self.notice = None;
        self.session
            .start_job(self.runtime.handle(), self.api.clone(), path);
    }

    /// Reset the session and drop the old job's files on the server.
    fn new_song(&mut self) {
        self.export = None;
        self.volume_inputs.clear();
        let Some(job_id) = self.session.reset() else {
            return;
        };
        let api = self.api.clone();
        self.runtime.spawn(async move {
            if let Err(e) = api.clear(&job_id).await {
                log::warn!("could not clear job {job_id}: {e}");
            }
        });
    }

    fn start_export(&mut self) {
        let request = match self.session.mix_request() {
            Ok(request) => request,
            Err(e) => {
                self.notice = Some(e.to_string());
                return;
            }
        };
        let (tx, rx) = oneshot::channel();
        let api = self.api.clone();
        self.runtime.spawn(async move {
            let _ = tx.send(request_mix(api.as_ref(), &request).await);
        });
        self.export = Some(rx);
    }

    fn poll_background(&mut self) {
        let health = self.health.as_mut().and_then(|rx| rx.try_recv().ok());
        if let Some(result) = health {
            self.backend = Some(match result {
                Ok(health) => format!(
                    "backend {} on {}{}",
                    health.status,
                    health.device.as_deref().unwrap_or("unknown device"),
                    if health.model_loaded == Some(false) { " (model not loaded)" } else { "" }
                ),
                Err(e) => format!("backend unreachable: {e}"),
            });
            self.health = None;
        }

        let finished = match self.export.as_mut().map(|rx| rx.try_recv()) {
            Some(Ok(result)) => result,
            Some(Err(oneshot::error::TryRecvError::Closed)) => {
                self.export = None;
                self.notice = Some("Export failed: the request was dropped".to_string());
                return;
            }
            _ => return,
        };
        self.export = None;
        match finished {
            Ok(mix) => self.save(mix),
            Err(e) => self.notice = Some(format!("Export failed: {e}")),
        }
    }

    fn save(&mut self, mix: MixedAudio) {
        let Some(path) = rfd::FileDialog::new().set_file_name(&mix.filename).save_file() else {
            return;
        };
        self.notice = Some(match save_mix(&path, &mix) {
            Ok(()) => format!("Saved {}", path.display()),
            Err(e) => format!("Export failed: {e}"),
        });
    }

    fn status_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Open…").clicked() {
                self.open_file();
            }
            let state = self.session.state();
            if state.file.is_some() && ui.button("New song").clicked() {
                self.new_song();
                return;
            }

            let state = self.session.state();
            if let Some(file) = &state.file {
                ui.label(&file.name);
            }
            let message = self.session.status_message().unwrap_or("Pick a song to separate");
            match &state.status {
                ProcessingStatus::Idle | ProcessingStatus::Completed { .. } => {
                    ui.label(message);
                }
                ProcessingStatus::Uploading => {
                    ui.spinner();
                    ui.label(message);
                }
                ProcessingStatus::Processing { progress, .. } => {
                    ui.add(
                        egui::ProgressBar::new(*progress as f32 / 100.0)
                            .desired_width(200.0)
                            .text(format!("{progress}%")),
                    );
                    ui.label(message);
                }
                ProcessingStatus::Error { .. } => {
                    ui.colored_label(egui::Color32::RED, message);
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if let Some(backend) = &self.backend {
                    ui.weak(backend);
                }
            });
        });
    }

    fn transport(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("⏮").on_hover_text("Back to start").clicked() {
                self.session.seek(0.0);
            }
            let label = if self.session.is_playing() { "⏸ Pause" } else { "▶ Play" };
            if ui.button(label).clicked() {
                self.session.toggle();
            }

            self.time_field(ui);
            ui.label(format!("/ {}", format_time(self.session.state().duration)));

            if let Some(info) = &self.session.state().audio_info {
                ui.add_space(20.0);
                if let Some(key) = &info.key {
                    ui.label(format!("Key: {key}"));
                }
                if let Some(tempo) = info.tempo {
                    ui.label(format!("Tempo: {tempo:.0} BPM"));
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let exporting = self.export.is_some();
                let enabled = self.session.can_export() && !exporting;
                let text = if exporting { "Exporting…" } else { "Export mix" };
                if ui.add_enabled(enabled, egui::Button::new(text)).clicked() {
                    self.start_export();
                }
            });
        });
    }

    /// `MM:SS.D` readout; editable, committed on Enter or focus loss, Escape restores.
    fn time_field(&mut self, ui: &mut egui::Ui) {
        if !self.editing_time {
            self.time_input = format_time(self.session.state().display_time());
        }

        let before = self.time_input.clone();
        let response = ui.add(
            egui::TextEdit::singleline(&mut self.time_input)
                .desired_width(72.0)
                .font(egui::TextStyle::Monospace),
        );

        if response.gained_focus() {
            self.editing_time = true;
        }
        if response.changed() && !is_partial_time(&self.time_input) {
            self.time_input = before;
        }
        if response.lost_focus() {
            self.editing_time = false;
            let escaped = ui.input(|i| i.key_pressed(egui::Key::Escape));
            match parse_time(&self.time_input) {
                Some(time) if !escaped => self.session.seek(time),
                _ => self.time_input = format_time(self.session.state().current_time),
            }
        }
    }

    fn tracks(&mut self, ui: &mut egui::Ui) {
        let state = self.session.state();
        let tracks = state.tracks.clone();
        let fraction = state.playhead_fraction();
        let duration = state.duration;

        for track in &tracks {
            ui.horizontal(|ui| {
                ui.vertical(|ui| {
                    ui.set_width(LABEL_WIDTH);
                    let [r, g, b] = track.color;
                    ui.colored_label(egui::Color32::from_rgb(r, g, b), &track.display_name);

                    let mut volume = track.volume as i64;
                    if ui
                        .add(egui::Slider::new(&mut volume, 0..=100).show_value(false))
                        .changed()
                    {
                        self.session.set_volume(track.id, volume);
                        self.volume_inputs.remove(&track.id);
                    }
                    self.volume_field(ui, track.id, track.volume);
                });

                if let Some(scrub) = waveform::waveform(ui, track, fraction, duration) {
                    self.scrub(scrub);
                }
            });
            ui.add_space(4.0);
        }
    }

    /// Typed volume: valid values apply while typing, anything else is clamped on commit.
    fn volume_field(&mut self, ui: &mut egui::Ui, id: StemId, volume: u8) {
        let text = self
            .volume_inputs
            .entry(id)
            .or_insert_with(|| volume.to_string());
        let response = ui.add(egui::TextEdit::singleline(text).desired_width(40.0));

        if response.changed() {
            if let Ok(value) = text.trim().parse::<i64>() {
                self.session.set_volume(id, value);
            }
        }
        if response.lost_focus() {
            if let Ok(value) = text.trim().parse::<i64>() {
                self.session.commit_volume(id, value);
            }
            self.volume_inputs.remove(&id);
        } else if !response.has_focus() {
            self.volume_inputs.insert(id, volume.to_string());
        }
    }

    fn scrub(&mut self, scrub: Scrub) {
        match scrub {
            Scrub::Begin(time) => self.session.begin_drag(time),
            Scrub::Move(time) => self.session.drag_to(time),
            Scrub::End => self.session.end_drag(),
            Scrub::Click(time) => self.session.seek(time),
        }
    }
}

impl eframe::App for PlayerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.session.pump();
        let playing = self.session.on_frame();
        self.poll_background();

        if ctx.input(|i| i.key_pressed(egui::Key::Space)) && !ctx.wants_keyboard_input() {
            self.session.toggle();
        }

        if playing || self.session.state().is_dragging {
            ctx.request_repaint();
        } else if self.session.is_loading() || self.export.is_some() || self.health.is_some() {
            ctx.request_repaint_after(LOADING_REPAINT);
        }

        egui::TopBottomPanel::top("status").show(ctx, |ui| {
            ui.add_space(4.0);
            self.status_bar(ui);
            ui.add_space(4.0);
        });

        egui::TopBottomPanel::bottom("transport").show(ctx, |ui| {
            ui.add_space(4.0);
            self.transport(ui);
            if let Some(notice) = &self.notice {
                ui.label(notice);
            }
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| self.tracks(ui));
        });
    }
}
