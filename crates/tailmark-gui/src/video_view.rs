use eframe::egui;
use tailmark_lib::video::VideoFrame;
use tailmark_lib::{RecordingId, Session};

/// GPU copy of the most recently decoded preview frame.
#[derive(Default)]
pub struct VideoView {
    texture: Option<egui::TextureHandle>,
    /// Recording and frame index currently held by `texture`.
    uploaded: Option<(RecordingId, usize)>,
    stale: bool,
}

impl VideoView {
    /// Force a re-upload on the next paint.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn show(&mut self, ui: &mut egui::Ui, session: &Session) {
        ui.heading("Video");
        let Some(recording) = session.selected_recording() else {
            self.texture = None;
            self.uploaded = None;
            ui.label("No recording selected.");
            return;
        };
        if !recording.has_video() {
            self.texture = None;
            self.uploaded = None;
            ui.label("No video attached.");
            return;
        }
        match session.current_frame() {
            Some(frame) => {
                self.upload(ui.ctx(), recording.id(), frame);
                if let Some(texture) = &self.texture {
                    ui.add(egui::Image::new(texture).shrink_to_fit());
                }
                ui.label(format!("Frame {}", frame.index));
            }
            None => {
                ui.label("Decoding...");
            }
        }
        if let Some(path) = recording.video_path() {
            ui.small(path.display().to_string());
        }
    }

    fn needs_upload(&self, recording: RecordingId, frame: &VideoFrame) -> bool {
        self.stale || self.texture.is_none() || self.uploaded != Some((recording, frame.index))
    }

    fn upload(&mut self, ctx: &egui::Context, recording: RecordingId, frame: &VideoFrame) {
        if !self.needs_upload(recording, frame) {
            return;
        }
        let image = egui::ColorImage::from_rgb([frame.width, frame.height], &frame.rgb);
        match &mut self.texture {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.texture =
                    Some(ctx.load_texture("video_frame", image, egui::TextureOptions::LINEAR));
            }
        }
        self.uploaded = Some((recording, frame.index));
        self.stale = false;
    }
}
