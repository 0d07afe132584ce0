use anyhow::Context;
use eframe::{egui, egui::ViewportBuilder};
use env_logger::Env;
use rfd::FileDialog;
use std::path::PathBuf;
use std::time::Duration;
use tailmark_lib::editor::MenuAction;
use tailmark_lib::plot::Color;
use tailmark_lib::video::FfmpegBackend;
use tailmark_lib::{AnnotatorConfig, Session};

mod plot_view;
mod video_view;

use plot_view::{PlotInput, PlotView};
use video_view::VideoView;

const POLL_INTERVAL_MS: u64 = 15;

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            log::warn!("{err:#}; using built-in defaults");
            AnnotatorConfig::default()
        }
    };
    let native_options = eframe::NativeOptions {
        viewport: ViewportBuilder::default().with_inner_size([1280.0, 800.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Tailmark",
        native_options,
        Box::new(|_cc| Ok(Box::new(AnnotatorApp::new(config)?))),
    )
}

fn load_config() -> anyhow::Result<AnnotatorConfig> {
    AnnotatorConfig::load().context("configuration could not be loaded")
}

struct AnnotatorApp {
    session: Session,
    plot: PlotView,
    video: VideoView,
    status: String,
    last_dir: Option<PathBuf>,
}

impl AnnotatorApp {
    fn new(config: AnnotatorConfig) -> tailmark_lib::Result<Self> {
        Ok(Self {
            session: Session::new(config, FfmpegBackend::default())?,
            plot: PlotView::default(),
            video: VideoView::default(),
            status: "Add tail angle files to begin".into(),
            last_dir: None,
        })
    }

    fn dialog(&self) -> FileDialog {
        match &self.last_dir {
            Some(dir) => FileDialog::new().set_directory(dir),
            None => FileDialog::new(),
        }
    }

    fn remember_dir(&mut self, path: &std::path::Path) {
        let dir = if path.is_dir() { Some(path) } else { path.parent() };
        self.last_dir = dir.map(|dir| dir.to_path_buf());
    }

    fn add_tail_angles(&mut self) {
        let Some(paths) = self
            .dialog()
            .add_filter("Tail angles", &["csv"])
            .pick_files()
        else {
            return;
        };
        if let Some(first) = paths.first() {
            self.remember_dir(first);
        }
        let report = self.session.import_files(&paths);
        self.status = report.summary();
    }

    fn add_tail_angles_from_folder(&mut self) {
        let Some(dir) = self.dialog().pick_folder() else {
            return;
        };
        self.remember_dir(&dir);
        self.status = match self.session.import_folder(&dir) {
            Ok(report) => report.summary(),
            Err(err) => err.to_string(),
        };
    }

    fn add_video(&mut self) {
        let extension = self.session.config().video_extension.clone();
        let Some(path) = self
            .dialog()
            .add_filter("Video", &[extension.as_str()])
            .pick_file()
        else {
            return;
        };
        self.remember_dir(&path);
        self.status = match self.session.attach_video_to_selected(&path) {
            Ok(()) => format!("Attached {}", path.display()),
            Err(err) => err.to_string(),
        };
    }

    fn add_videos_from_folder(&mut self) {
        let Some(dir) = self.dialog().pick_folder() else {
            return;
        };
        self.remember_dir(&dir);
        self.status = self.session.attach_videos_from_folder(&dir).summary();
    }

    fn save_results(&mut self) {
        let Some(dir) = self.dialog().pick_folder() else {
            return;
        };
        self.remember_dir(&dir);
        self.status = self.session.export_results(&dir).summary();
    }

    fn remove_selected(&mut self) {
        let name = self
            .session
            .selected_recording()
            .map(|rec| rec.source_path().display().to_string());
        match self.session.remove_selected() {
            Ok(()) => {
                if let Some(name) = name {
                    self.status = format!("Removed {name}");
                }
            }
            Err(err) => self.status = err.to_string(),
        }
    }

    fn apply_plot_input(&mut self, input: PlotInput) {
        match input.hover {
            Some(x) => self.session.pointer_moved(x),
            None => self.session.pointer_left(),
        }
        if let Some(marker) = input.drag_started {
            self.session.begin_marker_drag(marker);
        }
        if let (Some(marker), Some(x)) = (self.session.editor().dragging(), input.drag_to) {
            self.session.drag_marker(marker, x);
        }
        if input.drag_stopped {
            if let Some(marker) = self.session.editor().dragging() {
                self.session.end_marker_drag(marker);
            }
        }
        if let Some((x, anchor)) = input.click {
            let outcome = self.session.pointer_clicked(x, anchor);
            log::debug!("click at {x:.3}: {outcome:?}");
            self.plot.menu_opened_this_frame = self.session.menu().is_some();
        }
    }

    fn show_buttons(&mut self, ui: &mut egui::Ui) {
        let has_selection = self.session.selected().is_some();
        ui.horizontal_wrapped(|ui| {
            if ui.button("Add Tail Angles...").clicked() {
                self.add_tail_angles();
            }
            if ui.button("Add Tail Angles from Folder...").clicked() {
                self.add_tail_angles_from_folder();
            }
            if ui
                .add_enabled(has_selection, egui::Button::new("Remove"))
                .clicked()
            {
                self.remove_selected();
            }
            ui.separator();
            if ui
                .add_enabled(has_selection, egui::Button::new("Add Video..."))
                .clicked()
            {
                self.add_video();
            }
            if ui
                .add_enabled(!self.session.store().is_empty(), egui::Button::new("Add Videos from Folder..."))
                .clicked()
            {
                self.add_videos_from_folder();
            }
            ui.separator();
            if ui
                .add_enabled(!self.session.store().is_empty(), egui::Button::new("Save Results..."))
                .clicked()
            {
                self.save_results();
            }
        });
    }

    fn show_recordings(&mut self, ui: &mut egui::Ui) {
        let selected = self.session.selected();
        let mut clicked = None;
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for recording in self.session.store().iter() {
                    let name = recording
                        .source_path()
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_else(|| recording.source_path().display().to_string());
                    let label = if recording.has_video() {
                        format!("{name}  [video]")
                    } else {
                        name
                    };
                    let response = ui
                        .selectable_label(selected == Some(recording.id()), label)
                        .on_hover_text(recording.source_path().display().to_string());
                    if response.clicked() {
                        clicked = Some(recording.id());
                    }
                }
            });
        if let Some(id) = clicked {
            self.session.select(id);
        }
    }

    fn show_menu(&mut self, ctx: &egui::Context) {
        let Some(menu) = self.session.menu().cloned() else {
            return;
        };
        let config = self.session.config();
        let mut action = None;
        let area = egui::Area::new(egui::Id::new("reclassify_menu"))
            .order(egui::Order::Foreground)
            .fixed_pos(egui::pos2(menu.anchor[0], menu.anchor[1]))
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.set_min_width(140.0);
                    for behavior in config.all_behaviors() {
                        let spec = config.behavior(behavior);
                        ui.horizontal(|ui| {
                            let (rect, _) = ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
                            ui.painter()
                                .rect_filled(rect, 2.0, color32(spec.color));
                            let checked = menu.checked == behavior;
                            if ui.selectable_label(checked, spec.name.as_str()).clicked() {
                                action = Some(MenuAction::Reclassify(behavior));
                            }
                        });
                    }
                    ui.separator();
                    if ui
                        .button(egui::RichText::new("Delete").strong())
                        .clicked()
                    {
                        action = Some(MenuAction::Delete);
                    }
                });
            });
        if let Some(action) = action {
            self.session.choose(action);
        } else if !self.plot.menu_opened_this_frame && area.response.clicked_elsewhere() {
            self.session.dismiss_menu();
        }
    }
}

impl eframe::App for AnnotatorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.session.prepare();
        if self.session.poll_video() {
            self.video.invalidate();
        }
        self.plot.menu_opened_this_frame = false;

        let delete_pressed =
            ctx.memory(|mem| mem.focused().is_none()) && ctx.input(|i| i.key_pressed(egui::Key::Delete));
        if delete_pressed && self.session.selected().is_some() {
            self.remove_selected();
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.session.dismiss_menu();
        }

        egui::TopBottomPanel::bottom("recordings")
            .resizable(true)
            .default_height(220.0)
            .show(ctx, |ui| {
                ui.add_space(4.0);
                self.show_buttons(ui);
                ui.separator();
                ui.label(format!("Status: {}", self.status));
                ui.separator();
                self.show_recordings(ui);
            });

        egui::SidePanel::left("video")
            .resizable(true)
            .default_width(420.0)
            .show(ctx, |ui| {
                self.video.show(ui, &self.session);
            });

        let mut input = None;
        egui::CentralPanel::default().show(ctx, |ui| {
            input = self.plot.show(ui, &self.session);
        });
        if let Some(input) = input {
            self.apply_plot_input(input);
        }

        self.show_menu(ctx);

        if self.session.video_pending() {
            ctx.request_repaint_after(Duration::from_millis(POLL_INTERVAL_MS));
        }
    }
}

fn color32(color: Color) -> egui::Color32 {
    let (r, g, b) = color.rgb();
    egui::Color32::from_rgb(r, g, b)
}
