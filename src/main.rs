//! Main application for the ytgrab GUI: renders state and forwards user
//! intents to the background task runner. All blocking work happens off
//! this thread; each frame drains the notification channel.

mod error;
mod fetcher;
mod model;
mod progress;
mod runner;
mod selection;
mod thumbnail;

use std::sync::{Arc, Mutex};

use eframe::{egui, App, Frame};
use egui::{ColorImage, TextureOptions, Visuals};
use once_cell::sync::OnceCell;
use rfd::FileDialog;
use tokio::{
    runtime::Runtime,
    sync::mpsc::UnboundedReceiver,
};
use tracing::warn;

use fetcher::YtDlpFetcher;
use model::{Container, DownloadRequest, TaskId, TaskNotification};
use runner::TaskRunner;

/// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

const DEFAULT_QUALITIES: [u32; 4] = [1080, 720, 480, 360];
const MAX_LOG_LINES: usize = 1000;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let rt = Arc::new(Runtime::new()?);
    RUNTIME
        .set(Arc::clone(&rt))
        .map_err(|_| anyhow::anyhow!("runtime already initialized"))?;

    let fetcher = Arc::new(YtDlpFetcher::locate()?);
    let (runner, notifications) = TaskRunner::new(rt.handle().clone(), fetcher);

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "ytgrab",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(YtGrabApp::new(runner, notifications))
        }),
    )
    .map_err(|e| anyhow::anyhow!("failed to start UI: {e}"))
}

/// Application state for the GUI
struct YtGrabApp {
    runner: TaskRunner,
    notifications: UnboundedReceiver<(TaskId, TaskNotification)>,

    url_input: String,
    download_folder: String,
    selected_quality: u32,
    /// Available quality options; replaced by probe results.
    quality_options: Vec<u32>,
    selected_container: Container,

    /// Id of the probe / download task whose notifications we accept.
    /// Anything else on the channel is a stale stream and is dropped.
    probe_task: Option<TaskId>,
    download_task: Option<TaskId>,

    /// Download progress in percent.
    progress: f32,
    log_lines: Vec<String>,
    status: String,

    dark_mode: bool,

    /// Thumbnail plumbing: blocking fetches push here, the frame loop
    /// turns results into textures.
    thumbnail: Option<egui::TextureHandle>,
    thumbnail_results: Arc<Mutex<Option<(String, ColorImage)>>>,
}

impl YtGrabApp {
    fn new(runner: TaskRunner, notifications: UnboundedReceiver<(TaskId, TaskNotification)>) -> Self {
        Self {
            runner,
            notifications,
            url_input: String::new(),
            download_folder: "./downloads".to_owned(),
            selected_quality: 720,
            quality_options: DEFAULT_QUALITIES.to_vec(),
            selected_container: Container::Mp4,
            probe_task: None,
            download_task: None,
            progress: 0.0,
            log_lines: Vec::new(),
            status: "Ready".to_owned(),
            dark_mode: true,
            thumbnail: None,
            thumbnail_results: Arc::new(Mutex::new(None)),
        }
    }

    fn push_log(&mut self, line: String) {
        self.log_lines.push(line);
        if self.log_lines.len() > MAX_LOG_LINES {
            let excess = self.log_lines.len() - MAX_LOG_LINES;
            self.log_lines.drain(..excess);
        }
    }

    /// Apply one notification from the active probe task.
    fn on_probe_note(&mut self, note: TaskNotification) {
        match note {
            TaskNotification::Log(line) => self.push_log(line),
            TaskNotification::ResolutionsProbed(resolutions) => {
                self.probe_task = None;
                if resolutions.is_empty() {
                    self.status = "No video resolutions reported for this URL".to_owned();
                } else {
                    self.status = format!(
                        "Available resolutions: {}",
                        resolutions
                            .iter()
                            .map(|r| format!("{r}p"))
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                    if !resolutions.contains(&self.selected_quality) {
                        self.selected_quality = *resolutions.last().unwrap_or(&720);
                    }
                    self.quality_options = resolutions;
                }
            }
            TaskNotification::Failed(msg) => {
                self.probe_task = None;
                self.status = format!("Resolution check failed: {msg}");
                self.push_log(msg);
            }
            _ => {}
        }
    }

    /// Apply one notification from the active download task.
    fn on_download_note(&mut self, note: TaskNotification) {
        match note {
            TaskNotification::Progress(p) => {
                // Progress never moves backwards on screen.
                if p > self.progress {
                    self.progress = p;
                }
            }
            TaskNotification::Log(line) => self.push_log(line),
            TaskNotification::HigherQualityAvailable(true) => {
                self.push_log(
                    "NOTE: a higher resolution than requested is available for this video"
                        .to_owned(),
                );
            }
            TaskNotification::HigherQualityAvailable(false) => {}
            TaskNotification::Completed => {
                self.download_task = None;
                self.status = "Download completed".to_owned();
            }
            TaskNotification::Failed(msg) => {
                self.download_task = None;
                self.status = format!("Download failed: {msg}");
                self.push_log(msg);
            }
            TaskNotification::ResolutionsProbed(_) => {}
        }
    }

    fn drain_notifications(&mut self) {
        while let Ok((id, note)) = self.notifications.try_recv() {
            if Some(id) == self.probe_task {
                self.on_probe_note(note);
            } else if Some(id) == self.download_task {
                self.on_download_note(note);
            }
            // Other ids belong to superseded tasks; drop them.
        }
    }

    fn start_probe(&mut self) {
        match self.runner.start_probe(&self.url_input) {
            Ok(id) => {
                self.probe_task = Some(id);
                self.status = "Checking available resolutions…".to_owned();
            }
            Err(e) => self.status = e.to_string(),
        }
    }

    fn start_download(&mut self, ctx: &egui::Context) {
        let request = DownloadRequest {
            url: self.url_input.trim().to_owned(),
            dest_dir: self.download_folder.trim().into(),
            quality: self.selected_quality,
            container: self.selected_container,
        };
        match self.runner.start_download(request) {
            Ok(id) => {
                self.download_task = Some(id);
                self.progress = 0.0;
                self.log_lines.clear();
                self.status = "Downloading…".to_owned();
                self.spawn_thumbnail_fetch(ctx);
            }
            Err(e) => self.status = e.to_string(),
        }
    }

    /// Fetch the video thumbnail in the background; purely cosmetic.
    fn spawn_thumbnail_fetch(&mut self, ctx: &egui::Context) {
        let Some(video_id) = extract_video_id(&self.url_input) else {
            return;
        };
        self.thumbnail = None;
        let results = Arc::clone(&self.thumbnail_results);
        let ctx = ctx.clone();
        let Some(rt) = RUNTIME.get() else {
            warn!("runtime not initialized; skipping thumbnail fetch");
            return;
        };
        rt.spawn_blocking(move || {
            if let Some(img) = thumbnail::fetch_thumbnail(&video_id) {
                if let Ok(mut slot) = results.lock() {
                    *slot = Some((video_id, img));
                }
                ctx.request_repaint();
            }
        });
    }

    fn take_thumbnail(&mut self, ctx: &egui::Context) {
        let pending = self.thumbnail_results.lock().ok().and_then(|mut s| s.take());
        if let Some((video_id, img)) = pending {
            let tex = ctx.load_texture(&video_id, img, TextureOptions::default());
            self.thumbnail = Some(tex);
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for YtGrabApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.drain_notifications();
        self.take_thumbnail(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("ytgrab");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.selectable_label(!self.dark_mode, "Light").clicked() {
                        self.dark_mode = false;
                        ctx.set_visuals(Visuals::light());
                    }
                    if ui.selectable_label(self.dark_mode, "Dark").clicked() {
                        self.dark_mode = true;
                        ctx.set_visuals(Visuals::dark());
                    }
                });
            });
            ui.separator();

            // URL input and resolution probe
            ui.label("Video URL:");
            ui.horizontal(|ui| {
                ui.add(
                    egui::TextEdit::singleline(&mut self.url_input)
                        .desired_width(ui.available_width() - 160.0),
                );
                let probing = self.probe_task.is_some();
                if ui
                    .add_enabled(!probing, egui::Button::new("Check resolutions"))
                    .clicked()
                {
                    self.start_probe();
                }
            });

            // Destination folder
            ui.horizontal(|ui| {
                ui.label("Download folder:");
                ui.text_edit_singleline(&mut self.download_folder);
                if ui.button("Browse…").clicked() {
                    if let Some(folder) = FileDialog::new()
                        .set_directory(&self.download_folder)
                        .pick_folder()
                    {
                        self.download_folder = folder.display().to_string();
                    }
                }
            });

            // Quality and container choices
            ui.horizontal(|ui| {
                ui.label("Quality:");
                egui::ComboBox::from_id_source("quality")
                    .selected_text(format!("{}p", self.selected_quality))
                    .show_ui(ui, |ui| {
                        for q in &self.quality_options {
                            ui.selectable_value(&mut self.selected_quality, *q, format!("{q}p"));
                        }
                    });
                ui.label("Format:");
                egui::ComboBox::from_id_source("container")
                    .selected_text(self.selected_container.as_str())
                    .show_ui(ui, |ui| {
                        for c in Container::ALL {
                            ui.selectable_value(&mut self.selected_container, c, c.as_str());
                        }
                    });
            });

            // Download button, disabled while a download runs
            let downloading = self.download_task.is_some();
            if ui
                .add_enabled(!downloading, egui::Button::new("Download"))
                .clicked()
            {
                self.start_download(ctx);
            }

            ui.add(egui::ProgressBar::new(self.progress / 100.0).show_percentage());
            ui.label(&self.status);

            if let Some(tex) = &self.thumbnail {
                ui.add(egui::Image::new(tex).max_height(120.0));
            }

            // Log pane
            ui.separator();
            ui.label("Log:");
            egui::ScrollArea::vertical()
                .auto_shrink([false; 2])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    for line in &self.log_lines {
                        ui.monospace(line);
                    }
                });
        });

        // Keep progress updates flowing while tasks run
        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}

/// Extracts the 'v' parameter from a YouTube URL
fn extract_video_id(url: &str) -> Option<String> {
    url.split("v=")
        .nth(1)
        .and_then(|s| s.split('&').next())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::extract_video_id;

    #[test]
    fn video_id_extraction() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=1"),
            Some("dQw4w9WgXcQ".to_owned())
        );
        assert_eq!(extract_video_id("https://example.com/clip"), None);
        assert_eq!(extract_video_id("https://youtube.com/watch?v="), None);
    }
}
