use std::fmt;
use std::path::PathBuf;

/// Output container/codec the user picked. `Mp3` means audio-only
/// extraction; the other two keep video and remux if needed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Webm,
    Mp4,
    Mp3,
}

impl Container {
    pub const ALL: [Self; 3] = [Self::Webm, Self::Mp4, Self::Mp3];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Webm => "webm",
            Self::Mp4 => "mp4",
            Self::Mp3 => "mp3",
        }
    }

    pub fn is_video(self) -> bool {
        !matches!(self, Self::Mp3)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a download worker needs; immutable once the task starts.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    pub url: String,
    pub dest_dir: PathBuf,
    /// Maximum vertical resolution in pixels. Ignored for `Mp3`.
    pub quality: u32,
    pub container: Container,
}

/// Generation token for a task. The UI remembers the id of the task it
/// started last and drops notifications carrying any other id, so a
/// superseded worker can finish harmlessly.
pub type TaskId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    Probe,
    Download,
}

impl TaskKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Probe => "probe",
            Self::Download => "download",
        }
    }
}

/// Message from a worker to the UI observer. Within one task these arrive
/// in emission order; exactly one terminal variant is ever sent per task
/// and nothing follows it.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskNotification {
    /// Download progress in percent, clamped to [0, 100].
    Progress(f32),
    /// One line for the log pane. Warnings and errors keep their
    /// `WARNING:` / `ERROR:` prefix since this channel is unstructured.
    Log(String),
    /// Sent once per download task, before any bytes move: does a format
    /// with a strictly higher vertical resolution than requested exist?
    HigherQualityAvailable(bool),
    /// Terminal result of a probe task: distinct available vertical
    /// resolutions, ascending.
    ResolutionsProbed(Vec<u32>),
    /// Terminal result of a successful download task.
    Completed,
    /// Terminal result of any task whose worker hit an error.
    Failed(String),
}

impl TaskNotification {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ResolutionsProbed(_) | Self::Completed | Self::Failed(_)
        )
    }
}
