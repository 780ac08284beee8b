use thiserror::Error;

/// Failure taxonomy for everything that can go wrong between a button press
/// and a finished file on disk. Worker-side variants are converted into a
/// single `Failed` notification at the task boundary; `Config` and `Busy`
/// are returned synchronously before any worker is spawned.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Metadata extraction failed (bad URL, unsupported site, network).
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The download itself was interrupted or rejected.
    #[error("download failed: {0}")]
    Download(String),

    /// A post-processing (remux/transcode) step failed.
    #[error("transcoding failed: {0}")]
    Transcode(String),

    /// Invalid user input or environment, detected before spawning work.
    #[error("{0}")]
    Config(String),

    /// A task of this kind is already running in its slot.
    #[error("a {0} task is already running")]
    Busy(&'static str),

    /// The yt-dlp process could not be spawned or its pipes failed.
    #[error("failed to run yt-dlp: {0}")]
    Spawn(#[from] std::io::Error),

    /// yt-dlp produced metadata we could not parse.
    #[error("unreadable video metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}
