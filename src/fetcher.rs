//! Adapter over the external fetch tool (yt-dlp). The `Fetcher` trait is
//! the seam the task runner works against; `YtDlpFetcher` drives the real
//! subprocess, relaying its output through an `EventSink`.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use rust_embed::RustEmbed;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::model::DownloadRequest;
use crate::progress::{classify_stderr, parse_progress_line, strip_ansi, PROGRESS_TEMPLATE};
use crate::selection::FormatSelection;

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

/// Callback surface a fetch operation reports through while it runs.
pub trait EventSink: Send + Sync {
    fn progress(&self, percent: f32);
    fn log(&self, line: String);
}

/// One format entry from the tool's metadata dump. Audio-only formats
/// carry no height.
#[derive(Clone, Debug, Deserialize)]
pub struct FormatInfo {
    pub height: Option<u32>,
}

/// Result of a metadata-only extraction: no bytes fetched.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProbeInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub formats: Vec<FormatInfo>,
}

impl ProbeInfo {
    /// Distinct available vertical resolutions, ascending. Formats without
    /// a height (audio-only) are excluded.
    pub fn resolutions(&self) -> Vec<u32> {
        let set: BTreeSet<u32> = self.formats.iter().filter_map(|f| f.height).collect();
        set.into_iter().collect()
    }

    /// Highest vertical resolution on offer, if any video format exists.
    pub fn max_height(&self) -> Option<u32> {
        self.formats.iter().filter_map(|f| f.height).max()
    }
}

/// The external fetch operation pair the task runner needs.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Metadata-only extraction for a URL.
    async fn probe(&self, url: &str, sink: &dyn EventSink) -> Result<ProbeInfo, FetchError>;

    /// Download and post-process according to the selection. Progress and
    /// log output flow through the sink; the result only says whether the
    /// whole pipeline succeeded.
    async fn download(
        &self,
        request: &DownloadRequest,
        selection: &FormatSelection,
        sink: &dyn EventSink,
    ) -> Result<(), FetchError>;
}

/// Production fetcher: shells out to a yt-dlp binary.
pub struct YtDlpFetcher {
    binary: PathBuf,
}

impl YtDlpFetcher {
    /// Resolve the yt-dlp binary: prefer a copy embedded at build time
    /// (unpacked once into the temp dir), otherwise fall back to PATH.
    pub fn locate() -> Result<Self, FetchError> {
        let name = if cfg!(target_os = "windows") {
            "yt-dlp.exe"
        } else {
            "yt-dlp"
        };

        if let Some(data) = Asset::get(name) {
            let target = std::env::temp_dir().join(name);
            if !target.exists() {
                let mut f = File::create(&target)?;
                f.write_all(&data.data)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755))?;
                }
            }
            debug!(path = %target.display(), "using embedded yt-dlp");
            return Ok(Self { binary: target });
        }

        let binary = which::which(name).map_err(|_| {
            FetchError::Config(format!("{name} not found on PATH and no embedded copy"))
        })?;
        debug!(path = %binary.display(), "using yt-dlp from PATH");
        Ok(Self { binary })
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn probe(&self, url: &str, sink: &dyn EventSink) -> Result<ProbeInfo, FetchError> {
        let output = Command::new(&self.binary)
            .args(["-J", "--no-download", url])
            .stdin(Stdio::null())
            .output()
            .await?;

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            if !line.trim().is_empty() {
                sink.log(classify_stderr(line));
            }
        }

        if !output.status.success() {
            let detail = String::from_utf8_lossy(&output.stderr)
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(strip_ansi)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(FetchError::Extraction(detail));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        selection: &FormatSelection,
        sink: &dyn EventSink,
    ) -> Result<(), FetchError> {
        let mut args = selection.to_args();
        args.push("--newline".to_owned());
        args.push("--progress-template".to_owned());
        args.push(PROGRESS_TEMPLATE.to_owned());
        args.push("-o".to_owned());
        args.push(format!("{}/%(title)s.%(ext)s", request.dest_dir.display()));
        args.push(request.url.clone());

        debug!(?args, "spawning yt-dlp");
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::Download("stdout pipe missing".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::Download("stderr pipe missing".into()))?;

        // Drain both pipes concurrently; stderr keeps its last line as the
        // failure diagnostic.
        let stdout_side = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                match parse_progress_line(&line) {
                    Some(pct) => sink.progress(pct),
                    None => {
                        let clean = strip_ansi(&line);
                        if !clean.trim().is_empty() {
                            sink.log(clean);
                        }
                    }
                }
            }
            Ok::<(), std::io::Error>(())
        };
        let stderr_side = async {
            let mut last = None;
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines.next_line().await? {
                let clean = strip_ansi(&line);
                if clean.trim().is_empty() {
                    continue;
                }
                sink.log(classify_stderr(&clean));
                last = Some(clean);
            }
            Ok::<Option<String>, std::io::Error>(last)
        };
        let (out_res, err_res) = tokio::join!(stdout_side, stderr_side);
        out_res?;
        let last_err = err_res?;

        let status = child.wait().await?;
        if status.success() {
            return Ok(());
        }

        let detail = last_err.unwrap_or_else(|| format!("yt-dlp exited with {status}"));
        warn!(%detail, "download failed");
        // Post-processing failures surface through ffmpeg on stderr.
        if detail.contains("ffmpeg") || detail.contains("Postprocessing") {
            Err(FetchError::Transcode(detail))
        } else {
            Err(FetchError::Download(detail))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(heights: &[Option<u32>]) -> ProbeInfo {
        ProbeInfo {
            title: None,
            formats: heights.iter().map(|h| FormatInfo { height: *h }).collect(),
        }
    }

    #[test]
    fn resolutions_are_distinct_sorted_and_skip_audio() {
        let probe = info(&[
            Some(144),
            Some(144),
            Some(360),
            Some(720),
            Some(1080),
            None,
        ]);
        assert_eq!(probe.resolutions(), vec![144, 360, 720, 1080]);
    }

    #[test]
    fn max_height_ignores_audio_formats() {
        let probe = info(&[None, Some(480), Some(1080)]);
        assert_eq!(probe.max_height(), Some(1080));
        assert_eq!(info(&[None]).max_height(), None);
    }

    #[test]
    fn metadata_json_deserializes_with_extra_fields() {
        let raw = r#"{
            "title": "clip",
            "formats": [
                {"format_id": "140", "ext": "m4a"},
                {"format_id": "22", "ext": "mp4", "height": 720}
            ],
            "uploader": "someone"
        }"#;
        let probe: ProbeInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(probe.title.as_deref(), Some("clip"));
        assert_eq!(probe.resolutions(), vec![720]);
    }
}
