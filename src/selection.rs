//! Format/quality selection policy: maps the user's quality ceiling and
//! container choice onto a concrete yt-dlp request.

use crate::model::Container;

/// Fixed audio-extraction target when the user asks for audio only.
const AUDIO_CODEC: &str = "mp3";
const AUDIO_QUALITY: &str = "192K";

/// Post-processing step attached to a download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostProcess {
    /// Remux/transcode the merged result into the given container.
    Recode { container: &'static str },
    /// Drop the video stream and extract audio at a fixed codec/quality.
    ExtractAudio {
        codec: &'static str,
        quality: &'static str,
    },
}

/// A fully resolved format request for the external tool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatSelection {
    pub format_expr: String,
    pub postprocess: PostProcess,
}

impl FormatSelection {
    /// Render the selection as yt-dlp command-line arguments.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-f".to_owned(), self.format_expr.clone()];
        match &self.postprocess {
            PostProcess::Recode { container } => {
                args.push("--recode-video".to_owned());
                args.push((*container).to_owned());
            }
            PostProcess::ExtractAudio { codec, quality } => {
                args.push("--extract-audio".to_owned());
                args.push("--audio-format".to_owned());
                args.push((*codec).to_owned());
                args.push("--audio-quality".to_owned());
                args.push((*quality).to_owned());
            }
        }
        args
    }
}

/// Pure mapping from (quality ceiling, container) to a format request.
///
/// Video containers get the best video at or below the ceiling merged with
/// the best audio, then a recode to the chosen container; the audio target
/// gets best audio only and an mp3 extraction at 192K.
pub fn select_format(quality: u32, container: Container) -> FormatSelection {
    if container.is_video() {
        FormatSelection {
            format_expr: format!("bestvideo[height<={quality}]+bestaudio/best"),
            postprocess: PostProcess::Recode {
                container: container.as_str(),
            },
        }
    } else {
        FormatSelection {
            format_expr: "bestaudio/best".to_owned(),
            postprocess: PostProcess::ExtractAudio {
                codec: AUDIO_CODEC,
                quality: AUDIO_QUALITY,
            },
        }
    }
}
