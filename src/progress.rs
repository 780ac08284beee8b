//! Translation of yt-dlp's textual progress and log output into typed
//! notifications. Stateless: one line in, at most one event out.

use once_cell::sync::Lazy;
use regex::Regex;

/// Prefix we hand to `--progress-template` so progress lines are
/// distinguishable from ordinary output.
pub const PROGRESS_PREFIX: &str = "progress:";

/// Template passed to yt-dlp: `progress:<status>|<percent>`.
pub const PROGRESS_TEMPLATE: &str = "progress:%(progress.status)s|%(progress._percent_str)s";

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1B[@-_][0-?]*[ -/]*[@-~]").expect("valid ANSI pattern"));

/// Remove terminal control sequences; yt-dlp colors its percent strings.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Parse one stdout line into a progress percentage.
///
/// Returns `None` for non-progress lines and for progress payloads whose
/// percent field does not parse; the caller keeps its previous value in
/// that case. A `finished` tick always yields exactly 100 regardless of
/// the last intermediate figure.
pub fn parse_progress_line(line: &str) -> Option<f32> {
    let rest = line.strip_prefix(PROGRESS_PREFIX)?;
    let clean = strip_ansi(rest);
    let (status, percent) = clean.split_once('|')?;
    match status.trim() {
        "finished" => Some(100.0),
        "downloading" => {
            let number = percent.trim().strip_suffix('%')?;
            number.trim().parse::<f32>().ok().map(|v| v.clamp(0.0, 100.0))
        }
        _ => None,
    }
}

/// Preserve severity on the unstructured log channel: yt-dlp already tags
/// its warnings and errors on stderr; anything untagged there is treated
/// as an error.
pub fn classify_stderr(line: &str) -> String {
    if line.starts_with("WARNING:") || line.starts_with("ERROR:") {
        line.to_owned()
    } else {
        format!("ERROR: {line}")
    }
}
