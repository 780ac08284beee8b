//! Background task runner: executes blocking fetch work off the UI thread
//! and relays a well-ordered notification stream back through one channel.
//!
//! Two named slots exist, one per task kind. A start request while the
//! same-kind slot is occupied is rejected; the UI re-enables its button
//! when the running task's terminal notification arrives. Notifications
//! carry the task's id so the observer can drop stale streams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::error::FetchError;
use crate::fetcher::{EventSink, Fetcher};
use crate::model::{DownloadRequest, TaskId, TaskKind, TaskNotification};
use crate::selection::select_format;

/// Sink implementation that tags every event with its task id and pushes
/// it onto the shared channel. Send failures mean the UI went away; they
/// are ignored.
struct ChannelSink {
    id: TaskId,
    tx: UnboundedSender<(TaskId, TaskNotification)>,
}

impl EventSink for ChannelSink {
    fn progress(&self, percent: f32) {
        let _ = self.tx.send((self.id, TaskNotification::Progress(percent)));
    }

    fn log(&self, line: String) {
        let _ = self.tx.send((self.id, TaskNotification::Log(line)));
    }
}

/// Clears a slot's busy flag when the worker finishes, even on a panic
/// inside the external call.
struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct TaskRunner {
    handle: Handle,
    fetcher: Arc<dyn Fetcher>,
    tx: UnboundedSender<(TaskId, TaskNotification)>,
    next_id: TaskId,
    probe_busy: Arc<AtomicBool>,
    download_busy: Arc<AtomicBool>,
}

impl TaskRunner {
    /// Create a runner executing on the given runtime, along with the
    /// receiver the UI drains each frame.
    pub fn new(
        handle: Handle,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, UnboundedReceiver<(TaskId, TaskNotification)>) {
        let (tx, rx) = unbounded_channel();
        let runner = Self {
            handle,
            fetcher,
            tx,
            next_id: 0,
            probe_busy: Arc::new(AtomicBool::new(false)),
            download_busy: Arc::new(AtomicBool::new(false)),
        };
        (runner, rx)
    }

    fn alloc_id(&mut self) -> TaskId {
        self.next_id += 1;
        self.next_id
    }

    /// Reserve a slot or report it busy. `swap` both checks and claims.
    fn claim(slot: &Arc<AtomicBool>, kind: TaskKind) -> Result<(), FetchError> {
        if slot.swap(true, Ordering::Acquire) {
            Err(FetchError::Busy(kind.name()))
        } else {
            Ok(())
        }
    }

    /// Start a metadata probe for a URL. Returns synchronously with the
    /// task id; the distinct ascending resolution set arrives later as
    /// the task's terminal `ResolutionsProbed` notification.
    pub fn start_probe(&mut self, url: &str) -> Result<TaskId, FetchError> {
        let url = url.trim().to_owned();
        if url.is_empty() {
            return Err(FetchError::Config("no video URL given".into()));
        }
        Self::claim(&self.probe_busy, TaskKind::Probe)?;

        let id = self.alloc_id();
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.tx.clone();
        let guard = SlotGuard(Arc::clone(&self.probe_busy));
        info!(id, %url, "starting probe task");

        self.handle.spawn(async move {
            let _guard = guard;
            let sink = ChannelSink { id, tx: tx.clone() };
            let terminal = match fetcher.probe(&url, &sink).await {
                Ok(info) => TaskNotification::ResolutionsProbed(info.resolutions()),
                Err(e) => TaskNotification::Failed(e.to_string()),
            };
            debug!(id, ?terminal, "probe task finished");
            // Free the slot before the terminal goes out, so an observer
            // reacting to it can start the next task immediately.
            drop(_guard);
            let _ = tx.send((id, terminal));
        });
        Ok(id)
    }

    /// Start a download. Validation runs here, before any worker exists;
    /// everything past this point is reported through notifications and
    /// never escapes the worker.
    pub fn start_download(&mut self, request: DownloadRequest) -> Result<TaskId, FetchError> {
        if request.url.trim().is_empty() {
            return Err(FetchError::Config("no video URL given".into()));
        }
        if request.dest_dir.as_os_str().is_empty() {
            return Err(FetchError::Config("no download folder selected".into()));
        }
        Self::claim(&self.download_busy, TaskKind::Download)?;

        let id = self.alloc_id();
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.tx.clone();
        let guard = SlotGuard(Arc::clone(&self.download_busy));
        info!(id, url = %request.url, quality = request.quality,
              container = %request.container, "starting download task");

        self.handle.spawn(async move {
            let _guard = guard;
            let sink = ChannelSink { id, tx: tx.clone() };

            let outcome = async {
                // One metadata pass first, to tell the user whether a
                // better rendition than requested exists. Informational
                // only; the download proceeds either way.
                let info = fetcher.probe(&request.url, &sink).await?;
                let higher = info.max_height().is_some_and(|h| h > request.quality);
                let _ = tx.send((id, TaskNotification::HigherQualityAvailable(higher)));

                let selection = select_format(request.quality, request.container);
                fetcher.download(&request, &selection, &sink).await
            }
            .await;

            let terminal = match outcome {
                Ok(()) => TaskNotification::Completed,
                Err(e) => TaskNotification::Failed(e.to_string()),
            };
            debug!(id, ?terminal, "download task finished");
            drop(_guard);
            let _ = tx.send((id, terminal));
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FormatInfo, ProbeInfo};
    use crate::selection::FormatSelection;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Scripted stand-in for the external tool.
    struct FakeFetcher {
        heights: Vec<Option<u32>>,
        probe_fails: bool,
        download_fails: bool,
        downloads: Mutex<u32>,
    }

    impl FakeFetcher {
        fn with_heights(heights: &[Option<u32>]) -> Self {
            Self {
                heights: heights.to_vec(),
                probe_fails: false,
                download_fails: false,
                downloads: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn probe(&self, _url: &str, sink: &dyn EventSink) -> Result<ProbeInfo, FetchError> {
            if self.probe_fails {
                return Err(FetchError::Extraction("no such video".into()));
            }
            sink.log("[youtube] extracting".into());
            Ok(ProbeInfo {
                title: Some("clip".into()),
                formats: self
                    .heights
                    .iter()
                    .map(|h| FormatInfo { height: *h })
                    .collect(),
            })
        }

        async fn download(
            &self,
            _request: &DownloadRequest,
            _selection: &FormatSelection,
            sink: &dyn EventSink,
        ) -> Result<(), FetchError> {
            *self.downloads.lock().unwrap() += 1;
            if self.download_fails {
                return Err(FetchError::Download("connection reset".into()));
            }
            sink.progress(50.0);
            sink.progress(100.0);
            Ok(())
        }
    }

    fn request() -> DownloadRequest {
        DownloadRequest {
            url: "https://example.com/watch?v=abc".into(),
            dest_dir: PathBuf::from("/tmp/out"),
            quality: 480,
            container: crate::model::Container::Mp4,
        }
    }

    async fn collect(
        rx: &mut UnboundedReceiver<(TaskId, TaskNotification)>,
        id: TaskId,
    ) -> Vec<TaskNotification> {
        let mut events = Vec::new();
        while let Some((got, n)) = rx.recv().await {
            if got != id {
                continue;
            }
            let terminal = n.is_terminal();
            events.push(n);
            if terminal {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn probe_reports_sorted_distinct_resolutions() {
        let fetcher = Arc::new(FakeFetcher::with_heights(&[
            Some(144),
            Some(144),
            Some(360),
            Some(720),
            Some(1080),
            None,
        ]));
        let (mut runner, mut rx) = TaskRunner::new(Handle::current(), fetcher);
        let id = runner.start_probe("https://example.com/v").unwrap();

        let events = collect(&mut rx, id).await;
        assert_eq!(
            events.last(),
            Some(&TaskNotification::ResolutionsProbed(vec![
                144, 360, 720, 1080
            ]))
        );
    }

    #[tokio::test]
    async fn download_announces_higher_quality_before_terminal() {
        let fetcher = Arc::new(FakeFetcher::with_heights(&[Some(480), Some(1080)]));
        let (mut runner, mut rx) = TaskRunner::new(Handle::current(), fetcher);
        let id = runner.start_download(request()).unwrap();

        let events = collect(&mut rx, id).await;
        let announcements: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n, TaskNotification::HigherQualityAvailable(_)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(announcements.len(), 1);
        assert_eq!(
            events[announcements[0]],
            TaskNotification::HigherQualityAvailable(true)
        );
        assert!(announcements[0] < events.len() - 1);
        assert_eq!(events.last(), Some(&TaskNotification::Completed));
    }

    #[tokio::test]
    async fn download_without_better_rendition_says_so() {
        let fetcher = Arc::new(FakeFetcher::with_heights(&[Some(360), Some(480)]));
        let (mut runner, mut rx) = TaskRunner::new(Handle::current(), fetcher);
        let id = runner.start_download(request()).unwrap();

        let events = collect(&mut rx, id).await;
        assert!(events.contains(&TaskNotification::HigherQualityAvailable(false)));
    }

    #[tokio::test]
    async fn failing_download_yields_exactly_one_failed_terminal() {
        let fetcher = Arc::new(FakeFetcher {
            download_fails: true,
            ..FakeFetcher::with_heights(&[Some(1080)])
        });
        let (mut runner, mut rx) = TaskRunner::new(Handle::current(), fetcher);
        let id = runner.start_download(request()).unwrap();

        let events = collect(&mut rx, id).await;
        let terminals: Vec<&TaskNotification> =
            events.iter().filter(|n| n.is_terminal()).collect();
        assert_eq!(terminals.len(), 1);
        match terminals[0] {
            TaskNotification::Failed(msg) => assert!(!msg.is_empty()),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_probe_during_download_skips_the_download() {
        let fetcher = Arc::new(FakeFetcher {
            probe_fails: true,
            ..FakeFetcher::with_heights(&[])
        });
        let shared: Arc<dyn Fetcher> = fetcher.clone();
        let (mut runner, mut rx) = TaskRunner::new(Handle::current(), shared);
        let id = runner.start_download(request()).unwrap();

        let events = collect(&mut rx, id).await;
        assert!(matches!(
            events.last(),
            Some(TaskNotification::Failed(msg)) if msg.contains("no such video")
        ));
        assert_eq!(*fetcher.downloads.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_url_is_rejected_before_any_worker_runs() {
        let fetcher = Arc::new(FakeFetcher::with_heights(&[Some(720)]));
        let shared: Arc<dyn Fetcher> = fetcher.clone();
        let (mut runner, mut rx) = TaskRunner::new(Handle::current(), shared);

        assert!(matches!(
            runner.start_probe("   "),
            Err(FetchError::Config(_))
        ));
        let mut req = request();
        req.url.clear();
        assert!(matches!(
            runner.start_download(req),
            Err(FetchError::Config(_))
        ));
        let mut req = request();
        req.dest_dir = PathBuf::new();
        assert!(matches!(
            runner.start_download(req),
            Err(FetchError::Config(_))
        ));

        assert!(rx.try_recv().is_err());
        assert_eq!(*fetcher.downloads.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn second_download_while_busy_is_rejected_then_allowed() {
        let fetcher = Arc::new(FakeFetcher::with_heights(&[Some(720)]));
        let (mut runner, mut rx) = TaskRunner::new(Handle::current(), fetcher);

        let id = runner.start_download(request()).unwrap();
        assert!(matches!(
            runner.start_download(request()),
            Err(FetchError::Busy("download"))
        ));

        // Slot frees once the first task reaches its terminal state.
        let _ = collect(&mut rx, id).await;
        let second = runner.start_download(request()).unwrap();
        assert!(second > id);
        let events = collect(&mut rx, second).await;
        assert_eq!(events.last(), Some(&TaskNotification::Completed));
    }
}
