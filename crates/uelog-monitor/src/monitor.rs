use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use crate::error::{MonitorError, Result};
use uelog_types::MonitorStatus;

/// Default polling interval
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `start_monitoring` waits for the task to reach Running, and
/// how long `stop_monitoring` waits for the task to join
const STARTUP_TIMEOUT: Duration = Duration::from_secs(1);

/// Callback invoked with the watched path and a non-empty batch of new lines
pub type LineCallback = dyn Fn(&Path, &[String]) + Send + Sync;

/// Snapshot of monitor state, readable from any thread
#[derive(Clone, Copy, Debug)]
pub struct MonitorStats {
    pub status: MonitorStatus,
    pub last_size: u64,
    pub last_read_offset: u64,
    pub lines_processed: u64,
    pub callbacks_triggered: u64,
}

/// Fields written by the background task and read by the owner.
///
/// The task is the sole writer of the offset/size/status fields once
/// monitoring has started.
struct Shared {
    status: AtomicU8,
    last_size: AtomicU64,
    last_read_offset: AtomicU64,
    lines_processed: AtomicU64,
    callbacks_triggered: AtomicU64,
    last_write_time: RwLock<Option<SystemTime>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(MonitorStatus::Stopped.as_u8()),
            last_size: AtomicU64::new(0),
            last_read_offset: AtomicU64::new(0),
            lines_processed: AtomicU64::new(0),
            callbacks_triggered: AtomicU64::new(0),
            last_write_time: RwLock::new(None),
        }
    }

    fn status(&self) -> MonitorStatus {
        MonitorStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: MonitorStatus) {
        self.status.store(status.as_u8(), Ordering::SeqCst);
    }
}

/// Watches one file for appended content on a background polling task.
///
/// The callback runs synchronously on the task, so callers sharing entry
/// collections between their own thread and the callback must synchronize
/// them externally.
pub struct FileMonitor {
    shared: Arc<Shared>,
    callback: Option<Arc<LineCallback>>,
    poll_interval: Duration,
    path: Option<PathBuf>,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl FileMonitor {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            callback: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            path: None,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Register the callback that receives new lines. Must be set before
    /// `start_monitoring`.
    pub fn set_callback(&mut self, callback: impl Fn(&Path, &[String]) + Send + Sync + 'static) {
        self.callback = Some(Arc::new(callback));
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    pub fn status(&self) -> MonitorStatus {
        self.shared.status()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            status: self.shared.status(),
            last_size: self.shared.last_size.load(Ordering::SeqCst),
            last_read_offset: self.shared.last_read_offset.load(Ordering::SeqCst),
            lines_processed: self.shared.lines_processed.load(Ordering::SeqCst),
            callbacks_triggered: self.shared.callbacks_triggered.load(Ordering::SeqCst),
        }
    }

    /// Start watching `path`. The initial read offset is seeded to the
    /// current end of file, so only content appended after this call is
    /// ever delivered. Blocks up to one second waiting for the background
    /// task to reach `Running`.
    pub async fn start_monitoring(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.is_running() {
            return Err(MonitorError::AlreadyRunning);
        }
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(MonitorError::EmptyPath);
        }
        let Some(callback) = self.callback.clone() else {
            return Err(MonitorError::NoCallback);
        };
        let metadata = check_file_exists(path)?;

        let size = metadata.len();
        self.shared.set_status(MonitorStatus::Starting);
        self.shared.last_size.store(size, Ordering::SeqCst);
        self.shared.last_read_offset.store(size, Ordering::SeqCst);
        self.shared.lines_processed.store(0, Ordering::SeqCst);
        self.shared.callbacks_triggered.store(0, Ordering::SeqCst);
        *self.shared.last_write_time.write() = metadata.modified().ok();

        let (ready_tx, mut ready_rx) = tokio::sync::watch::channel(false);
        self.cancel = CancellationToken::new();
        self.path = Some(path.to_path_buf());

        let task = tokio::spawn(poll_loop(
            path.to_path_buf(),
            Arc::clone(&self.shared),
            callback,
            self.poll_interval,
            self.cancel.clone(),
            ready_tx,
        ));
        self.task = Some(task);

        let ready = tokio::time::timeout(STARTUP_TIMEOUT, ready_rx.wait_for(|r| *r)).await;
        if !matches!(ready, Ok(Ok(_))) {
            tracing::warn!(file = %path.display(), "monitor task failed to start in time");
            self.force_stop().await;
            return Err(MonitorError::StartTimeout);
        }

        tracing::info!(file = %path.display(), "monitoring started");
        Ok(())
    }

    /// Stop monitoring and join the background task. Idempotent; returns
    /// success immediately when nothing is running.
    pub async fn stop_monitoring(&mut self) -> Result<()> {
        if self.task.is_none() {
            self.shared.set_status(MonitorStatus::Stopped);
            return Ok(());
        }
        self.shared.set_status(MonitorStatus::Stopping);
        self.force_stop().await;
        self.shared.set_status(MonitorStatus::Stopped);
        tracing::info!("monitoring stopped");
        Ok(())
    }

    async fn force_stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(STARTUP_TIMEOUT, task).await.is_err() {
                tracing::warn!("monitor task did not exit in time");
            }
        }
        self.path = None;
    }
}

impl Default for FileMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FileMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Verify that `path` names an existing regular file
pub fn check_file_exists(path: &Path) -> Result<std::fs::Metadata> {
    let metadata = std::fs::metadata(path)
        .map_err(|_| MonitorError::FileNotFound(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(MonitorError::NotAFile(path.to_path_buf()));
    }
    Ok(metadata)
}

/// Background polling loop. Runs until cancelled; a failed cycle marks the
/// status `Error` and polling continues after the normal sleep.
async fn poll_loop(
    path: PathBuf,
    shared: Arc<Shared>,
    callback: Arc<LineCallback>,
    poll_interval: Duration,
    cancel: CancellationToken,
    ready_tx: tokio::sync::watch::Sender<bool>,
) {
    shared.set_status(MonitorStatus::Running);
    let _ = ready_tx.send(true);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }

        match poll_cycle(&path, &shared, &callback).await {
            Ok(()) => {
                if shared.status() == MonitorStatus::Error {
                    shared.set_status(MonitorStatus::Running);
                }
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "poll cycle failed");
                shared.set_status(MonitorStatus::Error);
            }
        }
    }

    shared.set_status(MonitorStatus::Stopped);
}

/// One polling cycle: detect growth or truncation, read the new byte range,
/// split it into lines and invoke the callback once.
///
/// The read offset always advances to the new end of file, so a trailing
/// fragment without a newline is delivered as a line rather than carried
/// over to the next cycle.
async fn poll_cycle(path: &Path, shared: &Shared, callback: &Arc<LineCallback>) -> std::io::Result<()> {
    let metadata = tokio::fs::metadata(path).await?;
    let size = metadata.len();
    let mtime = metadata.modified().ok();

    let unchanged =
        size == shared.last_size.load(Ordering::SeqCst) && mtime == *shared.last_write_time.read();
    if unchanged {
        return Ok(());
    }

    shared.last_size.store(size, Ordering::SeqCst);
    *shared.last_write_time.write() = mtime;

    let mut offset = shared.last_read_offset.load(Ordering::SeqCst);
    if size < offset {
        tracing::info!(
            file = %path.display(),
            old_offset = offset,
            new_size = size,
            "file truncated or rotated, reading from the start"
        );
        offset = 0;
    }
    if size == offset {
        shared.last_read_offset.store(offset, Ordering::SeqCst);
        return Ok(());
    }

    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = Vec::with_capacity((size - offset) as usize);
    file.take(size - offset).read_to_end(&mut buf).await?;

    shared
        .last_read_offset
        .store(offset + buf.len() as u64, Ordering::SeqCst);

    let text = String::from_utf8_lossy(&buf);
    let mut segments: Vec<&str> = text.split('\n').collect();
    if segments.last() == Some(&"") {
        segments.pop();
    }
    let lines: Vec<String> = segments
        .iter()
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect();

    if !lines.is_empty() {
        shared
            .lines_processed
            .fetch_add(lines.len() as u64, Ordering::SeqCst);
        shared.callbacks_triggered.fetch_add(1, Ordering::SeqCst);
        (callback.as_ref())(path, &lines);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tokio::sync::mpsc;

    const TEST_POLL: Duration = Duration::from_millis(25);
    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    fn channel_monitor() -> (FileMonitor, mpsc::UnboundedReceiver<Vec<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut monitor = FileMonitor::new();
        monitor.set_poll_interval(TEST_POLL);
        monitor.set_callback(move |_path, lines| {
            let _ = tx.send(lines.to_vec());
        });
        (monitor, rx)
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Vec<String>>) -> Vec<String> {
        tokio::time::timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("callback within timeout")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_appended_lines_are_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "old line\n").unwrap();

        let (mut monitor, mut rx) = channel_monitor();
        monitor.start_monitoring(&path).await.unwrap();
        assert_eq!(monitor.status(), MonitorStatus::Running);

        tokio::time::sleep(Duration::from_millis(100)).await;
        append(&path, "LogA: Info: one\nLogA: Info: two\n");

        let lines = recv(&mut rx).await;
        assert_eq!(lines, vec!["LogA: Info: one", "LogA: Info: two"]);

        let stats = monitor.stats();
        assert_eq!(stats.lines_processed, 2);
        assert_eq!(stats.callbacks_triggered, 1);

        monitor.stop_monitoring().await.unwrap();
    }

    #[tokio::test]
    async fn test_content_before_start_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "never delivered\n").unwrap();

        let (mut monitor, mut rx) = channel_monitor();
        monitor.start_monitoring(&path).await.unwrap();

        append(&path, "after start\n");
        let lines = recv(&mut rx).await;
        assert_eq!(lines, vec!["after start"]);

        monitor.stop_monitoring().await.unwrap();
    }

    #[tokio::test]
    async fn test_truncation_resets_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "a fairly long first generation line\n").unwrap();

        let (mut monitor, mut rx) = channel_monitor();
        monitor.start_monitoring(&path).await.unwrap();

        append(&path, "tail one\n");
        assert_eq!(recv(&mut rx).await, vec!["tail one"]);

        // Rotate: replace the file with shorter content
        std::fs::write(&path, "fresh\n").unwrap();
        let lines = recv(&mut rx).await;
        assert_eq!(lines, vec!["fresh"]);
        assert_eq!(monitor.stats().last_read_offset, "fresh\n".len() as u64);

        monitor.stop_monitoring().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "").unwrap();

        let (mut monitor, _rx) = channel_monitor();
        monitor.start_monitoring(&path).await.unwrap();

        monitor.stop_monitoring().await.unwrap();
        monitor.stop_monitoring().await.unwrap();
        assert_eq!(monitor.status(), MonitorStatus::Stopped);
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_start_failure_modes() {
        let (mut monitor, _rx) = channel_monitor();
        assert!(matches!(
            monitor.start_monitoring("").await,
            Err(MonitorError::EmptyPath)
        ));
        assert!(matches!(
            monitor.start_monitoring("/nonexistent/uelog.log").await,
            Err(MonitorError::FileNotFound(_))
        ));

        let mut no_callback = FileMonitor::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            no_callback.start_monitoring(&path).await,
            Err(MonitorError::NoCallback)
        ));

        monitor.start_monitoring(&path).await.unwrap();
        assert!(matches!(
            monitor.start_monitoring(&path).await,
            Err(MonitorError::AlreadyRunning)
        ));
        monitor.stop_monitoring().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_mid_flight_keeps_polling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "").unwrap();

        let (mut monitor, mut rx) = channel_monitor();
        monitor.start_monitoring(&path).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(monitor.status(), MonitorStatus::Error);
        assert!(monitor.is_running());

        // The file reappearing recovers the session
        std::fs::write(&path, "back\n").unwrap();
        let lines = recv(&mut rx).await;
        assert_eq!(lines, vec!["back"]);

        monitor.stop_monitoring().await.unwrap();
    }
}
