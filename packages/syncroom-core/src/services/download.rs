//! Download jobs driven by an external fetch tool.
//!
//! A job runs `command [args...] <query>` in the background, parses progress
//! from the tool's output and rescans the library on success. Job records
//! live in memory only, and only the most recent finished jobs are kept.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::events::{DownloadEvent, EventEmitter};
use crate::protocol_constants::{DOWNLOAD_ID_PREFIX, MAX_FINISHED_DOWNLOADS};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::room_service::RoomService;
use crate::state::DownloadConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("Query or URL is required")]
    EmptyQuery,

    #[error("Failed to start download tool: {0}")]
    Spawn(String),

    #[error("{0}")]
    ToolFailed(String),

    #[error("Download I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Running,
    Completed,
    Failed,
}

/// One download job as shown to clients (`download:update`, `GET /api/downloads`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub id: String,
    /// The query as submitted.
    pub title: String,
    pub status: DownloadStatus,
    /// Percent, 0-100.
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: u64,
}

impl DownloadRecord {
    pub fn running(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: DownloadStatus::Running,
            progress: 0.0,
            error: None,
            started_at: 0,
        }
    }
}

/// Something that fetches audio for a query into the songs directory.
#[async_trait]
pub trait FetchTool: Send + Sync {
    /// Runs to completion, reporting progress percentages along the way.
    async fn fetch(
        &self,
        query: &str,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), DownloadError>;
}

/// Parses a `[download]  42.3%` progress line. Returns the clamped percentage.
pub fn parse_progress(line: &str) -> Option<f64> {
    const MARKER: &str = "[download]";
    // ASCII lowercasing keeps byte offsets, so indices carry over to `line`.
    let start = line.to_ascii_lowercase().find(MARKER)? + MARKER.len();
    let rest = &line[start..];
    let number = rest.trim_start();
    if number.len() == rest.len() {
        return None;
    }
    let end = number.find('%')?;
    let number = &number[..end];
    if !number.starts_with(|c: char| c.is_ascii_digit())
        || !number.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return None;
    }
    number.parse::<f64>().ok().map(|p| p.clamp(0.0, 100.0))
}

/// Runs an external command per download.
pub struct CommandFetchTool {
    config: DownloadConfig,
}

impl CommandFetchTool {
    pub fn new(config: DownloadConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FetchTool for CommandFetchTool {
    async fn fetch(
        &self,
        query: &str,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), DownloadError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .arg(query)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| DownloadError::Spawn(format!("{}: {}", self.config.command, e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Io("stdout not captured".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Io("stderr not captured".into()))?;

        let mut errors = Vec::new();
        let (pumped, collected, status) = tokio::join!(
            pump_progress(stdout, on_progress),
            stderr.read_to_end(&mut errors),
            child.wait(),
        );
        if let Err(e) = pumped {
            log::warn!("[Download] Failed to read tool output: {}", e);
        }
        if let Err(e) = collected {
            log::warn!("[Download] Failed to read tool errors: {}", e);
        }
        let status = status.map_err(|e| DownloadError::Io(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            let message = String::from_utf8_lossy(&errors).trim().to_string();
            Err(DownloadError::ToolFailed(if message.is_empty() {
                "Unknown error".to_string()
            } else {
                message
            }))
        }
    }
}

/// Feeds every `\r`/`\n` terminated line through [`parse_progress`].
async fn pump_progress<R: AsyncRead + Unpin>(
    mut reader: R,
    on_progress: &(dyn Fn(f64) + Send + Sync),
) -> std::io::Result<()> {
    let mut chunk = [0u8; 4096];
    let mut pending = Vec::new();
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&chunk[..n]);
        while let Some(pos) = pending.iter().position(|b| *b == b'\n' || *b == b'\r') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            if let Some(p) = parse_progress(&String::from_utf8_lossy(&line)) {
                on_progress(p);
            }
        }
    }
    if let Some(p) = parse_progress(&String::from_utf8_lossy(&pending)) {
        on_progress(p);
    }
    Ok(())
}

/// Job table plus the emitter; cloned into every running job.
#[derive(Clone)]
struct JobBook {
    jobs: Arc<DashMap<String, DownloadRecord>>,
    /// Finished job ids, oldest first.
    finished: Arc<Mutex<VecDeque<String>>>,
    finished_limit: usize,
    emitter: Arc<dyn EventEmitter>,
}

impl JobBook {
    /// Mutates a record and emits it if `f` reports a change.
    fn update(&self, id: &str, f: impl FnOnce(&mut DownloadRecord) -> bool) {
        let changed = match self.jobs.get_mut(id) {
            Some(mut record) => f(&mut record).then(|| record.clone()),
            None => None,
        };
        if let Some(job) = changed {
            self.emitter.emit_download(DownloadEvent::Updated { job });
        }
    }

    /// Records a job as finished and drops the oldest finished records
    /// beyond the limit. Running jobs are never dropped.
    fn retire(&self, id: &str) {
        let mut finished = self.finished.lock();
        finished.push_back(id.to_string());
        while finished.len() > self.finished_limit.max(1) {
            if let Some(old) = finished.pop_front() {
                self.jobs.remove(&old);
                log::debug!("[Download] Dropped finished job {}", old);
            }
        }
    }
}

pub struct DownloadService {
    tool: Arc<dyn FetchTool>,
    book: JobBook,
    rooms: Arc<RoomService>,
    spawner: TokioSpawner,
}

impl DownloadService {
    pub fn new(
        tool: Arc<dyn FetchTool>,
        rooms: Arc<RoomService>,
        emitter: Arc<dyn EventEmitter>,
        spawner: TokioSpawner,
    ) -> Self {
        Self {
            tool,
            book: JobBook {
                jobs: Arc::new(DashMap::new()),
                finished: Arc::new(Mutex::new(VecDeque::new())),
                finished_limit: MAX_FINISHED_DOWNLOADS,
                emitter,
            },
            rooms,
            spawner,
        }
    }

    /// Overrides how many finished jobs are kept (at least one).
    pub fn with_finished_limit(mut self, limit: usize) -> Self {
        self.book.finished_limit = limit;
        self
    }

    /// Starts a download job in the background and returns its initial record.
    pub fn start(&self, query: &str) -> Result<DownloadRecord, DownloadError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DownloadError::EmptyQuery);
        }

        let id = format!("{}{}", DOWNLOAD_ID_PREFIX, uuid::Uuid::new_v4().simple());
        let mut record = DownloadRecord::running(&id, query);
        record.started_at = self.rooms.now_ms();
        self.book.jobs.insert(id.clone(), record.clone());
        self.book.emitter.emit_download(DownloadEvent::Updated {
            job: record.clone(),
        });
        log::info!("[Download] {} started: {}", id, query);

        let tool = Arc::clone(&self.tool);
        let book = self.book.clone();
        let rooms = Arc::clone(&self.rooms);
        let query = query.to_string();
        self.spawner.spawn(async move {
            run_job(tool, book, rooms, id, query).await;
        });

        Ok(record)
    }

    /// Running jobs plus the most recent finished ones, oldest first.
    pub fn list(&self) -> Vec<DownloadRecord> {
        let mut jobs: Vec<DownloadRecord> = self
            .book
            .jobs
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        jobs
    }

    pub fn get(&self, id: &str) -> Option<DownloadRecord> {
        self.book.jobs.get(id).map(|entry| entry.value().clone())
    }
}

async fn run_job(
    tool: Arc<dyn FetchTool>,
    book: JobBook,
    rooms: Arc<RoomService>,
    id: String,
    query: String,
) {
    let on_progress = |p: f64| {
        book.update(&id, |record| {
            if record.status != DownloadStatus::Running || record.progress == p {
                return false;
            }
            record.progress = p;
            true
        });
    };

    match tool.fetch(&query, &on_progress).await {
        Ok(()) => {
            if let Err(e) = rooms.refresh_library().await {
                log::warn!("[Download] {} finished but library refresh failed: {}", id, e);
            }
            book.retire(&id);
            book.update(&id, |record| {
                record.status = DownloadStatus::Completed;
                record.progress = 100.0;
                true
            });
            log::info!("[Download] {} completed", id);
        }
        Err(e) => {
            log::warn!("[Download] {} failed: {}", id, e);
            book.retire(&id);
            book.update(&id, |record| {
                record.status = DownloadStatus::Failed;
                record.progress = 0.0;
                record.error = Some(e.to_string());
                true
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{NoopEventEmitter, RoomEvent};
    use crate::services::library::MediaLibrary;
    use crate::utils::ManualClock;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn progress_lines() {
        assert_eq!(parse_progress("[download]  42.3% of 3.2MiB"), Some(42.3));
        assert_eq!(parse_progress("[DOWNLOAD] 7%"), Some(7.0));
        assert_eq!(parse_progress("[download] 100% of 1MiB in 00:01"), Some(100.0));
        assert_eq!(parse_progress("[download] Destination: x.mp3"), None);
        assert_eq!(parse_progress("[download]42%"), None);
        assert_eq!(parse_progress("[download]  .5%"), None);
        assert_eq!(parse_progress("[ffmpeg] 50%"), None);
        assert_eq!(parse_progress("[download] 250%"), Some(100.0));
    }

    #[derive(Default)]
    struct RecordingEmitter {
        downloads: Mutex<Vec<DownloadRecord>>,
    }

    impl EventEmitter for RecordingEmitter {
        fn emit_room(&self, _event: RoomEvent) {}

        fn emit_download(&self, event: DownloadEvent) {
            let DownloadEvent::Updated { job } = event;
            self.downloads.lock().push(job);
        }
    }

    /// Writes a file into the songs dir, or fails, without a subprocess.
    struct FakeTool {
        songs_dir: PathBuf,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl FetchTool for FakeTool {
        async fn fetch(
            &self,
            query: &str,
            on_progress: &(dyn Fn(f64) + Send + Sync),
        ) -> Result<(), DownloadError> {
            on_progress(10.0);
            on_progress(10.0);
            on_progress(55.5);
            if let Some(message) = &self.fail_with {
                return Err(DownloadError::ToolFailed(message.clone()));
            }
            std::fs::write(self.songs_dir.join(format!("Fake - {query}.mp3")), b"")
                .map_err(|e| DownloadError::Io(e.to_string()))?;
            Ok(())
        }
    }

    fn harness(
        fail_with: Option<&str>,
    ) -> (DownloadService, Arc<RecordingEmitter>, Arc<RoomService>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let songs = tmp.path().join("songs");
        std::fs::create_dir_all(&songs).unwrap();
        let library = Arc::new(MediaLibrary::open(&songs, tmp.path().join("songs.json")));
        let rooms = Arc::new(RoomService::new(
            library,
            Arc::new(NoopEventEmitter),
            Arc::new(ManualClock::new(0)),
        ));
        let emitter = Arc::new(RecordingEmitter::default());
        let tool = Arc::new(FakeTool {
            songs_dir: songs,
            fail_with: fail_with.map(str::to_string),
        });
        let service = DownloadService::new(
            tool,
            Arc::clone(&rooms),
            emitter.clone(),
            TokioSpawner::current(),
        );
        (service, emitter, rooms, tmp)
    }

    async fn wait_until_done(service: &DownloadService, id: &str) -> DownloadRecord {
        for _ in 0..200 {
            if let Some(record) = service.get(id) {
                if record.status != DownloadStatus::Running {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("download {id} did not finish");
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let (service, _, _, _tmp) = harness(None);
        assert_eq!(service.start("   ").unwrap_err(), DownloadError::EmptyQuery);
        assert!(service.list().is_empty());
    }

    #[tokio::test]
    async fn successful_download_refreshes_library() {
        let (service, emitter, rooms, _tmp) = harness(None);
        let record = service.start("Song").unwrap();
        assert!(record.id.starts_with(DOWNLOAD_ID_PREFIX));
        assert_eq!(record.status, DownloadStatus::Running);

        let done = wait_until_done(&service, &record.id).await;
        assert_eq!(done.status, DownloadStatus::Completed);
        assert_eq!(done.progress, 100.0);
        assert_eq!(rooms.library().playlist()[0].title, "Song");

        let progress: Vec<f64> = emitter.downloads.lock().iter().map(|r| r.progress).collect();
        assert_eq!(progress, vec![0.0, 10.0, 55.5, 100.0]);
    }

    #[tokio::test]
    async fn failed_download_reports_error() {
        let (service, emitter, rooms, _tmp) = harness(Some("ERROR: no results"));
        let record = service.start("nothing").unwrap();

        let done = wait_until_done(&service, &record.id).await;
        assert_eq!(done.status, DownloadStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("ERROR: no results"));
        assert!(rooms.library().playlist().is_empty());
        let last = emitter.downloads.lock().last().cloned().unwrap();
        assert_eq!(last.status, DownloadStatus::Failed);
    }

    #[tokio::test]
    async fn only_recent_finished_jobs_are_kept() {
        let (service, _, _, _tmp) = harness(None);
        let service = service.with_finished_limit(2);

        let mut ids = Vec::new();
        for query in ["One", "Two", "Three", "Four"] {
            let record = service.start(query).unwrap();
            wait_until_done(&service, &record.id).await;
            ids.push(record.id);
        }

        let kept: Vec<String> = service.list().into_iter().map(|r| r.title).collect();
        assert_eq!(kept.len(), 2);
        assert!(kept.contains(&"Three".to_string()));
        assert!(kept.contains(&"Four".to_string()));
        assert!(service.get(&ids[0]).is_none());
        assert!(service.get(&ids[1]).is_none());
        assert!(service.get(&ids[3]).is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_tool_reports_progress_and_stderr() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tool = CommandFetchTool::new(DownloadConfig {
            command: "sh".into(),
            args: vec![
                "-c".into(),
                "printf '[download]  12.5%%\\r[download]  80%%\\n'; echo \"bad $1\" >&2; exit 2"
                    .into(),
                "fetch".into(),
            ],
            working_dir: None,
        });

        let sink = Arc::clone(&seen);
        let result = tool
            .fetch("query", &move |p: f64| sink.lock().push(p))
            .await;

        assert_eq!(*seen.lock(), vec![12.5, 80.0]);
        assert_eq!(result, Err(DownloadError::ToolFailed("bad query".into())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_command_is_a_spawn_error() {
        let tool = CommandFetchTool::new(DownloadConfig {
            command: "/nonexistent/syncroom-fetch".into(),
            ..DownloadConfig::default()
        });
        let result = tool.fetch("q", &|_: f64| {}).await;
        assert!(matches!(result, Err(DownloadError::Spawn(_))));
    }
}
