//! End-to-end room scenarios driven through the public coordinator API with a
//! manual clock.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use syncroom_core::services::download::DownloadError;
use syncroom_core::{
    Clock, DownloadEvent, DownloadService, DownloadStatus, EventEmitter, FetchTool, Intent,
    ManualClock, MediaLibrary, PlaybackError, RoomError, RoomEvent, RoomService, TokioSpawner,
    Track,
};

#[derive(Default)]
struct Recorder {
    room: Mutex<Vec<RoomEvent>>,
    downloads: Mutex<Vec<DownloadEvent>>,
}

impl Recorder {
    fn state_changes(&self) -> usize {
        self.room
            .lock()
            .iter()
            .filter(|e| matches!(e, RoomEvent::StateChanged { .. }))
            .count()
    }
}

impl EventEmitter for Recorder {
    fn emit_room(&self, event: RoomEvent) {
        self.room.lock().push(event);
    }

    fn emit_download(&self, event: DownloadEvent) {
        self.downloads.lock().push(event);
    }
}

struct Harness {
    rooms: Arc<RoomService>,
    clock: Arc<ManualClock>,
    events: Arc<Recorder>,
    _tmp: tempfile::TempDir,
}

fn harness(track_count: usize) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let songs = tmp.path().join("songs");
    std::fs::create_dir_all(&songs).unwrap();
    let tracks: Vec<Track> = (0..track_count)
        .map(|i| {
            let title = format!("Song {}", i);
            let filename = format!("Artist - {}.mp3", title);
            Track::new(title, "Artist", filename)
        })
        .collect();
    let manifest = tmp.path().join("songs.json");
    std::fs::write(&manifest, serde_json::to_vec(&tracks).unwrap()).unwrap();

    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let events = Arc::new(Recorder::default());
    let rooms = Arc::new(RoomService::new(
        Arc::new(MediaLibrary::open(songs, manifest)),
        Arc::clone(&events) as Arc<dyn EventEmitter>,
        Arc::clone(&clock) as Arc<dyn Clock>,
    ));
    Harness {
        rooms,
        clock,
        events,
        _tmp: tmp,
    }
}

#[test]
fn play_then_pause_freezes_elapsed_position() {
    let h = harness(5);
    let created = h.rooms.create_room("ws-1", "ABC123", "Alice", None).unwrap();
    assert_eq!(created.state.current_index, 0);
    assert!(!created.state.is_playing);

    let played = h.rooms.handle_intent("ws-1", Intent::Play).unwrap();
    assert!(played.state.is_playing);
    assert_eq!(played.state.started_at, Some(h.clock.now_millis()));

    h.clock.advance(2_000);
    let paused = h.rooms.handle_intent("ws-1", Intent::Pause).unwrap();
    assert!(!paused.state.is_playing);
    assert!((paused.state.position_sec - 2.0).abs() < 1e-9);
    assert_eq!(paused.state.started_at, None);
}

#[test]
fn next_wraps_from_last_track() {
    let h = harness(3);
    h.rooms.create_room("ws-1", "ABC123", "Alice", None).unwrap();
    h.rooms
        .handle_intent("ws-1", Intent::SelectIndex(2))
        .unwrap();
    h.clock.advance(10_000);

    let receipt = h.rooms.handle_intent("ws-1", Intent::Next).unwrap();
    assert_eq!(receipt.state.current_index, 0);
    assert_eq!(receipt.state.position_sec, 0.0);
}

#[test]
fn last_member_leaving_removes_room() {
    let h = harness(2);
    h.rooms.create_room("ws-1", "ABC123", "Alice", None).unwrap();

    let left = h.rooms.leave_room("ws-1").unwrap();
    assert!(left.room_closed);
    assert_eq!(h.rooms.room_count(), 0);
    assert!(h.rooms.leave_room("ws-1").is_none());

    let err = h
        .rooms
        .rejoin_room("ws-2", "ABC123", "Alice", None)
        .unwrap_err();
    assert_eq!(err, RoomError::RoomGone("ABC123".into()));
}

#[test]
fn host_departure_promotes_exactly_one_member() {
    let h = harness(2);
    h.rooms.create_room("ws-1", "ABC123", "Alice", None).unwrap();
    h.rooms.join_room("ws-2", "ABC123", "Bob", None).unwrap();
    h.rooms.join_room("ws-3", "ABC123", "Carol", None).unwrap();
    assert!(h.rooms.is_host("ws-1"));

    let left = h.rooms.leave_room("ws-1").unwrap();
    let new_host = left.new_host.unwrap();
    assert_eq!(new_host.connection_id, "ws-2");

    let hosts = ["ws-2", "ws-3"]
        .iter()
        .filter(|conn| h.rooms.is_host(conn))
        .count();
    assert_eq!(hosts, 1);
    assert!(h.events.room.lock().iter().any(|e| matches!(
        e,
        RoomEvent::HostChanged { host_connection, .. } if host_connection == "ws-2"
    )));
}

#[test]
fn negative_seek_clamps_to_zero() {
    let h = harness(5);
    h.rooms.create_room("ws-1", "ABC123", "Alice", None).unwrap();
    let receipt = h.rooms.handle_intent("ws-1", Intent::Seek(-5.0)).unwrap();
    assert_eq!(receipt.state.position_sec, 0.0);
}

#[test]
fn out_of_range_index_is_rejected_without_broadcast() {
    let h = harness(5);
    let created = h.rooms.create_room("ws-1", "ABC123", "Alice", None).unwrap();
    let before = h.events.state_changes();

    let err = h
        .rooms
        .handle_intent("ws-1", Intent::SelectIndex(99))
        .unwrap_err();
    assert!(matches!(
        err,
        RoomError::Playback(PlaybackError::InvalidIndex(_))
    ));
    assert_eq!(h.events.state_changes(), before);
    let snapshot = h.rooms.snapshot_for("ws-1").unwrap();
    assert_eq!(snapshot.state, created.state);
}

#[test]
fn resumed_session_keeps_host_role() {
    let h = harness(2);
    let created = h
        .rooms
        .create_room("ws-1", "ABC123", "Alice", Some("token-a"))
        .unwrap();
    h.rooms.join_room("ws-2", "ABC123", "Bob", None).unwrap();

    let resumed = h
        .rooms
        .rejoin_room("ws-9", "ABC123", "Alice", Some(&created.session_token))
        .unwrap();
    assert!(resumed.is_host);
    assert_eq!(resumed.member_count, 2);
    assert_eq!(resumed.replaced_connection.as_deref(), Some("ws-1"));
    assert!(h.rooms.room_of("ws-1").is_none());
}

struct FakeTool {
    songs_dir: std::path::PathBuf,
}

#[async_trait]
impl FetchTool for FakeTool {
    async fn fetch(
        &self,
        query: &str,
        on_progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), DownloadError> {
        on_progress(50.0);
        std::fs::write(self.songs_dir.join(format!("{}.mp3", query)), b"")
            .map_err(|e| DownloadError::Io(e.to_string()))?;
        Ok(())
    }
}

#[tokio::test]
async fn completed_download_extends_room_playlist() {
    let h = harness(1);
    h.rooms.create_room("ws-1", "ABC123", "Alice", None).unwrap();
    let tool = Arc::new(FakeTool {
        songs_dir: h.rooms.library().songs_dir().to_path_buf(),
    });
    let downloads = DownloadService::new(
        tool,
        Arc::clone(&h.rooms),
        Arc::clone(&h.events) as Arc<dyn EventEmitter>,
        TokioSpawner::current(),
    );

    let record = downloads.start("Band - New Song").unwrap();
    let final_record = loop {
        let current = downloads.get(&record.id).unwrap();
        if current.status != DownloadStatus::Running {
            break current;
        }
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    };
    assert_eq!(final_record.status, DownloadStatus::Completed);
    assert_eq!(final_record.progress, 100.0);

    let snapshot = h.rooms.snapshot_for("ws-1").unwrap();
    assert!(snapshot
        .state
        .playlist
        .iter()
        .any(|t| t.filename == "Band - New Song.mp3"));
}
