//! Media library: the songs directory and its playlist manifest.
//!
//! The cached playlist is an `Arc` snapshot swapped on reload, so readers
//! never block on a scan. Scans touch the filesystem and run on a blocking
//! thread; only one runs at a time.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::playback::Track;
use crate::protocol_constants::{AUDIO_EXTENSIONS, UNKNOWN_ARTIST};

/// Errors from scanning the songs directory or writing the manifest.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Library task failed: {0}")]
    Join(String),
}

impl LibraryError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub struct MediaLibrary {
    songs_dir: PathBuf,
    manifest_path: PathBuf,
    playlist: RwLock<Arc<Vec<Track>>>,
    /// Held across read dir, manifest write and swap.
    scan_lock: Mutex<()>,
}

impl MediaLibrary {
    /// Creates a library and loads its manifest. A missing or broken manifest
    /// yields an empty playlist.
    pub fn open(songs_dir: impl Into<PathBuf>, manifest_path: impl Into<PathBuf>) -> Self {
        let library = Self {
            songs_dir: songs_dir.into(),
            manifest_path: manifest_path.into(),
            playlist: RwLock::new(Arc::new(Vec::new())),
            scan_lock: Mutex::new(()),
        };
        library.load();
        library
    }

    pub fn songs_dir(&self) -> &Path {
        &self.songs_dir
    }

    /// Current playlist snapshot.
    pub fn playlist(&self) -> Arc<Vec<Track>> {
        Arc::clone(&self.playlist.read())
    }

    /// Re-reads the manifest into the cache.
    pub fn load(&self) -> Arc<Vec<Track>> {
        let tracks = match read_manifest(&self.manifest_path) {
            Ok(tracks) => {
                log::info!(
                    "[Library] Loaded {} tracks from {}",
                    tracks.len(),
                    self.manifest_path.display()
                );
                tracks
            }
            Err(LibraryError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                log::info!(
                    "[Library] No manifest at {}, starting with an empty playlist",
                    self.manifest_path.display()
                );
                Vec::new()
            }
            Err(e) => {
                log::warn!("[Library] {}; starting with an empty playlist", e);
                Vec::new()
            }
        };
        self.swap(tracks)
    }

    /// Scans the songs directory, rewrites the manifest and swaps the cache.
    ///
    /// Blocking; see [`MediaLibrary::rescan`] from async code.
    pub fn scan(&self) -> Result<Arc<Vec<Track>>, LibraryError> {
        let _scan = self.scan_lock.lock();
        let previous = self.playlist();
        let tracks = scan_dir(&self.songs_dir, &previous)?;
        write_manifest(&self.manifest_path, &tracks)?;
        log::info!(
            "[Library] Scanned {}: {} tracks",
            self.songs_dir.display(),
            tracks.len()
        );
        Ok(self.swap(tracks))
    }

    /// Runs [`MediaLibrary::scan`] on the blocking thread pool.
    pub async fn rescan(self: &Arc<Self>) -> Result<Arc<Vec<Track>>, LibraryError> {
        let library = Arc::clone(self);
        tokio::task::spawn_blocking(move || library.scan())
            .await
            .map_err(|e| LibraryError::Join(e.to_string()))?
    }

    fn swap(&self, tracks: Vec<Track>) -> Arc<Vec<Track>> {
        let tracks = Arc::new(tracks);
        *self.playlist.write() = Arc::clone(&tracks);
        tracks
    }
}

/// Builds a track from an audio filename of the form `Artist - Title.ext`.
///
/// Without the separator the whole stem is the title and the artist is
/// unknown. Empty halves fall back the same way.
pub fn track_from_filename(filename: &str) -> Track {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    let (artist, title) = match stem.split_once(" - ") {
        Some((artist, title)) => {
            let artist = match artist.trim() {
                "" => UNKNOWN_ARTIST,
                a => a,
            };
            let title = match title.trim() {
                "" => stem,
                t => t,
            };
            (artist, title)
        }
        None => (UNKNOWN_ARTIST, stem.trim()),
    };

    Track::new(title, artist, filename)
}

/// Reads a manifest file.
pub fn read_manifest(path: &Path) -> Result<Vec<Track>, LibraryError> {
    let data = std::fs::read(path).map_err(|e| LibraryError::io(path, e))?;
    Ok(serde_json::from_slice(&data)?)
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.as_str()))
}

fn scan_dir(dir: &Path, previous: &[Track]) -> Result<Vec<Track>, LibraryError> {
    std::fs::create_dir_all(dir).map_err(|e| LibraryError::io(dir, e))?;

    let mut filenames = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| LibraryError::io(dir, e))? {
        let entry = entry.map_err(|e| LibraryError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() || !is_audio_file(&path) {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => filenames.push(name),
            Err(name) => log::warn!("[Library] Skipping non UTF-8 filename {:?}", name),
        }
    }
    filenames.sort();

    Ok(filenames
        .iter()
        .map(|filename| {
            let mut track = track_from_filename(filename);
            track.duration_sec = previous
                .iter()
                .find(|t| &t.filename == filename)
                .and_then(|t| t.duration_sec)
                .or_else(|| read_duration(&dir.join(filename)));
            track
        })
        .collect())
}

/// Reads the length of an audio file from its container headers.
///
/// `None` when the format is unsupported or the stream does not declare
/// its frame count.
pub fn read_duration(path: &Path) -> Option<f64> {
    let file = std::fs::File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let opened = match symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    ) {
        Ok(opened) => opened,
        Err(e) => {
            log::debug!("[Library] Could not read duration of {}: {}", path.display(), e);
            return None;
        }
    };

    let params = &opened.format.default_track()?.codec_params;
    let frames = params.n_frames?;
    let seconds = match params.time_base {
        Some(time_base) => {
            let time = time_base.calc_time(frames);
            time.seconds as f64 + time.frac
        }
        None => frames as f64 / f64::from(params.sample_rate?),
    };
    (seconds.is_finite() && seconds > 0.0).then_some(seconds)
}

/// Writes the manifest through a temp file in the same directory, then renames it.
fn write_manifest(path: &Path, tracks: &[Track]) -> Result<(), LibraryError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| LibraryError::io(&dir, e))?;

    let body = serde_json::to_vec_pretty(tracks)?;
    let tmp = dir.join(format!(
        ".{}.{}.tmp",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("songs.json"),
        uuid::Uuid::new_v4().simple()
    ));
    let mut file = std::fs::File::create(&tmp).map_err(|e| LibraryError::io(&tmp, e))?;
    file.write_all(&body)
        .and_then(|_| file.sync_all())
        .map_err(|e| LibraryError::io(&tmp, e))?;
    drop(file);
    std::fs::rename(&tmp, path).map_err(|e| LibraryError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn filename_parsing() {
        let t = track_from_filename("Daft Punk - One More Time.mp3");
        assert_eq!(t.artist, "Daft Punk");
        assert_eq!(t.title, "One More Time");

        let t = track_from_filename("untitled.ogg");
        assert_eq!(t.artist, UNKNOWN_ARTIST);
        assert_eq!(t.title, "untitled");

        let t = track_from_filename(" - Lonely.wav");
        assert_eq!(t.artist, UNKNOWN_ARTIST);
        assert_eq!(t.title, "Lonely");

        let t = track_from_filename("A - B - C.m4a");
        assert_eq!(t.artist, "A");
        assert_eq!(t.title, "B - C");
    }

    #[test]
    fn missing_manifest_gives_empty_playlist() {
        let tmp = tempfile::tempdir().unwrap();
        let library = MediaLibrary::open(tmp.path().join("songs"), tmp.path().join("songs.json"));
        assert!(library.playlist().is_empty());
    }

    #[test]
    fn invalid_manifest_gives_empty_playlist() {
        let tmp = tempfile::tempdir().unwrap();
        let manifest = tmp.path().join("songs.json");
        std::fs::write(&manifest, b"{not json").unwrap();
        let library = MediaLibrary::open(tmp.path().join("songs"), &manifest);
        assert!(library.playlist().is_empty());
    }

    #[test]
    fn scan_filters_sorts_and_writes_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let songs = tmp.path().join("songs");
        std::fs::create_dir_all(&songs).unwrap();
        touch(&songs, "B - Second.MP3");
        touch(&songs, "A - First.opus");
        touch(&songs, "cover.jpg");
        touch(&songs, "notes.txt");
        std::fs::create_dir(songs.join("nested.mp3")).unwrap();

        let manifest = tmp.path().join("songs.json");
        let library = MediaLibrary::open(&songs, &manifest);
        let playlist = library.scan().unwrap();

        let names: Vec<_> = playlist.iter().map(|t| t.filename.as_str()).collect();
        assert_eq!(names, ["A - First.opus", "B - Second.MP3"]);
        assert_eq!(read_manifest(&manifest).unwrap(), *playlist);
        assert_eq!(library.playlist().len(), 2);
    }

    #[test]
    fn scan_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let songs = tmp.path().join("does/not/exist");
        let library = MediaLibrary::open(&songs, tmp.path().join("songs.json"));
        assert!(library.scan().unwrap().is_empty());
        assert!(songs.is_dir());
    }

    #[test]
    fn scan_keeps_known_durations() {
        let tmp = tempfile::tempdir().unwrap();
        let songs = tmp.path().join("songs");
        std::fs::create_dir_all(&songs).unwrap();
        touch(&songs, "A - First.mp3");
        let manifest = tmp.path().join("songs.json");
        std::fs::write(
            &manifest,
            r#"[{"id": 1, "title": "First", "artist": "A", "filename": "A - First.mp3", "duration": 200.5}]"#,
        )
        .unwrap();

        let library = MediaLibrary::open(&songs, &manifest);
        let playlist = library.scan().unwrap();
        assert_eq!(playlist[0].duration_sec, Some(200.5));
    }

    #[test]
    fn concurrent_scans_all_succeed() {
        let tmp = tempfile::tempdir().unwrap();
        let songs = tmp.path().join("songs");
        std::fs::create_dir_all(&songs).unwrap();
        for i in 0..30 {
            touch(&songs, &format!("Artist - Song {i:02}.mp3"));
        }
        let manifest = tmp.path().join("songs.json");
        let library = Arc::new(MediaLibrary::open(&songs, &manifest));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let library = Arc::clone(&library);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| library.scan().map(|p| p.len()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            for result in handle.join().unwrap() {
                assert_eq!(result.unwrap(), 30);
            }
        }
        assert_eq!(read_manifest(&manifest).unwrap().len(), 30);
        let leftovers = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn scan_never_swaps_in_an_older_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let songs = tmp.path().join("songs");
        std::fs::create_dir_all(&songs).unwrap();
        let library = Arc::new(MediaLibrary::open(&songs, tmp.path().join("songs.json")));

        let writer = {
            let library = Arc::clone(&library);
            let songs = songs.clone();
            std::thread::spawn(move || {
                for i in 0..20 {
                    touch(&songs, &format!("A - {i:02}.mp3"));
                    library.scan().unwrap();
                }
            })
        };
        let reader = {
            let library = Arc::clone(&library);
            std::thread::spawn(move || {
                for _ in 0..20 {
                    library.scan().unwrap();
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();

        // Every scan that finished after the last file appeared listed it.
        assert_eq!(library.playlist().len(), 20);
    }

    /// 16-bit mono PCM WAV of `frames` silent samples.
    fn wav_bytes(sample_rate: u32, frames: u32) -> Vec<u8> {
        let data_len = frames * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(out.len() + data_len as usize, 0);
        out
    }

    #[test]
    fn scan_reads_durations_of_new_files() {
        let tmp = tempfile::tempdir().unwrap();
        let songs = tmp.path().join("songs");
        std::fs::create_dir_all(&songs).unwrap();
        std::fs::write(songs.join("A - Tone.wav"), wav_bytes(8_000, 12_000)).unwrap();
        touch(&songs, "B - Empty.mp3");

        let library = MediaLibrary::open(&songs, tmp.path().join("songs.json"));
        let playlist = library.scan().unwrap();

        let tone = playlist[0].duration_sec.unwrap();
        assert!((tone - 1.5).abs() < 1e-6, "got {tone}");
        assert_eq!(playlist[1].duration_sec, None);
    }

    #[tokio::test]
    async fn rescan_runs_off_the_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        let songs = tmp.path().join("songs");
        std::fs::create_dir_all(&songs).unwrap();
        touch(&songs, "X - Y.wav");
        let library = Arc::new(MediaLibrary::open(&songs, tmp.path().join("songs.json")));
        let playlist = library.rescan().await.unwrap();
        assert_eq!(playlist[0].title, "Y");
    }
}
