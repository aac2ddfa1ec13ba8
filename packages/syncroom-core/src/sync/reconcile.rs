//! Client replica: turns snapshots into player actions.

use super::Snapshot;
use crate::protocol_constants::SEEK_HYSTERESIS_SECS;

/// What the local player should do after a snapshot arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotPlan {
    /// Filename to load, only when it differs from the loaded one.
    pub load_source: Option<String>,
    /// The playlist became empty and the loaded source must be dropped.
    pub clear_source: bool,
    pub should_play: bool,
    /// Hard seek target, only when drift exceeds the hysteresis band.
    pub seek_to: Option<f64>,
    /// `serverTime - localNow` for this snapshot; display only.
    pub client_offset_ms: i64,
}

/// Periodic drift check result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    InSync,
    Seek(f64),
}

/// Returns true when `local` has drifted from `target` by more than `hysteresis` seconds.
#[must_use]
pub fn needs_seek(local: f64, target: f64, hysteresis: f64) -> bool {
    (local - target).abs() > hysteresis
}

struct Applied {
    snapshot: Snapshot,
    received_at_local: u64,
    client_offset_ms: i64,
}

/// Local replica of one room's timeline.
pub struct Reconciler {
    hysteresis: f64,
    last: Option<Applied>,
    loaded_filename: Option<String>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::with_hysteresis(SEEK_HYSTERESIS_SECS)
    }

    pub fn with_hysteresis(hysteresis: f64) -> Self {
        Self {
            hysteresis,
            last: None,
            loaded_filename: None,
        }
    }

    /// Applies a snapshot received at `local_now_ms` while the local player is
    /// at `local_position_sec`.
    ///
    /// Returns `None` for snapshots older than the last applied one. Equal
    /// versions are re-applied since re-emissions carry a fresher server time.
    pub fn apply_snapshot(
        &mut self,
        snapshot: Snapshot,
        local_now_ms: u64,
        local_position_sec: f64,
    ) -> Option<SnapshotPlan> {
        if let Some(last) = &self.last {
            if snapshot.state.version < last.snapshot.state.version {
                log::debug!(
                    "[Sync] Dropping stale snapshot v{} (have v{})",
                    snapshot.state.version,
                    last.snapshot.state.version
                );
                return None;
            }
        }

        let client_offset_ms = snapshot.server_time as i64 - local_now_ms as i64;
        let wanted = snapshot.state.current_track().map(|t| t.filename.clone());

        let mut load_source = None;
        let mut clear_source = false;
        let mut local_position = local_position_sec;
        if wanted != self.loaded_filename {
            match &wanted {
                Some(filename) => load_source = Some(filename.clone()),
                None => clear_source = true,
            }
            // A freshly loaded source starts at zero.
            local_position = 0.0;
            self.loaded_filename = wanted.clone();
        }

        let target = snapshot.target_position();
        let seek_to = (wanted.is_some() && needs_seek(local_position, target, self.hysteresis))
            .then_some(target);
        let should_play = snapshot.state.is_playing && wanted.is_some();

        self.last = Some(Applied {
            snapshot,
            received_at_local: local_now_ms,
            client_offset_ms,
        });

        Some(SnapshotPlan {
            load_source,
            clear_source,
            should_play,
            seek_to,
            client_offset_ms,
        })
    }

    /// Predicted room position at local time `local_now_ms`.
    ///
    /// Advances with local elapsed time since the snapshot arrived while the
    /// room is playing.
    #[must_use]
    pub fn predicted_position(&self, local_now_ms: u64) -> Option<f64> {
        let last = self.last.as_ref()?;
        let target = last.snapshot.target_position();
        if last.snapshot.state.is_playing {
            let elapsed = local_now_ms.saturating_sub(last.received_at_local) as f64 / 1000.0;
            Some(target + elapsed)
        } else {
            Some(target)
        }
    }

    /// Drift check for a running player.
    #[must_use]
    pub fn correction(&self, local_position_sec: f64, local_now_ms: u64) -> Correction {
        match self.predicted_position(local_now_ms) {
            Some(target) if needs_seek(local_position_sec, target, self.hysteresis) => {
                Correction::Seek(target)
            }
            _ => Correction::InSync,
        }
    }

    #[must_use]
    pub fn client_offset_ms(&self) -> Option<i64> {
        self.last.as_ref().map(|a| a.client_offset_ms)
    }

    #[must_use]
    pub fn loaded_filename(&self) -> Option<&str> {
        self.loaded_filename.as_deref()
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{PlaybackState, Track};

    fn playing_snapshot(position: f64, started_at: u64, server_time: u64, version: u64) -> Snapshot {
        let mut state = PlaybackState::new(vec![
            Track::new("One", "A", "one.mp3"),
            Track::new("Two", "A", "two.mp3"),
        ]);
        state.is_playing = true;
        state.position_sec = position;
        state.started_at = Some(started_at);
        state.version = version;
        Snapshot::new(state, server_time)
    }

    #[test]
    fn first_snapshot_loads_source_and_seeks() {
        let mut replica = Reconciler::new();
        let plan = replica
            .apply_snapshot(playing_snapshot(0.0, 1_000, 11_000, 1), 10_500, 0.0)
            .unwrap();
        assert_eq!(plan.load_source.as_deref(), Some("one.mp3"));
        assert!(plan.should_play);
        assert_eq!(plan.seek_to, Some(10.0));
        assert_eq!(plan.client_offset_ms, 500);
    }

    #[test]
    fn small_drift_is_left_alone() {
        let mut replica = Reconciler::new();
        replica.apply_snapshot(playing_snapshot(0.0, 1_000, 11_000, 1), 11_000, 0.0);
        let plan = replica
            .apply_snapshot(playing_snapshot(0.0, 1_000, 12_000, 1), 12_000, 10.9)
            .unwrap();
        assert_eq!(plan.load_source, None);
        assert_eq!(plan.seek_to, None);
    }

    #[test]
    fn large_drift_triggers_seek() {
        let mut replica = Reconciler::new();
        replica.apply_snapshot(playing_snapshot(0.0, 1_000, 11_000, 1), 11_000, 0.0);
        let plan = replica
            .apply_snapshot(playing_snapshot(0.0, 1_000, 12_000, 1), 12_000, 10.5)
            .unwrap();
        assert_eq!(plan.seek_to, Some(11.0));
    }

    #[test]
    fn stale_versions_are_dropped() {
        let mut replica = Reconciler::new();
        replica.apply_snapshot(playing_snapshot(0.0, 1_000, 2_000, 5), 2_000, 0.0);
        assert!(replica
            .apply_snapshot(playing_snapshot(0.0, 1_000, 3_000, 4), 3_000, 0.0)
            .is_none());
    }

    #[test]
    fn predicted_position_tracks_local_elapsed_time() {
        let mut replica = Reconciler::new();
        replica.apply_snapshot(playing_snapshot(5.0, 1_000, 1_000, 1), 50_000, 5.0);
        let predicted = replica.predicted_position(52_000).unwrap();
        assert!((predicted - 7.0).abs() < 1e-9);
        assert_eq!(replica.correction(7.1, 52_000), Correction::InSync);
        assert_eq!(replica.correction(8.0, 52_000), Correction::Seek(7.0));
    }

    #[test]
    fn paused_snapshot_does_not_advance() {
        let mut replica = Reconciler::new();
        let mut snapshot = playing_snapshot(5.0, 1_000, 1_000, 1);
        snapshot.state.is_playing = false;
        snapshot.state.started_at = None;
        let plan = replica.apply_snapshot(snapshot, 0, 0.0).unwrap();
        assert!(!plan.should_play);
        assert_eq!(replica.predicted_position(90_000), Some(5.0));
    }

    #[test]
    fn empty_playlist_clears_source() {
        let mut replica = Reconciler::new();
        replica.apply_snapshot(playing_snapshot(0.0, 0, 0, 1), 0, 0.0);
        let mut empty = PlaybackState::default();
        empty.version = 2;
        let plan = replica.apply_snapshot(Snapshot::new(empty, 10), 10, 3.0).unwrap();
        assert!(plan.clear_source);
        assert!(!plan.should_play);
        assert_eq!(plan.seek_to, None);
        assert_eq!(replica.loaded_filename(), None);
    }

    #[test]
    fn drift_stays_within_hysteresis_after_correction() {
        let mut replica = Reconciler::new();
        replica.apply_snapshot(playing_snapshot(0.0, 0, 30_000, 1), 30_000, 0.0);
        // Player followed the seek; local clock runs 0.1% fast for a minute.
        let mut local = 30.0;
        for step in 1..=60u64 {
            local += 1.001;
            let now = 30_000 + step * 1_000;
            if let Correction::Seek(target) = replica.correction(local, now) {
                local = target;
            }
            let truth = replica.predicted_position(now).unwrap();
            assert!((local - truth).abs() <= SEEK_HYSTERESIS_SECS);
        }
    }
}
