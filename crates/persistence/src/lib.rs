#![deny(warnings)]

//! Persistence layer: versioned JSON snapshots and offline reconciliation.
//!
//! A snapshot is one JSON object holding the whole `ProgressionState` plus
//! the wall-clock save time and the production rate at save time. Loading is
//! lenient (unreadable saves fall back to defaults, missing fields default
//! individually); importing is strict (`decode` surfaces every failure).

use chrono::{DateTime, Utc};
use idle_core::ProgressionState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Schema version written by this build.
pub const SNAPSHOT_VERSION: u32 = 1;
/// Oldest schema version this build still reads.
pub const MIN_COMPATIBLE_VERSION: u32 = 1;
/// Cap on reconciled offline time, in seconds (8 hours).
pub const OFFLINE_CAP_SECS: f64 = 28_800.0;
/// Offline gains at or below this amount are silently skipped.
pub const OFFLINE_MIN_GAIN: f64 = 1.0;

/// Errors from snapshot encoding, decoding and the save file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The JSON payload did not parse or serialize.
    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The snapshot predates the oldest supported schema.
    #[error("snapshot version {found} is older than the oldest supported version {min}")]
    TooOld {
        /// Version found in the payload.
        found: u32,
        /// Oldest version this build reads.
        min: u32,
    },
    /// The snapshot was written by a newer build.
    #[error("snapshot version {found} is newer than this build supports ({max})")]
    TooNew {
        /// Version found in the payload.
        found: u32,
        /// Newest version this build reads.
        max: u32,
    },
    /// Reading or writing the save file failed.
    #[error("save file io: {0}")]
    Io(#[from] io::Error),
}

/// The persisted aggregate. Missing fields default individually, so partial
/// snapshots from older writes still load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// Schema version of the payload.
    pub version: u32,
    /// The whole progression state.
    pub state: ProgressionState,
    /// Wall-clock time of the save; `None` disables offline reconciliation.
    pub last_save: Option<DateTime<Utc>>,
    /// Production rate at save time, used for offline gain.
    pub rate_snapshot: f64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot {
            version: SNAPSHOT_VERSION,
            state: ProgressionState::default(),
            last_save: None,
            rate_snapshot: 0.0,
        }
    }
}

impl Snapshot {
    /// Snapshot a state at the given wall-clock time.
    pub fn new(state: ProgressionState, rate_snapshot: f64, now: DateTime<Utc>) -> Self {
        Snapshot {
            version: SNAPSHOT_VERSION,
            state,
            last_save: Some(now),
            rate_snapshot,
        }
    }
}

/// Serialize a snapshot to its textual JSON form.
pub fn encode(snapshot: &Snapshot) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string(snapshot)?)
}

/// Parse and version-check a snapshot. Strict: every failure is surfaced,
/// which is what the import path wants.
pub fn decode(json: &str) -> Result<Snapshot, SnapshotError> {
    let snapshot: Snapshot = serde_json::from_str(json)?;
    if snapshot.version < MIN_COMPATIBLE_VERSION {
        return Err(SnapshotError::TooOld {
            found: snapshot.version,
            min: MIN_COMPATIBLE_VERSION,
        });
    }
    if snapshot.version > SNAPSHOT_VERSION {
        return Err(SnapshotError::TooNew {
            found: snapshot.version,
            max: SNAPSHOT_VERSION,
        });
    }
    Ok(snapshot)
}

/// Lenient counterpart of [`decode`] for the ordinary load path: an
/// unreadable snapshot logs a warning and yields defaults.
pub fn restore(json: &str) -> Snapshot {
    match decode(json) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(%err, "snapshot unreadable, starting from defaults");
            Snapshot::default()
        }
    }
}

/// Offline production applied during a restore.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OfflineGain {
    /// Credited offline seconds after the cap.
    pub seconds: f64,
    /// Currency added to balance and lifetime earnings.
    pub amount: f64,
}

/// Credit production for real time elapsed since the last save: elapsed
/// seconds clamped to [0, `OFFLINE_CAP_SECS`] times the saved rate, applied
/// only when the gain exceeds `OFFLINE_MIN_GAIN`.
pub fn reconcile_offline(
    state: &mut ProgressionState,
    last_save: Option<DateTime<Utc>>,
    rate_snapshot: f64,
    now: DateTime<Utc>,
) -> Option<OfflineGain> {
    let last = last_save?;
    let elapsed = (now - last).num_milliseconds() as f64 / 1000.0;
    let seconds = elapsed.clamp(0.0, OFFLINE_CAP_SECS);
    let amount = rate_snapshot * seconds;
    if !amount.is_finite() || amount <= OFFLINE_MIN_GAIN {
        return None;
    }
    state.balance += amount;
    state.lifetime_earned += amount;
    info!(seconds, amount, "offline production applied");
    Some(OfflineGain { seconds, amount })
}

/// A snapshot file on disk. Writes go through a temp file and a rename, so
/// the previous save survives a failed write.
#[derive(Clone, Debug)]
pub struct SaveFile {
    path: PathBuf,
}

impl SaveFile {
    /// Wrap a save path. Nothing is touched until `load`/`store`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SaveFile { path: path.into() }
    }

    /// The wrapped path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strict load. `Ok(None)` when the file does not exist yet.
    pub fn load(&self) -> Result<Option<Snapshot>, SnapshotError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => decode(&text).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Lenient load for startup: missing file starts fresh, unreadable file
    /// logs a warning and starts fresh.
    pub fn load_or_default(&self) -> Snapshot {
        match self.load() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => Snapshot::default(),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "unreadable save file, starting fresh");
                Snapshot::default()
            }
        }
    }

    /// Write the snapshot atomically (temp file, then rename).
    pub fn store(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let json = encode(snapshot)?;
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Remove the save file if present.
    pub fn delete(&self) -> Result<(), SnapshotError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idle_core::{
        ActiveBuff, BonusSpawn, BuffKind, ProducerId, RateSample, ResearchId, UpgradeId,
    };
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn rich_state() -> ProgressionState {
        let mut state = ProgressionState::default();
        state.balance = 1_234.5678;
        state.lifetime_earned = 2_500_000.125;
        state.click_mult = 4.0;
        state.global_mult = 1.98;
        state.producers.insert(ProducerId("cursor".into()), 27);
        state.producers.insert(ProducerId("lab".into()), 2);
        state.producer_mult.insert(ProducerId("cursor".into()), 4.0);
        state.owned_upgrades.insert(UpgradeId("click1".into()));
        state.owned_research.insert(ResearchId("r1".into()));
        state.research_points = 42.75;
        state.lab_output_mult = 1.5;
        state.stardust = 7;
        state.buff = Some(ActiveBuff {
            kind: BuffKind::ClickFrenzy,
            mult: 50.0,
            until: 1_215.5,
        });
        state.bonus_spawn = Some(BonusSpawn {
            x: 33.3,
            y: 62.1,
            until: 1_204.0,
        });
        state.stats.clicks = 4_242;
        state.stats.bonus_events = 17;
        state.stats.peak_rate = 987.654;
        state.stats.passive_earned = 2_400_000.0;
        state.stats.ascensions = 2;
        state.stats.earned_all_cycles = 9_000_000.5;
        state.history.push(RateSample {
            at: 1_199.0,
            total: 950.0,
            per_producer: BTreeMap::from([(ProducerId("cursor".into()), 950.0)]),
        });
        state.elapsed = 1_200.0;
        state
    }

    #[test]
    fn roundtrip_preserves_every_field() {
        let snapshot = Snapshot::new(rich_state(), 950.0, ts(1_700_000_000));
        let json = encode(&snapshot).unwrap();
        let back = decode(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn long_mantissa_floats_round_trip_exactly() {
        // Shortest-repr JSON must parse back to the same double, not a
        // neighboring one.
        let mut state = ProgressionState::default();
        state.balance = 409_997_473_933_494.44;
        state.lifetime_earned = 409_997_473_933_494.44;
        let snapshot = Snapshot::new(state, 0.1 + 0.2, ts(7));
        let back = decode(&encode(&snapshot).unwrap()).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn partial_snapshot_defaults_field_by_field() {
        // an older, sparser write: no buff, no history, no rate snapshot
        let json = r#"{"version":1,"state":{"balance":77.5,"stardust":3},"last_save":null}"#;
        let snapshot = decode(json).unwrap();
        assert_eq!(snapshot.state.balance, 77.5);
        assert_eq!(snapshot.state.stardust, 3);
        assert_eq!(snapshot.state.click_base, 1.0);
        assert_eq!(snapshot.state.global_mult, 1.0);
        assert!(snapshot.state.history.is_empty());
        assert_eq!(snapshot.rate_snapshot, 0.0);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{"version":1,"state":{"balance":1.0,"someday_maybe":true},"extra":42}"#;
        let snapshot = decode(json).unwrap();
        assert_eq!(snapshot.state.balance, 1.0);
    }

    #[test]
    fn version_gates_reject_old_and_new() {
        let old = r#"{"version":0,"state":{}}"#;
        assert!(matches!(
            decode(old),
            Err(SnapshotError::TooOld { found: 0, min: 1 })
        ));
        let new = r#"{"version":99,"state":{}}"#;
        assert!(matches!(
            decode(new),
            Err(SnapshotError::TooNew { found: 99, max: 1 })
        ));
    }

    #[test]
    fn restore_falls_back_on_garbage() {
        let snapshot = restore("definitely not json");
        assert_eq!(snapshot, Snapshot::default());
        let snapshot = restore(r#"{"version":99,"state":{}}"#);
        assert_eq!(snapshot, Snapshot::default());
    }

    #[test]
    fn offline_gain_is_rate_times_elapsed() {
        let mut state = ProgressionState::default();
        let gain =
            reconcile_offline(&mut state, Some(ts(1_000_000)), 10.0, ts(1_000_100)).unwrap();
        assert_eq!(gain.seconds, 100.0);
        assert_eq!(gain.amount, 1_000.0);
        assert_eq!(state.balance, 1_000.0);
        assert_eq!(state.lifetime_earned, 1_000.0);
    }

    #[test]
    fn offline_gain_caps_at_eight_hours() {
        let mut state = ProgressionState::default();
        let ten_hours = 36_000;
        let gain =
            reconcile_offline(&mut state, Some(ts(0)), 2.0, ts(ten_hours)).unwrap();
        assert_eq!(gain.seconds, OFFLINE_CAP_SECS);
        assert_eq!(gain.amount, 2.0 * OFFLINE_CAP_SECS);
        assert_eq!(state.balance, 57_600.0);
    }

    #[test]
    fn tiny_offline_gain_is_skipped() {
        let mut state = ProgressionState::default();
        let gain = reconcile_offline(&mut state, Some(ts(0)), 0.005, ts(100));
        assert!(gain.is_none());
        assert_eq!(state.balance, 0.0);
    }

    #[test]
    fn offline_needs_a_last_save_and_no_future_credit() {
        let mut state = ProgressionState::default();
        assert!(reconcile_offline(&mut state, None, 100.0, ts(1_000)).is_none());
        // save written "in the future" must not credit anything
        assert!(reconcile_offline(&mut state, Some(ts(2_000)), 100.0, ts(1_000)).is_none());
        assert_eq!(state.balance, 0.0);
    }

    #[test]
    fn save_file_roundtrip_and_delete() {
        let path = std::env::temp_dir().join(format!("idle-bakery-save-{}.json", std::process::id()));
        let file = SaveFile::new(&path);
        assert!(file.load().unwrap().is_none());

        let snapshot = Snapshot::new(rich_state(), 12.5, ts(1_700_000_000));
        file.store(&snapshot).unwrap();
        assert_eq!(file.load().unwrap().unwrap(), snapshot);
        assert_eq!(file.load_or_default(), snapshot);

        file.delete().unwrap();
        assert!(file.load().unwrap().is_none());
        file.delete().unwrap(); // second delete is a no-op
    }

    proptest! {
        #[test]
        fn offline_gain_never_negative(rate in 0.0f64..1e9, dt in -100_000i64..1_000_000) {
            let mut state = ProgressionState::default();
            let now = ts(5_000_000);
            let last = ts(5_000_000 - dt);
            if let Some(gain) = reconcile_offline(&mut state, Some(last), rate, now) {
                prop_assert!(gain.amount > OFFLINE_MIN_GAIN);
                prop_assert!(gain.seconds <= OFFLINE_CAP_SECS);
                prop_assert!(gain.seconds >= 0.0);
            }
            prop_assert!(state.balance >= 0.0);
        }

        #[test]
        fn balance_roundtrips_exactly(balance in 0.0f64..1e15) {
            let mut state = ProgressionState::default();
            state.balance = balance;
            let snapshot = Snapshot::new(state, 0.0, ts(0));
            let back = decode(&encode(&snapshot).unwrap()).unwrap();
            prop_assert_eq!(back.state.balance, balance);
        }
    }
}
