//! # SQLite Segment Store
//!
//! Durable [`SegmentStore`] and [`ActivitySource`] backed by a single SQLite
//! database.
//!
//! ## Tables
//!
//! - `road_segments`: shared segment geometry, keyed by segment hash
//! - `user_segments`: per-user ride aggregates
//! - `user_segment_rides`: one row per (user, segment, activity); makes
//!   upserts idempotent per activity
//! - `user_road_preferences`: per-user preference settings
//! - `activities`: recorded activities and their processed flag
//!
//! Timestamps are stored as unix seconds.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, TimeZone, Utc};
use log::{debug, info};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqlResult};

use crate::error::{FamiliarityError, Result};
use crate::preferences::{calculate_preference_score, PreferencesUpdate, UserRoadPreferences};
use crate::store::{
    ride_count_bucket, ActivityFilter, ActivitySource, ActivitySummary, ActivityTrack,
    PreferenceRow, SegmentRow, SegmentStats, SegmentStore, SegmentUpsert, RECENT_SEGMENT_DAYS,
};

/// Hashes bound per `IN (...)` lookup, below SQLite's variable limit.
const LOOKUP_CHUNK_SIZE: usize = 500;

/// SQLite-backed segment store.
pub struct SqliteSegmentStore {
    db: Mutex<Connection>,
}

impl SqliteSegmentStore {
    // ========================================================================
    // Initialization
    // ========================================================================

    /// Open (or create) a store at the given database path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db = Connection::open(db_path.as_ref())?;
        Self::init_schema(&db)?;
        info!(
            "[SqliteSegmentStore] Opened database at {}",
            db_path.as_ref().display()
        );
        Ok(Self { db: Mutex::new(db) })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn init_schema(conn: &Connection) -> SqlResult<()> {
        conn.execute_batch(
            r#"
            -- Shared segment geometry
            CREATE TABLE IF NOT EXISTS road_segments (
                id TEXT PRIMARY KEY,
                start_lat REAL NOT NULL,
                start_lng REAL NOT NULL,
                end_lat REAL NOT NULL,
                end_lng REAL NOT NULL,
                length_meters REAL NOT NULL,
                bearing REAL NOT NULL,
                road_name TEXT,
                road_type TEXT,
                created_at INTEGER DEFAULT (strftime('%s', 'now'))
            );

            -- Per-user ride aggregates
            CREATE TABLE IF NOT EXISTS user_segments (
                user_id TEXT NOT NULL,
                segment_id TEXT NOT NULL,
                ride_count INTEGER NOT NULL DEFAULT 1,
                first_ridden_at INTEGER NOT NULL,
                last_ridden_at INTEGER NOT NULL,
                avg_speed_ms REAL,
                best_time_seconds REAL,
                PRIMARY KEY (user_id, segment_id),
                FOREIGN KEY (segment_id) REFERENCES road_segments(id) ON DELETE CASCADE
            );

            -- Rides already counted, one per activity
            CREATE TABLE IF NOT EXISTS user_segment_rides (
                user_id TEXT NOT NULL,
                segment_id TEXT NOT NULL,
                activity_id TEXT NOT NULL,
                ridden_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, segment_id, activity_id)
            );

            CREATE TABLE IF NOT EXISTS user_road_preferences (
                user_id TEXT PRIMARY KEY,
                familiarity_strength INTEGER NOT NULL,
                min_rides_for_familiar INTEGER NOT NULL,
                recency_weight INTEGER NOT NULL,
                familiarity_decay_days INTEGER NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );

            CREATE TABLE IF NOT EXISTS activities (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                polyline TEXT,
                start_date INTEGER NOT NULL,
                moving_time INTEGER,
                distance REAL,
                segments_processed INTEGER NOT NULL DEFAULT 0
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_road_segments_start ON road_segments(start_lat, start_lng);
            CREATE INDEX IF NOT EXISTS idx_user_segments_user ON user_segments(user_id, ride_count);
            CREATE INDEX IF NOT EXISTS idx_activities_user ON activities(user_id, start_date);

            -- Enable foreign keys
            PRAGMA foreign_keys = ON;
        "#,
        )
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| FamiliarityError::store("sqlite connection lock poisoned"))
    }

    // ========================================================================
    // Activities
    // ========================================================================

    /// Insert or replace an activity. Replacing resets its processed flag.
    pub fn add_activity(&self, user_id: &str, track: &ActivityTrack) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO activities
                (id, user_id, polyline, start_date, moving_time, distance, segments_processed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                track.activity_id,
                user_id,
                track.polyline,
                track.start_date.timestamp(),
                track.moving_time,
                track.distance,
            ],
        )?;
        Ok(())
    }

    /// Whether an activity has been marked processed.
    pub fn is_processed(&self, activity_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let processed: Option<bool> = conn
            .query_row(
                "SELECT segments_processed FROM activities WHERE id = ?",
                params![activity_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(processed.unwrap_or(false))
    }

    // ========================================================================
    // Segment metadata
    // ========================================================================

    /// Attach road metadata to a stored segment. Returns false if unknown.
    pub fn set_road_info(
        &self,
        segment_hash: &str,
        road_name: Option<&str>,
        road_type: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE road_segments SET road_name = ?2, road_type = ?3 WHERE id = ?1",
            params![segment_hash, road_name, road_type],
        )?;
        Ok(updated > 0)
    }

    /// Number of distinct segments across all users.
    pub fn segment_count(&self) -> Result<u32> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM road_segments", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn from_timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single()
}

fn read_preferences(conn: &Connection, user_id: &str) -> SqlResult<UserRoadPreferences> {
    let stored = conn
        .query_row(
            "SELECT familiarity_strength, min_rides_for_familiar, recency_weight, familiarity_decay_days
             FROM user_road_preferences WHERE user_id = ?",
            params![user_id],
            |row| {
                Ok(UserRoadPreferences {
                    familiarity_strength: row.get(0)?,
                    min_rides_for_familiar: row.get(1)?,
                    recency_weight: row.get(2)?,
                    familiarity_decay_days: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(stored.unwrap_or_default())
}

impl SegmentStore for SqliteSegmentStore {
    fn upsert_user_segment(&self, upsert: &SegmentUpsert) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let ridden_at = upsert.activity_date.timestamp();

        tx.execute(
            "INSERT INTO road_segments
                (id, start_lat, start_lng, end_lat, end_lng, length_meters, bearing)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO NOTHING",
            params![
                upsert.segment_hash,
                upsert.start_coord.latitude,
                upsert.start_coord.longitude,
                upsert.end_coord.latitude,
                upsert.end_coord.longitude,
                upsert.length_meters,
                upsert.bearing_degrees,
            ],
        )?;

        let new_ride = tx.execute(
            "INSERT OR IGNORE INTO user_segment_rides (user_id, segment_id, activity_id, ridden_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![upsert.user_id, upsert.segment_hash, upsert.activity_id, ridden_at],
        )?;

        if new_ride == 0 {
            debug!(
                "[SqliteSegmentStore] Ride on {} by activity {} already counted",
                upsert.segment_hash, upsert.activity_id
            );
            tx.commit()?;
            return Ok(());
        }

        // SET expressions see the row as it was before the update
        tx.execute(
            "INSERT INTO user_segments
                (user_id, segment_id, ride_count, first_ridden_at, last_ridden_at,
                 avg_speed_ms, best_time_seconds)
             VALUES (?1, ?2, 1, ?3, ?3, ?4, ?5)
             ON CONFLICT(user_id, segment_id) DO UPDATE SET
                avg_speed_ms = CASE
                    WHEN excluded.avg_speed_ms IS NULL THEN avg_speed_ms
                    WHEN avg_speed_ms IS NULL THEN excluded.avg_speed_ms
                    ELSE (avg_speed_ms * ride_count + excluded.avg_speed_ms) / (ride_count + 1)
                END,
                best_time_seconds = CASE
                    WHEN excluded.best_time_seconds IS NULL THEN best_time_seconds
                    WHEN best_time_seconds IS NULL THEN excluded.best_time_seconds
                    ELSE MIN(best_time_seconds, excluded.best_time_seconds)
                END,
                ride_count = ride_count + 1,
                first_ridden_at = MIN(first_ridden_at, excluded.first_ridden_at),
                last_ridden_at = MAX(last_ridden_at, excluded.last_ridden_at)",
            params![
                upsert.user_id,
                upsert.segment_hash,
                ridden_at,
                upsert.avg_speed_ms,
                upsert.time_seconds,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_segment_preferences(
        &self,
        user_id: &str,
        segment_hashes: &[String],
    ) -> Result<Vec<PreferenceRow>> {
        let conn = self.conn()?;
        let prefs = read_preferences(&conn, user_id)?;

        let mut seen = HashSet::new();
        let unique: Vec<&String> = segment_hashes
            .iter()
            .filter(|hash| seen.insert(hash.as_str()))
            .collect();

        let mut rows = Vec::new();
        for chunk in unique.chunks(LOOKUP_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT segment_id, ride_count, last_ridden_at FROM user_segments
                 WHERE user_id = ? AND segment_id IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let bound = std::iter::once(user_id).chain(chunk.iter().map(|h| h.as_str()));

            let found: Vec<(String, u32, i64)> = stmt
                .query_map(params_from_iter(bound), |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<SqlResult<_>>()?;

            rows.extend(found.into_iter().map(|(segment_hash, ride_count, last)| {
                let last_ridden_at = from_timestamp(last);
                PreferenceRow {
                    preference_score: calculate_preference_score(
                        ride_count,
                        last_ridden_at,
                        &prefs,
                    ),
                    segment_hash,
                    ride_count,
                    last_ridden_at,
                }
            }));
        }
        Ok(rows)
    }

    fn get_user_segments_in_bbox(
        &self,
        user_id: &str,
        min_lat: f64,
        max_lat: f64,
        min_lng: f64,
        max_lng: f64,
        min_ride_count: u32,
    ) -> Result<Vec<SegmentRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.start_lat, s.start_lng, s.end_lat, s.end_lng,
                    us.ride_count, us.last_ridden_at, s.road_name, s.road_type
             FROM user_segments us
             JOIN road_segments s ON s.id = us.segment_id
             WHERE us.user_id = ?1
               AND us.ride_count >= ?2
               AND s.start_lat BETWEEN ?3 AND ?4
               AND s.start_lng BETWEEN ?5 AND ?6
             ORDER BY s.id",
        )?;

        let rows = stmt
            .query_map(
                params![user_id, min_ride_count, min_lat, max_lat, min_lng, max_lng],
                |row| {
                    let last: i64 = row.get(6)?;
                    Ok(SegmentRow {
                        id: row.get(0)?,
                        start_lat: row.get(1)?,
                        start_lng: row.get(2)?,
                        end_lat: row.get(3)?,
                        end_lng: row.get(4)?,
                        ride_count: row.get(5)?,
                        last_ridden_at: from_timestamp(last),
                        road_name: row.get(7)?,
                        road_type: row.get(8)?,
                    })
                },
            )?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(rows)
    }

    fn get_user_segment_stats(&self, user_id: &str) -> Result<SegmentStats> {
        let conn = self.conn()?;
        let recent_cutoff = (Utc::now() - Duration::days(RECENT_SEGMENT_DAYS)).timestamp();

        let mut stmt = conn.prepare(
            "SELECT us.ride_count, us.first_ridden_at, s.length_meters
             FROM user_segments us
             JOIN road_segments s ON s.id = us.segment_id
             WHERE us.user_id = ?",
        )?;
        let history: Vec<(u32, i64, f64)> = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<SqlResult<_>>()?;

        let mut stats = SegmentStats::default();
        let mut unique_meters = 0.0;
        for (ride_count, first_ridden_at, length_meters) in history {
            stats.total_segments += 1;
            stats.total_rides += ride_count;
            stats.most_ridden_count = stats.most_ridden_count.max(ride_count);
            *stats
                .segments_by_ride_count
                .entry(ride_count_bucket(ride_count).to_string())
                .or_insert(0) += 1;
            if first_ridden_at >= recent_cutoff {
                stats.recent_new_segments += 1;
            }
            unique_meters += length_meters;
        }
        stats.unique_km = unique_meters / 1000.0;
        Ok(stats)
    }

    fn get_user_preferences(&self, user_id: &str) -> Result<UserRoadPreferences> {
        let conn = self.conn()?;
        Ok(read_preferences(&conn, user_id)?)
    }

    fn upsert_user_preferences(
        &self,
        user_id: &str,
        update: &PreferencesUpdate,
    ) -> Result<UserRoadPreferences> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut prefs = read_preferences(&tx, user_id)?;
        prefs.apply(update);

        tx.execute(
            "INSERT INTO user_road_preferences
                (user_id, familiarity_strength, min_rides_for_familiar, recency_weight,
                 familiarity_decay_days, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, strftime('%s', 'now'))
             ON CONFLICT(user_id) DO UPDATE SET
                familiarity_strength = excluded.familiarity_strength,
                min_rides_for_familiar = excluded.min_rides_for_familiar,
                recency_weight = excluded.recency_weight,
                familiarity_decay_days = excluded.familiarity_decay_days,
                updated_at = excluded.updated_at",
            params![
                user_id,
                prefs.familiarity_strength,
                prefs.min_rides_for_familiar,
                prefs.recency_weight,
                prefs.familiarity_decay_days,
            ],
        )?;
        tx.commit()?;

        Ok(prefs)
    }
}

impl ActivitySource for SqliteSegmentStore {
    fn list_activities(
        &self,
        user_id: &str,
        filter: &ActivityFilter,
    ) -> Result<Vec<ActivitySummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, start_date, segments_processed FROM activities
             WHERE user_id = ?
             ORDER BY start_date ASC, id ASC",
        )?;

        let activities: Vec<ActivitySummary> = stmt
            .query_map(params![user_id], |row| {
                let start: i64 = row.get(1)?;
                Ok(ActivitySummary {
                    activity_id: row.get(0)?,
                    start_date: from_timestamp(start).unwrap_or_default(),
                    segments_processed: row.get(2)?,
                })
            })?
            .collect::<SqlResult<_>>()?;
        Ok(activities
            .into_iter()
            .filter(|summary| filter.matches(summary))
            .collect())
    }

    fn get_activity_track(&self, activity_id: &str, user_id: &str) -> Result<ActivityTrack> {
        let conn = self.conn()?;
        let track = conn
            .query_row(
                "SELECT id, polyline, start_date, moving_time, distance FROM activities
                 WHERE id = ?1 AND user_id = ?2",
                params![activity_id, user_id],
                |row| {
                    let start: i64 = row.get(2)?;
                    Ok(ActivityTrack {
                        activity_id: row.get(0)?,
                        polyline: row.get(1)?,
                        start_date: from_timestamp(start).unwrap_or_default(),
                        moving_time: row.get(3)?,
                        distance: row.get(4)?,
                    })
                },
            )
            .optional()?;

        track.ok_or_else(|| FamiliarityError::ActivityNotFound {
            activity_id: activity_id.to_string(),
        })
    }

    fn mark_processed(&self, activity_id: &str, user_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE activities SET segments_processed = 1 WHERE id = ?1 AND user_id = ?2",
            params![activity_id, user_id],
        )?;
        if updated == 0 {
            return Err(FamiliarityError::ActivityNotFound {
                activity_id: activity_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Coordinate;

    fn upsert(activity: &str, hash: &str, lat: f64, date: DateTime<Utc>) -> SegmentUpsert {
        SegmentUpsert {
            user_id: "u1".to_string(),
            activity_id: activity.to_string(),
            segment_hash: hash.to_string(),
            start_coord: Coordinate::new(lat, 8.0),
            end_coord: Coordinate::new(lat + 0.002, 8.0),
            length_meters: 222.0,
            bearing_degrees: 0.0,
            avg_speed_ms: Some(8.0),
            time_seconds: Some(27.75),
            activity_date: date,
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, 7, 0, 0).unwrap()
    }

    #[test]
    fn test_schema_is_reentrant() {
        let store = SqliteSegmentStore::in_memory().unwrap();
        let conn = store.conn().unwrap();
        SqliteSegmentStore::init_schema(&conn).unwrap();
    }

    #[test]
    fn test_corrupt_row_is_an_error_not_missing_data() {
        let store = SqliteSegmentStore::in_memory().unwrap();
        store.upsert_user_segment(&upsert("a1", "h1", 47.0, day(1))).unwrap();
        {
            let conn = store.conn().unwrap();
            conn.execute("UPDATE user_segments SET ride_count = 'many'", [])
                .unwrap();
        }

        assert!(store
            .get_segment_preferences("u1", &["h1".to_string()])
            .is_err());
        assert!(store
            .get_user_segments_in_bbox("u1", 46.9, 47.1, 7.9, 8.1, 1)
            .is_err());
        assert!(store.get_user_segment_stats("u1").is_err());
    }

    #[test]
    fn test_repeated_upsert_counts_once() {
        let store = SqliteSegmentStore::in_memory().unwrap();
        let ride = upsert("a1", "h1", 47.0, day(1));
        store.upsert_user_segment(&ride).unwrap();
        store.upsert_user_segment(&ride).unwrap();

        let rows = store
            .get_segment_preferences("u1", &["h1".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ride_count, 1);
    }

    #[test]
    fn test_aggregates_across_activities() {
        let store = SqliteSegmentStore::in_memory().unwrap();
        let mut second = upsert("a2", "h1", 47.0, day(5));
        second.avg_speed_ms = Some(6.0);
        second.time_seconds = Some(37.0);
        store.upsert_user_segment(&second).unwrap();
        store.upsert_user_segment(&upsert("a1", "h1", 47.0, day(1))).unwrap();

        let conn = store.conn().unwrap();
        let (count, first, last, speed, best): (u32, i64, i64, f64, f64) = conn
            .query_row(
                "SELECT ride_count, first_ridden_at, last_ridden_at, avg_speed_ms, best_time_seconds
                 FROM user_segments WHERE user_id = 'u1' AND segment_id = 'h1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(first, day(1).timestamp());
        assert_eq!(last, day(5).timestamp());
        assert!((speed - 7.0).abs() < 1e-9);
        assert!((best - 27.75).abs() < 1e-9);
    }

    #[test]
    fn test_lookup_ignores_duplicates_and_unknowns() {
        let store = SqliteSegmentStore::in_memory().unwrap();
        store.upsert_user_segment(&upsert("a1", "h1", 47.0, day(1))).unwrap();

        let hashes = vec!["h1".to_string(), "h1".to_string(), "nope".to_string()];
        let rows = store.get_segment_preferences("u1", &hashes).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].last_ridden_at, Some(day(1)));
        assert!(rows[0].preference_score >= 1.0);
    }

    #[test]
    fn test_bbox_uses_start_point() {
        let store = SqliteSegmentStore::in_memory().unwrap();
        store.upsert_user_segment(&upsert("a1", "inside", 47.0, day(1))).unwrap();
        // Starts just outside the box, ends inside
        store.upsert_user_segment(&upsert("a1", "edge", 46.999, day(1))).unwrap();
        store.set_road_info("inside", Some("Bahnhofstrasse"), None).unwrap();

        let rows = store
            .get_user_segments_in_bbox("u1", 46.9995, 47.1, 7.9, 8.1, 1)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "inside");
        assert_eq!(rows[0].road_name.as_deref(), Some("Bahnhofstrasse"));
        assert!(!store.set_road_info("missing", None, None).unwrap());
    }

    #[test]
    fn test_preferences_persist_partial_updates() {
        let store = SqliteSegmentStore::in_memory().unwrap();
        store
            .upsert_user_preferences(
                "u1",
                &PreferencesUpdate {
                    familiarity_strength: Some(90),
                    ..Default::default()
                },
            )
            .unwrap();
        let prefs = store
            .upsert_user_preferences(
                "u1",
                &PreferencesUpdate {
                    familiarity_decay_days: Some(30),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(prefs.familiarity_strength, 90);
        assert_eq!(prefs.familiarity_decay_days, 30);
        assert_eq!(store.get_user_preferences("u1").unwrap(), prefs);
        assert_eq!(
            store.get_user_preferences("u2").unwrap(),
            UserRoadPreferences::default()
        );
    }

    #[test]
    fn test_activity_lifecycle() {
        let store = SqliteSegmentStore::in_memory().unwrap();
        for (id, d) in [("late", 9), ("early", 2)] {
            store
                .add_activity(
                    "u1",
                    &ActivityTrack {
                        activity_id: id.to_string(),
                        polyline: None,
                        start_date: day(d),
                        moving_time: None,
                        distance: None,
                    },
                )
                .unwrap();
        }

        let listed = store.list_activities("u1", &ActivityFilter::default()).unwrap();
        let ids: Vec<&str> = listed.iter().map(|a| a.activity_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);

        store.mark_processed("early", "u1").unwrap();
        assert!(store.is_processed("early").unwrap());
        assert_eq!(
            store.list_activities("u1", &ActivityFilter::default()).unwrap().len(),
            1
        );
        assert!(matches!(
            store.mark_processed("early", "u2"),
            Err(FamiliarityError::ActivityNotFound { .. })
        ));
        assert_eq!(store.get_activity_track("late", "u1").unwrap().start_date, day(9));
    }
}
