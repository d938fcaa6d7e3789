//! # Familiarity Engine
//!
//! Ties extraction, storage and scoring together behind the operations a host
//! (typically an HTTP layer) calls.
//!
//! ## Architecture
//!
//! The engine owns a [`SegmentStore`] and an [`EngineConfig`]. It keeps no
//! other state: every call extracts fresh segments and reads history from the
//! store. Activity tracks come from an [`ActivitySource`] passed per call.
//!
//! Store failures on individual segments or activities are collected as
//! [`ItemError`]s so one bad row never aborts a batch. Batches are capped and
//! report how many activities remain, so a host resumes by simply calling
//! again.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{FamiliarityError, ItemError, Result};
use crate::loops::{LoopConfig, LoopRequest, LoopWaypointSelector, LoopWaypoints};
use crate::preferences::{PreferencesUpdate, UserRoadPreferences};
use crate::scoring::{RouteInput, RoutePreferenceScore, RouteScorer, ScoringConfig};
use crate::segments::{RoadSegment, SegmentConfig, SegmentExtractor};
use crate::store::{
    ActivityFilter, ActivitySource, ActivityTrack, PreferenceRow, SegmentStats, SegmentStore,
    SegmentUpsert,
};

// ============================================================================
// Configuration
// ============================================================================

/// Limits for batch extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchConfig {
    /// Activities per batch when the caller gives no limit.
    /// Default: 10
    pub default_limit: usize,

    /// Hard ceiling on activities per batch, and on failed attempts
    /// tolerated within one batch.
    /// Default: 50
    pub max_limit: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 50,
        }
    }
}

impl BatchConfig {
    /// Effective limit for a request, clamped to [1, max_limit].
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub segments: SegmentConfig,
    pub scoring: ScoringConfig,
    pub loops: LoopConfig,
    pub batch: BatchConfig,
}

impl EngineConfig {
    /// Parse a (possibly partial) JSON configuration and validate it.
    ///
    /// # Example
    /// ```
    /// use road_familiarity::EngineConfig;
    ///
    /// let config = EngineConfig::from_json(r#"{"segments": {"targetLength": 250}}"#).unwrap();
    /// assert_eq!(config.segments.target_length, 250.0);
    /// assert_eq!(config.segments.min_length, 50.0);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.segments.validate()?;

        if !self.scoring.unknown_segment_score.is_finite()
            || self.scoring.unknown_segment_score < 0.0
        {
            return Err(FamiliarityError::ConfigError {
                message: "unknown_segment_score must be a non-negative number".to_string(),
            });
        }
        if self.loops.waypoint_dedup_meters < 0.0
            || self.loops.ride_count_tie_break_meters < 0.0
            || !(self.loops.target_radius_fraction > 0.0)
        {
            return Err(FamiliarityError::ConfigError {
                message: "loop distances must be non-negative and target_radius_fraction positive"
                    .to_string(),
            });
        }
        if self.batch.max_limit == 0 {
            return Err(FamiliarityError::ConfigError {
                message: "batch max_limit must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Inputs and outcomes
// ============================================================================

/// Who rode a track, and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionContext {
    pub user_id: String,
    pub activity_id: String,
    pub activity_date: DateTime<Utc>,
    pub moving_time_seconds: Option<u32>,
    pub distance_meters: Option<f64>,
}

impl ExtractionContext {
    pub fn from_track(user_id: &str, track: &ActivityTrack) -> Self {
        Self {
            user_id: user_id.to_string(),
            activity_id: track.activity_id.clone(),
            activity_date: track.start_date,
            moving_time_seconds: track.moving_time,
            distance_meters: track.distance,
        }
    }

    /// Average speed in m/s, when distance and moving time are known.
    pub fn avg_speed_ms(&self) -> Option<f64> {
        match (self.distance_meters, self.moving_time_seconds) {
            (Some(distance), Some(time)) if distance > 0.0 && time > 0 => {
                Some(distance / time as f64)
            }
            _ => None,
        }
    }
}

/// Result of extracting and storing one track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub extracted: u32,
    pub stored: u32,
    /// Whether the source activity was marked processed afterwards
    pub marked_processed: bool,
    /// One entry per segment whose upsert failed, keyed by segment hash, or
    /// per activity that could not be marked processed
    pub errors: Vec<ItemError>,
}

/// Options for one batch of activity extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchOptions {
    /// Activities to process; clamped to the configured range
    pub limit: Option<usize>,
    pub include_processed: bool,
    pub after_date: Option<DateTime<Utc>>,
    pub before_date: Option<DateTime<Utc>>,
}

impl BatchOptions {
    fn filter(&self) -> ActivityFilter {
        ActivityFilter {
            include_processed: self.include_processed,
            after_date: self.after_date,
            before_date: self.before_date,
        }
    }
}

/// Result of one batch of activity extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// Activities fully stored and marked processed
    pub processed: u32,
    pub segments_stored: u32,
    /// Activities attempted but left unprocessed, retried by a later batch
    pub failed: u32,
    /// Matching activities not attempted in this batch
    pub remaining: u32,
    /// One entry per failed activity, keyed by activity id
    pub errors: Vec<ItemError>,
}

/// A candidate route's position in a ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedRoute {
    /// Position of the route in the input list
    pub index: usize,
    /// 1 for the most familiar route
    pub rank: usize,
    pub score: RoutePreferenceScore,
}

/// How one batch candidate ended.
enum ActivityResult {
    /// Stored and marked processed
    Processed { stored: u32 },
    /// No usable track; marked processed so it is not retried
    Skipped(ItemError),
    /// Left unprocessed for a later batch
    Failed { stored: u32, error: ItemError },
}

// ============================================================================
// Engine
// ============================================================================

/// Road familiarity engine over a segment store.
pub struct FamiliarityEngine<S: SegmentStore> {
    store: S,
    config: EngineConfig,
    extractor: SegmentExtractor,
    scorer: RouteScorer,
    loops: LoopWaypointSelector,
}

impl<S: SegmentStore> FamiliarityEngine<S> {
    /// Create an engine with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    /// Create an engine with a custom configuration.
    pub fn with_config(store: S, config: EngineConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("[FamiliarityEngine] {}", e);
        }
        Self {
            extractor: SegmentExtractor::new(config.segments.clone()),
            scorer: RouteScorer::new(config.segments.clone(), config.scoring.clone()),
            loops: LoopWaypointSelector::new(config.loops.clone()),
            store,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Extraction
    // ========================================================================

    /// Extract segments from a track without storing anything.
    pub fn extract_segments(&self, track: &RouteInput) -> Vec<RoadSegment> {
        match track {
            RouteInput::Encoded(encoded) => self.extractor.extract_from_polyline(encoded),
            RouteInput::Coordinates(points) => self.extractor.extract_from_points(points),
        }
    }

    /// Extract segments from a track and record a ride on each.
    ///
    /// Upserts are independent: a failed segment is reported in `errors` and
    /// the rest are still stored. Nothing is marked processed; use
    /// [`Self::extract_and_store_activity`] for tracks that come from an
    /// [`ActivitySource`].
    pub fn extract_and_store_segments(
        &self,
        track: &RouteInput,
        ctx: &ExtractionContext,
    ) -> ExtractionOutcome {
        let segments = self.extract_segments(track);
        self.store_segments(&segments, ctx)
    }

    /// Extract and store a source activity's track, then mark the activity
    /// processed in `source` if every segment was stored.
    pub fn extract_and_store_activity<A: ActivitySource + ?Sized>(
        &self,
        source: &A,
        track: &RouteInput,
        ctx: &ExtractionContext,
    ) -> ExtractionOutcome {
        let segments = self.extract_segments(track);
        self.store_and_mark(source, &segments, ctx)
    }

    fn store_and_mark<A: ActivitySource + ?Sized>(
        &self,
        source: &A,
        segments: &[RoadSegment],
        ctx: &ExtractionContext,
    ) -> ExtractionOutcome {
        let mut outcome = self.store_segments(segments, ctx);
        if !outcome.errors.is_empty() {
            return outcome;
        }

        match source.mark_processed(&ctx.activity_id, &ctx.user_id) {
            Ok(()) => outcome.marked_processed = true,
            Err(e) => {
                warn!(
                    "[FamiliarityEngine] Could not mark activity {} processed: {}",
                    ctx.activity_id, e
                );
                outcome.errors.push(ItemError::new(&ctx.activity_id, &e));
            }
        }
        outcome
    }

    fn store_segments(&self, segments: &[RoadSegment], ctx: &ExtractionContext) -> ExtractionOutcome {
        let avg_speed = ctx.avg_speed_ms();
        let mut outcome = ExtractionOutcome {
            extracted: segments.len() as u32,
            ..Default::default()
        };

        for segment in segments {
            let upsert = SegmentUpsert::from_segment(
                &ctx.user_id,
                &ctx.activity_id,
                segment,
                avg_speed,
                ctx.activity_date,
            );
            match self.store.upsert_user_segment(&upsert) {
                Ok(()) => outcome.stored += 1,
                Err(e) => {
                    warn!(
                        "[FamiliarityEngine] Failed to store segment {} for activity {}: {}",
                        segment.segment_hash, ctx.activity_id, e
                    );
                    outcome.errors.push(ItemError::new(&segment.segment_hash, &e));
                }
            }
        }

        debug!(
            "[FamiliarityEngine] Activity {}: {}/{} segments stored",
            ctx.activity_id, outcome.stored, outcome.extracted
        );
        outcome
    }

    /// Extract and store segments for a user's unprocessed activities, oldest
    /// first, until `limit` activities have been processed or skipped.
    ///
    /// An activity is marked processed only if every one of its segments was
    /// stored. One that fails is counted in `failed` and retried by a later
    /// batch, but does not use up the limit: the batch moves on to the next
    /// candidate, so a permanently failing activity never stalls the ones
    /// behind it. At most `max_limit` failures are tolerated per batch.
    /// Activities without a usable track are reported and marked processed,
    /// since retrying cannot help.
    pub fn extract_segments_for_user_batch<A: ActivitySource + ?Sized>(
        &self,
        source: &A,
        user_id: &str,
        options: &BatchOptions,
    ) -> Result<BatchOutcome> {
        let candidates = source.list_activities(user_id, &options.filter())?;
        let limit = self.config.batch.effective_limit(options.limit);
        let failure_budget = self.config.batch.max_limit.max(1);

        info!(
            "[FamiliarityEngine] Batch for {}: {} candidates, limit {}",
            user_id,
            candidates.len(),
            limit
        );

        let mut outcome = BatchOutcome::default();
        let mut completed = 0;
        let mut attempted = 0;

        for activity in &candidates {
            if completed >= limit || outcome.failed as usize >= failure_budget {
                break;
            }
            attempted += 1;

            match self.process_activity(source, user_id, &activity.activity_id) {
                ActivityResult::Processed { stored } => {
                    outcome.processed += 1;
                    outcome.segments_stored += stored;
                    completed += 1;
                }
                ActivityResult::Skipped(error) => {
                    outcome.errors.push(error);
                    completed += 1;
                }
                ActivityResult::Failed { stored, error } => {
                    outcome.failed += 1;
                    outcome.segments_stored += stored;
                    outcome.errors.push(error);
                }
            }
        }
        outcome.remaining = (candidates.len() - attempted) as u32;

        info!(
            "[FamiliarityEngine] Batch for {} done: {} processed, {} failed, {} segments, {} remaining",
            user_id,
            outcome.processed,
            outcome.failed,
            outcome.segments_stored,
            outcome.remaining
        );
        Ok(outcome)
    }

    fn process_activity<A: ActivitySource + ?Sized>(
        &self,
        source: &A,
        user_id: &str,
        activity_id: &str,
    ) -> ActivityResult {
        let track = match source.get_activity_track(activity_id, user_id) {
            Ok(track) => track,
            Err(e) => {
                warn!("[FamiliarityEngine] Could not load activity {}: {}", activity_id, e);
                return ActivityResult::Failed {
                    stored: 0,
                    error: ItemError::new(activity_id, &e),
                };
            }
        };

        let segments = match self.segments_for_track(&track) {
            Ok(segments) => segments,
            Err(e) => {
                warn!("[FamiliarityEngine] Skipping activity {}: {}", activity_id, e);
                return match source.mark_processed(activity_id, user_id) {
                    Ok(()) => ActivityResult::Skipped(ItemError::new(activity_id, &e)),
                    Err(mark_err) => ActivityResult::Failed {
                        stored: 0,
                        error: ItemError {
                            item_id: activity_id.to_string(),
                            message: format!("{}; could not mark processed: {}", e, mark_err),
                        },
                    },
                };
            }
        };

        let ctx = ExtractionContext::from_track(user_id, &track);
        let mut stored = self.store_and_mark(source, &segments, &ctx);
        if stored.marked_processed {
            return ActivityResult::Processed {
                stored: stored.stored,
            };
        }

        let error = if stored.stored < stored.extracted {
            ItemError {
                item_id: activity_id.to_string(),
                message: format!(
                    "{} of {} segments failed to store: {}",
                    stored.errors.len(),
                    stored.extracted,
                    stored.errors.first().map(|e| e.message.as_str()).unwrap_or_default()
                ),
            }
        } else {
            stored.errors.pop().unwrap_or_else(|| ItemError {
                item_id: activity_id.to_string(),
                message: "activity was not marked processed".to_string(),
            })
        };
        ActivityResult::Failed {
            stored: stored.stored,
            error,
        }
    }

    fn segments_for_track(&self, track: &ActivityTrack) -> Result<Vec<RoadSegment>> {
        match track.polyline.as_deref() {
            Some(encoded) if !encoded.is_empty() => {
                self.extractor.try_extract_from_polyline(encoded)
            }
            _ => Err(FamiliarityError::MissingTrack {
                activity_id: track.activity_id.clone(),
            }),
        }
    }

    // ========================================================================
    // Scoring
    // ========================================================================

    /// Familiarity score of one candidate route for a user.
    pub fn score_route(&self, route: &RouteInput, user_id: &str) -> Result<RoutePreferenceScore> {
        self.scorer.score(&self.store, user_id, route)
    }

    /// Score several candidate routes and rank them, most familiar first.
    ///
    /// Ties on score go to the route with more familiar km, then to the
    /// earlier route. History is fetched in a single store call.
    pub fn score_multiple_routes(
        &self,
        routes: &[RouteInput],
        user_id: &str,
    ) -> Result<Vec<RankedRoute>> {
        let extracted = self.extract_all(routes);

        let mut hashes: Vec<String> = extracted
            .iter()
            .flatten()
            .map(|s| s.segment_hash.clone())
            .collect();
        hashes.sort();
        hashes.dedup();

        let rows = if hashes.is_empty() {
            Vec::new()
        } else {
            self.store.get_segment_preferences(user_id, &hashes)?
        };
        let by_hash: HashMap<&str, &PreferenceRow> =
            rows.iter().map(|r| (r.segment_hash.as_str(), r)).collect();

        let mut ranked: Vec<RankedRoute> = extracted
            .iter()
            .enumerate()
            .map(|(index, segments)| {
                let route_rows: Vec<PreferenceRow> = segments
                    .iter()
                    .filter_map(|s| by_hash.get(s.segment_hash.as_str()).map(|r| (*r).clone()))
                    .collect();
                RankedRoute {
                    index,
                    rank: 0,
                    score: self.scorer.aggregate(segments, &route_rows),
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .overall_score
                .partial_cmp(&a.score.overall_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    b.score
                        .familiar_km
                        .partial_cmp(&a.score.familiar_km)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.index.cmp(&b.index))
        });
        for (position, route) in ranked.iter_mut().enumerate() {
            route.rank = position + 1;
        }

        debug!(
            "[FamiliarityEngine] Ranked {} routes over {} unique segments",
            ranked.len(),
            hashes.len()
        );
        Ok(ranked)
    }

    #[cfg(feature = "parallel")]
    fn extract_all(&self, routes: &[RouteInput]) -> Vec<Vec<RoadSegment>> {
        use rayon::prelude::*;
        routes
            .par_iter()
            .map(|route| self.scorer.extract(route))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn extract_all(&self, routes: &[RouteInput]) -> Vec<Vec<RoadSegment>> {
        routes.iter().map(|route| self.scorer.extract(route)).collect()
    }

    // ========================================================================
    // Loops
    // ========================================================================

    /// Waypoints that steer a loop over the user's familiar segments.
    pub fn get_loop_waypoints(&self, user_id: &str, request: &LoopRequest) -> Result<LoopWaypoints> {
        self.loops.select_from_store(&self.store, user_id, request)
    }

    // ========================================================================
    // Store passthroughs
    // ========================================================================

    pub fn get_user_segment_stats(&self, user_id: &str) -> Result<SegmentStats> {
        self.store.get_user_segment_stats(user_id)
    }

    pub fn get_user_preferences(&self, user_id: &str) -> Result<UserRoadPreferences> {
        self.store.get_user_preferences(user_id)
    }

    pub fn update_user_preferences(
        &self,
        user_id: &str,
        update: &PreferencesUpdate,
    ) -> Result<UserRoadPreferences> {
        let prefs = self.store.upsert_user_preferences(user_id, update)?;
        info!("[FamiliarityEngine] Updated preferences for {}", user_id);
        Ok(prefs)
    }
}
