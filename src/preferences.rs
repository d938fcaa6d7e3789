//! Per-segment familiarity scoring.
//!
//! A segment's score is a multiplier >= 1.0. Unknown segments are neutral
//! (1.0); ridden segments climb a fixed curve up to 1.50, scaled by the
//! user's familiarity strength and eroded towards neutral when the segment
//! has not been ridden for longer than the decay window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score of a segment with no ride history.
pub const NEUTRAL_SCORE: f64 = 1.0;

/// Highest base score, reached above ten rides.
pub const MAX_BASE_SCORE: f64 = 1.50;

/// Decay never removes more than half of the familiarity bonus.
const MIN_DECAY_FACTOR: f64 = 0.5;

/// A user's road preference settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserRoadPreferences {
    /// How strongly history biases scoring, 0-100.
    /// Default: 50
    pub familiarity_strength: u32,

    /// Rides before a segment counts as familiar. Informational for callers.
    /// Default: 2
    pub min_rides_for_familiar: u32,

    /// Weight of recency, 0-100. Advisory; decay is driven by
    /// `familiarity_decay_days`.
    /// Default: 30
    pub recency_weight: u32,

    /// Days after the last ride before familiarity starts to fade. 0 disables.
    /// Default: 180
    pub familiarity_decay_days: u32,
}

impl Default for UserRoadPreferences {
    fn default() -> Self {
        Self {
            familiarity_strength: 50,
            min_rides_for_familiar: 2,
            recency_weight: 30,
            familiarity_decay_days: 180,
        }
    }
}

impl UserRoadPreferences {
    /// Apply a partial update, clamping percentages to 0-100.
    pub fn apply(&mut self, update: &PreferencesUpdate) {
        if let Some(strength) = update.familiarity_strength {
            self.familiarity_strength = strength.min(100);
        }
        if let Some(min_rides) = update.min_rides_for_familiar {
            self.min_rides_for_familiar = min_rides.max(1);
        }
        if let Some(weight) = update.recency_weight {
            self.recency_weight = weight.min(100);
        }
        if let Some(days) = update.familiarity_decay_days {
            self.familiarity_decay_days = days;
        }
    }
}

/// Partial update of [`UserRoadPreferences`]; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreferencesUpdate {
    pub familiarity_strength: Option<u32>,
    pub min_rides_for_familiar: Option<u32>,
    pub recency_weight: Option<u32>,
    pub familiarity_decay_days: Option<u32>,
}

/// How much ride history backs a segment or route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Unknown,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Unknown => "unknown",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
        }
    }
}

/// Confidence label for a segment's ride count. Display only.
pub fn get_confidence_level(ride_count: u32) -> ConfidenceLevel {
    match ride_count {
        0 => ConfidenceLevel::Unknown,
        1 => ConfidenceLevel::Low,
        2..=4 => ConfidenceLevel::Medium,
        _ => ConfidenceLevel::High,
    }
}

/// Base score for a ride count, before strength and decay.
///
/// | rides | score                      |
/// |-------|----------------------------|
/// | 0     | 1.00                       |
/// | 1     | 1.10                       |
/// | 2-3   | 1.20 + 0.05 per ride > 1   |
/// | 4-5   | 1.30 + 0.025 per ride > 3  |
/// | 6-10  | 1.35 + 0.03 per ride > 5   |
/// | > 10  | 1.50                       |
pub fn base_score(ride_count: u32) -> f64 {
    let n = ride_count as f64;
    match ride_count {
        0 => NEUTRAL_SCORE,
        1 => 1.10,
        2..=3 => 1.20 + 0.05 * (n - 1.0),
        4..=5 => 1.30 + 0.025 * (n - 3.0),
        6..=10 => (1.35 + 0.03 * (n - 5.0)).min(MAX_BASE_SCORE),
        _ => MAX_BASE_SCORE,
    }
}

/// Familiarity score for a segment as of now.
///
/// # Example
/// ```
/// use road_familiarity::{calculate_preference_score, UserRoadPreferences};
///
/// let prefs = UserRoadPreferences::default();
/// assert_eq!(calculate_preference_score(0, None, &prefs), 1.0);
/// assert!(calculate_preference_score(5, None, &prefs) > 1.0);
/// ```
pub fn calculate_preference_score(
    ride_count: u32,
    last_ridden_at: Option<DateTime<Utc>>,
    prefs: &UserRoadPreferences,
) -> f64 {
    calculate_preference_score_at(ride_count, last_ridden_at, prefs, Utc::now())
}

/// Familiarity score for a segment as of `now`.
pub fn calculate_preference_score_at(
    ride_count: u32,
    last_ridden_at: Option<DateTime<Utc>>,
    prefs: &UserRoadPreferences,
    now: DateTime<Utc>,
) -> f64 {
    if ride_count == 0 {
        return NEUTRAL_SCORE;
    }

    let strength = prefs.familiarity_strength.min(100) as f64 / 100.0;
    let mut bonus = (base_score(ride_count) - NEUTRAL_SCORE) * strength;

    if let Some(last) = last_ridden_at {
        bonus *= decay_factor(last, prefs.familiarity_decay_days, now);
    }

    NEUTRAL_SCORE + bonus
}

/// Linear fade of the familiarity bonus once `decay_days` have passed,
/// floored at 0.5.
fn decay_factor(last_ridden_at: DateTime<Utc>, decay_days: u32, now: DateTime<Utc>) -> f64 {
    if decay_days == 0 {
        return 1.0;
    }

    let elapsed_days = (now - last_ridden_at).num_seconds() as f64 / 86_400.0;
    let decay_days = decay_days as f64;
    if elapsed_days <= decay_days {
        return 1.0;
    }

    (1.0 - (elapsed_days - decay_days) / decay_days).max(MIN_DECAY_FACTOR)
}
