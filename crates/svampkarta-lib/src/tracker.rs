//! GPS movement detection and heading smoothing
//!
//! Raw position fixes jitter by a few decimetres even when standing still, and
//! map gestures make fixes arrive in bursts. A heading arrow is therefore only
//! shown once movement has been detected on consecutive samples, and the
//! heading it points along is low-pass filtered on the circle.
//!
//! The per-sample step is the pure [`process_sample`]; [`MovementTracker`]
//! owns the state between samples and receives map interaction events.

use crate::utils::{bearing, haversine_distance, normalize_degrees, shortest_angle_delta};
use geo::Point;
use serde::{Deserialize, Serialize};

/// Milliseconds since an arbitrary epoch, monotonic per tracker
pub type Timestamp = u64;

/// Thresholds and windows for movement detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Distance between fixes that counts as movement
    pub min_distance_m: f64,
    /// Reported speed that counts as movement
    pub min_speed_mps: f64,
    /// Samples this soon after an interaction toggle are not used for detection
    pub interaction_grace_ms: u64,
    /// Detections further apart than this restart the streak
    pub streak_window_ms: u64,
    /// Streak length at which movement is confirmed
    pub confirm_streak: u32,
    pub max_streak: u32,
    /// How long the arrow stays after the last confirmed movement
    pub arrow_window_ms: u64,
    /// Low-pass factor applied to heading changes (0..1, lower is smoother)
    pub smoothing: f64,
    /// Below this distance no bearing is computed
    pub min_heading_distance_m: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_distance_m: 0.3,
            min_speed_mps: 0.1,
            interaction_grace_ms: 500,
            streak_window_ms: 3000,
            confirm_streak: 2,
            max_streak: 5,
            arrow_window_ms: 3000,
            smoothing: 0.25,
            min_heading_distance_m: 1e-6,
        }
    }
}

/// One fix from the location provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub timestamp: Timestamp,
    pub lat: f64,
    pub lng: f64,
    /// Ground speed in m/s, when the provider reports one
    #[serde(default)]
    pub speed: Option<f64>,
    /// Course over ground in degrees, when the provider reports one
    #[serde(default)]
    pub heading: Option<f64>,
}

impl PositionSample {
    pub fn new(timestamp: Timestamp, lat: f64, lng: f64) -> Self {
        Self {
            timestamp,
            lat,
            lng,
            speed: None,
            heading: None,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    #[inline]
    pub fn position(&self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }

    /// Whether the coordinate is usable at all
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Speed if reported and a real number
    fn finite_speed(&self) -> Option<f64> {
        self.speed.filter(|s| s.is_finite())
    }

    fn finite_heading(&self) -> Option<f64> {
        self.heading.filter(|h| h.is_finite()).map(normalize_degrees)
    }
}

/// What the location marker should look like
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Indicator {
    /// Directional arrow rotated clockwise from north
    Arrow { heading: f64 },
    Dot,
}

/// Everything carried from one sample to the next
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadingState {
    pub previous: Option<Point<f64>>,
    /// Time of the last confirmed movement
    pub last_movement: Option<Timestamp>,
    pub smoothed_heading: Option<f64>,
    /// Last unsmoothed heading that fed the filter
    pub raw_heading: Option<f64>,
    pub streak: u32,
    pub last_detection: Option<Timestamp>,
    pub interacting: bool,
    /// Time the interaction flag last changed
    pub last_interaction: Option<Timestamp>,
    pub last_sample: Option<Timestamp>,
}

impl HeadingState {
    /// Record the start or end of a map gesture
    pub fn set_interacting(&mut self, interacting: bool, now: Timestamp) {
        self.interacting = interacting;
        self.last_interaction = Some(now);
    }

    fn in_interaction_grace(&self, now: Timestamp, config: &TrackerConfig) -> bool {
        self.last_interaction
            .is_some_and(|t| now.saturating_sub(t) <= config.interaction_grace_ms)
    }

    /// Arrow or dot at time `now`
    pub fn indicator(&self, now: Timestamp, config: &TrackerConfig) -> Indicator {
        let moved_recently = self
            .last_movement
            .is_some_and(|t| now.saturating_sub(t) <= config.arrow_window_ms);
        match self.smoothed_heading {
            Some(heading) if !self.interacting && moved_recently => Indicator::Arrow { heading },
            _ => Indicator::Dot,
        }
    }
}

/// Outcome of processing one sample
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerUpdate {
    pub timestamp: Timestamp,
    /// Distance from the previous fix, if there was one
    pub distance_m: Option<f64>,
    /// Movement signal seen on this sample
    pub detected: bool,
    /// Movement confirmed by the streak on this sample
    pub confirmed: bool,
    /// Fresh heading computed from this sample, before smoothing
    pub raw_heading: Option<f64>,
    /// Smoothed heading after this sample
    pub heading: Option<f64>,
    pub indicator: Indicator,
    /// The sample was malformed and left the state untouched
    pub ignored: bool,
}

/// Advance the tracker state by one sample
pub fn process_sample(
    state: &HeadingState,
    sample: &PositionSample,
    config: &TrackerConfig,
) -> (HeadingState, TrackerUpdate) {
    #[cfg(feature = "profiling")]
    profiling::scope!("tracker::process_sample");

    let now = sample.timestamp;
    if !sample.is_valid() {
        tracing::debug!(
            "Ignoring malformed position sample ({}, {}) at {}",
            sample.lat,
            sample.lng,
            now
        );
        let update = TrackerUpdate {
            timestamp: now,
            distance_m: None,
            detected: false,
            confirmed: false,
            raw_heading: None,
            heading: state.smoothed_heading,
            indicator: state.indicator(now, config),
            ignored: true,
        };
        return (state.clone(), update);
    }

    let mut next = state.clone();
    let position = sample.position();
    let distance = state.previous.map(|prev| haversine_distance(prev, position));

    let mut detected = false;
    let mut confirmed = false;
    let mut raw_heading = None;

    if !state.interacting && !state.in_interaction_grace(now, config) {
        let by_distance = distance.is_some_and(|d| d >= config.min_distance_m);
        let by_speed = sample
            .finite_speed()
            .is_some_and(|s| s >= config.min_speed_mps);
        detected = by_distance || by_speed;

        if detected {
            next.streak = match state.last_detection {
                Some(t) if now.saturating_sub(t) <= config.streak_window_ms => {
                    (state.streak + 1).min(config.max_streak)
                }
                _ => 1,
            };
            next.last_detection = Some(now);

            if next.streak >= config.confirm_streak {
                confirmed = true;
                next.last_movement = Some(now);
                raw_heading = match (state.previous, distance) {
                    (Some(prev), Some(d)) if d >= config.min_heading_distance_m => {
                        Some(bearing(prev, position))
                    }
                    _ => sample.finite_heading(),
                };
            }
        } else {
            next.streak = 0;
            next.last_detection = None;
        }
    }

    // Without a fresh heading the arrow keeps converging on the last one
    let target = raw_heading.or_else(|| {
        matches!(next.indicator(now, config), Indicator::Arrow { .. })
            .then_some(state.raw_heading)
            .flatten()
    });
    if let Some(target) = target {
        next.raw_heading = Some(target);
        next.smoothed_heading = Some(match state.smoothed_heading {
            None => target,
            Some(smoothed) => normalize_degrees(
                smoothed + shortest_angle_delta(smoothed, target) * config.smoothing,
            ),
        });
    }

    next.previous = Some(position);
    next.last_sample = Some(now);

    let update = TrackerUpdate {
        timestamp: now,
        distance_m: distance,
        detected,
        confirmed,
        raw_heading,
        heading: next.smoothed_heading,
        indicator: next.indicator(now, config),
        ignored: false,
    };
    tracing::trace!(
        "Sample at {}: streak {}, confirmed {}, heading {:?}",
        now,
        next.streak,
        confirmed,
        next.smoothed_heading
    );
    (next, update)
}

/// Holds heading state between samples
#[derive(Debug, Clone, Default)]
pub struct MovementTracker {
    config: TrackerConfig,
    state: HeadingState,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl MovementTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: HeadingState::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> &HeadingState {
        &self.state
    }

    /// Feed one sample
    pub fn process(&mut self, sample: &PositionSample) -> TrackerUpdate {
        let (state, update) = process_sample(&self.state, sample, &self.config);
        self.state = state;
        update
    }

    /// A zoom or pan gesture started
    pub fn begin_interaction(&mut self, now: Timestamp) {
        tracing::trace!("Map interaction started at {}", now);
        self.state.set_interacting(true, now);
    }

    /// The gesture ended
    pub fn end_interaction(&mut self, now: Timestamp) {
        tracing::trace!("Map interaction ended at {}", now);
        self.state.set_interacting(false, now);
    }

    /// Re-evaluate arrow or dot without a new sample
    pub fn indicator_at(&self, now: Timestamp) -> Indicator {
        self.state.indicator(now, &self.config)
    }

    /// Forget all history, keeping the configuration
    pub fn reset(&mut self) {
        self.state = HeadingState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAT: f64 = 59.0;
    const LNG: f64 = 18.0;

    /// Longitude offset of `meters` due east at `LAT`
    fn east(meters: f64) -> f64 {
        meters / (111_194.93 * LAT.to_radians().cos())
    }

    /// Latitude offset of `meters` due north
    fn north(meters: f64) -> f64 {
        meters / 111_194.93
    }

    #[test]
    fn test_first_sample_has_no_heading() {
        let mut tracker = MovementTracker::default();
        let update = tracker.process(&PositionSample::new(0, LAT, LNG));
        assert_eq!(update.distance_m, None);
        assert!(!update.detected);
        assert_eq!(update.heading, None);
        assert_eq!(update.indicator, Indicator::Dot);
    }

    #[test]
    fn test_single_detection_does_not_confirm() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG));
        let update = tracker.process(&PositionSample::new(1000, LAT, LNG + east(1.0)));
        assert!(update.detected);
        assert!(!update.confirmed);
        assert_eq!(tracker.state().streak, 1);
        assert_eq!(update.indicator, Indicator::Dot);
    }

    #[test]
    fn test_two_moving_samples_confirm_heading_east() {
        let mut tracker = MovementTracker::default();
        let first = tracker.process(&PositionSample::new(0, LAT, LNG).with_speed(1.0));
        assert!(first.detected);
        assert!(!first.confirmed);

        let second =
            tracker.process(&PositionSample::new(1000, LAT, LNG + east(1.0)).with_speed(1.0));
        assert!(second.confirmed);
        assert!((second.distance_m.unwrap() - 1.0).abs() < 0.01);
        let heading = second.heading.unwrap();
        assert!((heading - 90.0).abs() < 0.1, "heading {heading}");
        assert!(matches!(second.indicator, Indicator::Arrow { .. }));
    }

    #[test]
    fn test_walking_without_speed_confirms_on_third_sample() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG));
        tracker.process(&PositionSample::new(1000, LAT + north(1.0), LNG));
        let update = tracker.process(&PositionSample::new(2000, LAT + north(2.0), LNG));
        assert!(update.confirmed);
        let heading = update.heading.unwrap();
        assert!(heading < 0.1 || heading > 359.9, "heading {heading}");
    }

    #[test]
    fn test_jitter_below_threshold_resets_streak() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG));
        tracker.process(&PositionSample::new(1000, LAT, LNG + east(1.0)));
        assert_eq!(tracker.state().streak, 1);

        let update = tracker.process(&PositionSample::new(2000, LAT, LNG + east(1.1)));
        assert!(!update.detected);
        assert_eq!(tracker.state().streak, 0);
        assert_eq!(tracker.state().last_detection, None);
    }

    #[test]
    fn test_detections_far_apart_restart_streak() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG).with_speed(1.0));
        let update = tracker.process(&PositionSample::new(3001, LAT, LNG).with_speed(1.0));
        assert!(update.detected);
        assert!(!update.confirmed);
        assert_eq!(tracker.state().streak, 1);
    }

    #[test]
    fn test_streak_is_capped() {
        let mut tracker = MovementTracker::default();
        for i in 0..10u64 {
            tracker.process(&PositionSample::new(i * 500, LAT, LNG).with_speed(2.0));
        }
        assert_eq!(tracker.state().streak, 5);
    }

    #[test]
    fn test_interaction_suppresses_detection() {
        let mut tracker = MovementTracker::default();
        tracker.begin_interaction(0);
        for i in 1..=5u64 {
            let update = tracker.process(
                &PositionSample::new(i * 1000, LAT, LNG + east(i as f64 * 5.0)).with_speed(3.0),
            );
            assert!(!update.detected);
            assert_eq!(update.indicator, Indicator::Dot);
        }
        assert_eq!(tracker.state().streak, 0);
        assert_eq!(tracker.state().previous.map(|p| p.x()), Some(LNG + east(25.0)));
    }

    #[test]
    fn test_grace_period_after_interaction() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG).with_speed(1.0));
        tracker.begin_interaction(100);
        tracker.end_interaction(1000);

        let within = tracker.process(&PositionSample::new(1500, LAT, LNG).with_speed(1.0));
        assert!(!within.detected);
        // The streak is left alone while suppressed
        assert_eq!(tracker.state().streak, 1);

        let after = tracker.process(&PositionSample::new(1501, LAT, LNG).with_speed(1.0));
        assert!(after.detected);
        assert!(after.confirmed);
        assert_eq!(tracker.state().streak, 2);
        // No displacement and no device heading, so nothing to point along
        assert_eq!(after.heading, None);
        assert_eq!(after.indicator, Indicator::Dot);
    }

    #[test]
    fn test_arrow_window() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG).with_speed(1.0));
        tracker.process(&PositionSample::new(1000, LAT, LNG + east(1.0)).with_speed(1.0));
        assert_eq!(tracker.state().last_movement, Some(1000));

        assert!(matches!(tracker.indicator_at(3999), Indicator::Arrow { .. }));
        assert!(matches!(tracker.indicator_at(4000), Indicator::Arrow { .. }));
        assert_eq!(tracker.indicator_at(4001), Indicator::Dot);
    }

    #[test]
    fn test_arrow_hidden_while_interacting() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG).with_speed(1.0));
        tracker.process(&PositionSample::new(1000, LAT, LNG + east(1.0)).with_speed(1.0));
        tracker.begin_interaction(1200);
        assert_eq!(tracker.indicator_at(1300), Indicator::Dot);
        tracker.end_interaction(1400);
        assert!(matches!(tracker.indicator_at(1500), Indicator::Arrow { .. }));
    }

    #[test]
    fn test_smoothing_moves_quarter_of_shortest_arc() {
        let config = TrackerConfig::default();
        let state = HeadingState {
            previous: Some(Point::new(LNG, LAT)),
            smoothed_heading: Some(350.0),
            streak: 1,
            last_detection: Some(0),
            ..HeadingState::default()
        };
        // Due east, 90 degrees; the shortest arc from 350 is +100
        let sample = PositionSample::new(1000, LAT, LNG + east(2.0));
        let (next, update) = process_sample(&state, &sample, &config);
        assert!(update.confirmed);
        let heading = next.smoothed_heading.unwrap();
        assert!((heading - 15.0).abs() < 0.1, "heading {heading}");
    }

    #[test]
    fn test_heading_keeps_converging_after_stop() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG).with_speed(1.0));
        tracker.process(&PositionSample::new(500, LAT, LNG + east(1.0)).with_speed(1.0));
        let turned = tracker.process(
            &PositionSample::new(1000, LAT + north(1.0), LNG + east(1.0)).with_speed(1.0),
        );
        let turned = turned.heading.unwrap();
        assert!((turned - 67.5).abs() < 0.1, "heading {turned}");

        // Standing still, the arrow is still shown and eases towards north
        let stopped =
            tracker.process(&PositionSample::new(1500, LAT + north(1.0), LNG + east(1.0)));
        assert!(!stopped.detected);
        assert_eq!(stopped.raw_heading, None);
        let heading = stopped.heading.unwrap();
        assert!((heading - 50.625).abs() < 0.1, "heading {heading}");
        assert_eq!(stopped.indicator, Indicator::Arrow { heading });

        let later =
            tracker.process(&PositionSample::new(2000, LAT + north(1.0), LNG + east(1.0)));
        assert!(later.heading.unwrap() < heading);
    }

    #[test]
    fn test_no_convergence_once_arrow_hidden() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG).with_speed(1.0));
        tracker.process(&PositionSample::new(500, LAT, LNG + east(1.0)).with_speed(1.0));
        let heading = tracker.state().smoothed_heading;
        let update = tracker.process(&PositionSample::new(5000, LAT, LNG + east(1.0)));
        assert_eq!(update.indicator, Indicator::Dot);
        assert_eq!(update.heading, heading);
    }

    #[test]
    fn test_device_heading_used_without_displacement() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG).with_speed(1.0));
        let update = tracker.process(
            &PositionSample::new(1000, LAT, LNG)
                .with_speed(1.0)
                .with_heading(-90.0),
        );
        assert!(update.confirmed);
        assert_eq!(update.raw_heading, Some(270.0));
    }

    #[test]
    fn test_non_finite_speed_is_no_signal() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG));
        let update = tracker.process(&PositionSample::new(1000, LAT, LNG).with_speed(f64::NAN));
        assert!(!update.detected);
    }

    #[test]
    fn test_malformed_sample_is_ignored() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG).with_speed(1.0));
        let before = tracker.state().clone();

        let update = tracker.process(&PositionSample::new(500, f64::NAN, LNG));
        assert!(update.ignored);
        assert_eq!(tracker.state(), &before);

        let update = tracker.process(&PositionSample::new(600, 95.0, LNG));
        assert!(update.ignored);
        assert_eq!(tracker.state(), &before);
    }

    #[test]
    fn test_reset() {
        let mut tracker = MovementTracker::default();
        tracker.process(&PositionSample::new(0, LAT, LNG).with_speed(1.0));
        tracker.reset();
        assert_eq!(tracker.state(), &HeadingState::default());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: TrackerConfig = serde_json::from_str(r#"{"min_distance_m": 1.5}"#).unwrap();
        assert_eq!(config.min_distance_m, 1.5);
        assert_eq!(config.arrow_window_ms, 3000);
    }
}
