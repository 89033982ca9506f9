//! Fix-quality filter.
//!
//! Decides, reading by reading, whether a new sample supersedes the best fix
//! seen so far, whether the provider can be stopped, and whether an address
//! lookup should be started. The filter only reports intents; it never talks
//! to the provider or the resolver itself.

use chrono::{DateTime, Utc};

use super::geo::distance_m;
use super::types::Reading;
use crate::config::AcquisitionConfig;

/// Why a reading was dropped before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Older than the maximum reading age; most likely a cached position.
    Stale,
    /// Negative (or NaN) horizontal accuracy.
    InvalidAccuracy,
}

/// The filter's verdict for one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decision {
    /// The reading replaced the best fix.
    pub accept: bool,
    /// The provider should be stopped.
    pub stop: bool,
    /// A reverse-geocoding request should be started for this reading.
    pub resolve: bool,
    pub rejection: Option<Rejection>,
}

impl Decision {
    fn rejected(reason: Rejection) -> Self {
        Self {
            rejection: Some(reason),
            ..Self::default()
        }
    }
}

/// Tracks the best fix of one acquisition session.
#[derive(Debug, Clone)]
pub struct FixFilter {
    desired_accuracy: f64,
    max_age_secs: f64,
    stagnation_secs: f64,
    stationary_radius: f64,
    best: Option<Reading>,
}

impl FixFilter {
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            desired_accuracy: config.desired_accuracy,
            max_age_secs: config.max_reading_age.as_secs_f64(),
            stagnation_secs: config.stagnation_window.as_secs_f64(),
            stationary_radius: config.stationary_radius,
            best: None,
        }
    }

    pub fn best(&self) -> Option<&Reading> {
        self.best.as_ref()
    }

    /// Forget the best fix. Called whenever a session starts or stops.
    pub fn reset(&mut self) {
        self.best = None;
    }

    /// Evaluate `reading` at wall-clock time `now`.
    ///
    /// `resolve_in_flight` is whether an address lookup is currently running;
    /// a new one is only requested when none is, except for a final fix that
    /// moved away from the previous best, which always gets a fresh lookup.
    pub fn consider(&mut self, reading: &Reading, now: DateTime<Utc>, resolve_in_flight: bool) -> Decision {
        if secs_between(now, reading.timestamp) > self.max_age_secs {
            return Decision::rejected(Rejection::Stale);
        }
        if reading.accuracy.is_nan() || reading.accuracy < 0.0 {
            return Decision::rejected(Rejection::InvalidAccuracy);
        }

        let distance = self
            .best
            .map(|best| distance_m(best.coordinate(), reading.coordinate()))
            .unwrap_or(f64::INFINITY);

        let mut decision = Decision::default();

        match self.best {
            Some(best) if reading.accuracy >= best.accuracy => {
                if distance < self.stationary_radius
                    && secs_between(reading.timestamp, best.timestamp) > self.stagnation_secs
                {
                    log::debug!("Fix stagnated at {:.1}m, forcing stop", best.accuracy);
                    decision.stop = true;
                }
            }
            _ => {
                self.best = Some(*reading);
                decision.accept = true;

                let mut in_flight = resolve_in_flight;
                if reading.accuracy <= self.desired_accuracy {
                    log::debug!("Reached desired accuracy ({:.1}m)", reading.accuracy);
                    decision.stop = true;
                    if distance > 0.0 {
                        in_flight = false;
                    }
                }
                decision.resolve = !in_flight;
            }
        }

        decision
    }
}

/// Signed seconds from `earlier` to `later`.
fn secs_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn reading_at(secs: i64, accuracy: f64) -> Reading {
        Reading::new(59.3293, 18.0686, accuracy, t0() + Duration::seconds(secs))
    }

    fn filter() -> FixFilter {
        FixFilter::new(&AcquisitionConfig::default())
    }

    #[test]
    fn test_negative_accuracy_rejected() {
        let mut f = filter();
        let d = f.consider(&reading_at(0, -1.0), t0(), false);
        assert_eq!(d.rejection, Some(Rejection::InvalidAccuracy));
        assert!(!d.accept && !d.stop && !d.resolve);
        assert!(f.best().is_none());
    }

    #[test]
    fn test_nan_accuracy_rejected() {
        let mut f = filter();
        let d = f.consider(&reading_at(0, f64::NAN), t0(), false);
        assert_eq!(d.rejection, Some(Rejection::InvalidAccuracy));
    }

    #[test]
    fn test_invalid_reading_leaves_best_unchanged() {
        let mut f = filter();
        f.consider(&reading_at(0, 50.0), t0(), false);
        let d = f.consider(&reading_at(1, -5.0), t0() + Duration::seconds(1), false);
        assert_eq!(d.rejection, Some(Rejection::InvalidAccuracy));
        assert_eq!(f.best().unwrap().accuracy, 50.0);
    }

    #[test]
    fn test_stale_reading_rejected() {
        let mut f = filter();
        let now = t0() + Duration::milliseconds(5_001);
        let d = f.consider(&reading_at(0, 5.0), now, false);
        assert_eq!(d.rejection, Some(Rejection::Stale));
        assert!(!d.accept && !d.stop && !d.resolve);
        assert!(f.best().is_none());
    }

    #[test]
    fn test_reading_exactly_at_max_age_is_kept() {
        let mut f = filter();
        let d = f.consider(&reading_at(0, 50.0), t0() + Duration::seconds(5), false);
        assert!(d.accept);
    }

    #[test]
    fn test_first_valid_reading_accepted() {
        let mut f = filter();
        let d = f.consider(&reading_at(0, 500.0), t0(), false);
        assert!(d.accept);
        assert!(d.resolve);
        assert!(!d.stop);
        assert_eq!(f.best().unwrap().accuracy, 500.0);
    }

    #[test]
    fn test_no_resolve_while_one_is_in_flight() {
        let mut f = filter();
        f.consider(&reading_at(0, 100.0), t0(), false);
        let d = f.consider(&reading_at(1, 50.0), t0() + Duration::seconds(1), true);
        assert!(d.accept);
        assert!(!d.resolve);
    }

    #[test]
    fn test_worse_reading_not_accepted() {
        let mut f = filter();
        f.consider(&reading_at(0, 30.0), t0(), false);
        let d = f.consider(&reading_at(1, 80.0), t0() + Duration::seconds(1), false);
        assert!(d.rejection.is_none());
        assert!(!d.accept && !d.resolve && !d.stop);
        assert_eq!(f.best().unwrap().accuracy, 30.0);
    }

    #[test]
    fn test_accuracy_monotonic_across_accepts() {
        let mut f = filter();
        let accuracies = [120.0, 300.0, 80.0, 80.0, 95.0, 40.0, 65.0, 20.0];
        let mut accepted = Vec::new();
        for (i, acc) in accuracies.iter().enumerate() {
            let r = reading_at(i as i64, *acc);
            if f.consider(&r, r.timestamp, false).accept {
                accepted.push(*acc);
            }
        }
        assert_eq!(accepted, vec![120.0, 80.0, 40.0, 20.0]);
        assert!(accepted.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_desired_accuracy_stops() {
        let mut f = filter();
        f.consider(&reading_at(0, 65.0), t0(), false);
        let d = f.consider(&reading_at(1, 10.0), t0() + Duration::seconds(1), false);
        assert!(d.accept && d.stop && d.resolve);
    }

    #[test]
    fn test_final_fix_that_moved_forces_resolve() {
        let mut f = filter();
        f.consider(&reading_at(0, 65.0), t0(), false);
        let moved = Reading::new(59.3300, 18.0700, 8.0, t0() + Duration::seconds(2));
        let d = f.consider(&moved, moved.timestamp, true);
        assert!(d.stop);
        assert!(d.resolve, "a final fix that moved must be resolved even with a lookup running");
    }

    #[test]
    fn test_final_fix_in_same_place_waits_for_running_lookup() {
        let mut f = filter();
        f.consider(&reading_at(0, 65.0), t0(), false);
        let d = f.consider(&reading_at(2, 8.0), t0() + Duration::seconds(2), true);
        assert!(d.stop);
        assert!(!d.resolve);
    }

    #[test]
    fn test_stagnation_forces_stop() {
        // desired 10m, 50m readings every second from the same spot
        let mut f = filter();
        let mut stopped_at = None;
        for s in 0..=15 {
            let r = reading_at(s, 50.0);
            let d = f.consider(&r, r.timestamp, s > 0);
            if d.stop {
                stopped_at = Some(s);
                break;
            }
        }
        assert_eq!(stopped_at, Some(11));
        assert_eq!(f.best().unwrap().accuracy, 50.0);
    }

    #[test]
    fn test_no_stagnation_stop_when_moving() {
        let mut f = filter();
        f.consider(&reading_at(0, 50.0), t0(), false);
        let far = Reading::new(59.3400, 18.0686, 50.0, t0() + Duration::seconds(20));
        let d = f.consider(&far, far.timestamp, false);
        assert!(!d.stop);
    }

    #[test]
    fn test_reset_forgets_best() {
        let mut f = filter();
        f.consider(&reading_at(0, 50.0), t0(), false);
        f.reset();
        assert!(f.best().is_none());
        let d = f.consider(&reading_at(1, 900.0), t0() + Duration::seconds(1), false);
        assert!(d.accept);
    }
}
