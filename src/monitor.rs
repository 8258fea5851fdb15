use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::entities::DeviationLevel;

pub const DEVIATION_MINOR_THRESHOLD_M: f64 = 300.0;
pub const DEVIATION_MAJOR_THRESHOLD_M: f64 = 700.0;
pub const DEVIATION_SUSTAIN_SECS: i64 = 20;

pub const TRACKING_MINOR_GAP_SECS: i64 = 15;
pub const TRACKING_MAJOR_GAP_SECS: i64 = 45;

/// In-memory drift tracker for one in-progress trip. A deviation only fires
/// after the distance stays over a threshold for the sustain period, and the
/// timer restarts after each trigger so a trip parked off-route alerts once
/// per window instead of on every ping.
#[derive(Clone, Debug, Default)]
pub struct DeviationWindow {
    over_minor_since: Option<DateTime<Utc>>,
    over_major_since: Option<DateTime<Utc>>,
    major_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviationTrigger {
    pub level: DeviationLevel,
    /// Second and later major triggers escalate severity.
    pub repeated: bool,
}

impl DeviationWindow {
    pub fn observe(&mut self, distance_m: f64, now: DateTime<Utc>) -> Option<DeviationTrigger> {
        let sustain = Duration::seconds(DEVIATION_SUSTAIN_SECS);

        if distance_m < DEVIATION_MINOR_THRESHOLD_M {
            self.over_minor_since = None;
            self.over_major_since = None;
            return None;
        }

        if distance_m < DEVIATION_MAJOR_THRESHOLD_M {
            self.over_major_since = None;
        } else {
            let since = *self.over_major_since.get_or_insert(now);
            if now - since >= sustain {
                self.over_major_since = Some(now);
                self.over_minor_since = Some(now);
                self.major_count += 1;
                return Some(DeviationTrigger {
                    level: DeviationLevel::Major,
                    repeated: self.major_count > 1,
                });
            }
        }

        let since = *self.over_minor_since.get_or_insert(now);
        if now - since >= sustain {
            self.over_minor_since = Some(now);
            return Some(DeviationTrigger {
                level: DeviationLevel::Minor,
                repeated: false,
            });
        }

        None
    }
}

pub const LOCATION_THROTTLE_SECS: i64 = 2;

/// One location update per driver per trip every [`LOCATION_THROTTLE_SECS`].
/// Rejected pings surface as a rate-limit error at the API layer.
#[derive(Debug, Default)]
pub struct PingThrottle {
    last: HashMap<(Uuid, Uuid), DateTime<Utc>>,
}

impl PingThrottle {
    /// Records the ping and returns true, unless one from the same driver on
    /// the same trip landed inside the window.
    pub fn admit(&mut self, trip_id: Uuid, driver_id: Uuid, now: DateTime<Utc>) -> bool {
        match self.last.get(&(trip_id, driver_id)) {
            Some(last) if now - *last < Duration::seconds(LOCATION_THROTTLE_SECS) => false,
            _ => {
                self.last.insert((trip_id, driver_id), now);
                true
            }
        }
    }

    pub fn forget_trip(&mut self, trip_id: &Uuid) {
        self.last.retain(|(trip, _), _| trip != trip_id);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrackingAlertLevel {
    #[default]
    None,
    Minor,
    Major,
}

/// Tracks how long a trip has gone without a location ping. Each alert level
/// fires once per outage; a fresh ping arms the monitor again.
#[derive(Clone, Debug, Default)]
pub struct TrackingMonitor {
    level: TrackingAlertLevel,
}

impl TrackingMonitor {
    pub fn observe_gap(&mut self, gap_secs: i64) -> Option<TrackingAlertLevel> {
        if gap_secs <= TRACKING_MINOR_GAP_SECS {
            self.level = TrackingAlertLevel::None;
            return None;
        }

        if gap_secs > TRACKING_MAJOR_GAP_SECS && self.level < TrackingAlertLevel::Major {
            self.level = TrackingAlertLevel::Major;
            return Some(TrackingAlertLevel::Major);
        }

        if gap_secs > TRACKING_MINOR_GAP_SECS
            && gap_secs <= TRACKING_MAJOR_GAP_SECS
            && self.level < TrackingAlertLevel::Minor
        {
            self.level = TrackingAlertLevel::Minor;
            return Some(TrackingAlertLevel::Minor);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn sustained_major_deviation_fires_once_per_window() {
        let mut window = DeviationWindow::default();

        assert_eq!(window.observe(800.0, t(0)), None);
        assert_eq!(window.observe(820.0, t(10)), None);

        let trigger = window.observe(810.0, t(20)).unwrap();
        assert_eq!(trigger.level, DeviationLevel::Major);
        assert!(!trigger.repeated);

        // timer restarted: still off-route but inside the new window
        assert_eq!(window.observe(805.0, t(30)), None);

        let trigger = window.observe(805.0, t(40)).unwrap();
        assert_eq!(trigger.level, DeviationLevel::Major);
        assert!(trigger.repeated);
    }

    #[test]
    fn brief_spike_does_not_trigger() {
        let mut window = DeviationWindow::default();

        assert_eq!(window.observe(900.0, t(0)), None);
        assert_eq!(window.observe(100.0, t(10)), None);
        // timers cleared, the clock starts over
        assert_eq!(window.observe(900.0, t(15)), None);
        assert_eq!(window.observe(900.0, t(30)), None);
        assert!(window.observe(900.0, t(35)).is_some());
    }

    #[test]
    fn minor_band_triggers_minor_only() {
        let mut window = DeviationWindow::default();

        assert_eq!(window.observe(400.0, t(0)), None);
        let trigger = window.observe(450.0, t(25)).unwrap();
        assert_eq!(trigger.level, DeviationLevel::Minor);
    }

    #[test]
    fn dropping_to_minor_band_resets_the_major_timer() {
        let mut window = DeviationWindow::default();

        assert_eq!(window.observe(800.0, t(0)), None);
        assert_eq!(window.observe(400.0, t(10)), None);
        // the major timer restarted; the minor one (running since t=0) fires
        let trigger = window.observe(800.0, t(21)).unwrap();
        assert_eq!(trigger.level, DeviationLevel::Minor);
    }

    #[test]
    fn tracking_levels_fire_once_and_rearm_on_ping() {
        let mut monitor = TrackingMonitor::default();

        assert_eq!(monitor.observe_gap(10), None);
        assert_eq!(monitor.observe_gap(20), Some(TrackingAlertLevel::Minor));
        assert_eq!(monitor.observe_gap(30), None);
        assert_eq!(monitor.observe_gap(50), Some(TrackingAlertLevel::Major));
        assert_eq!(monitor.observe_gap(90), None);

        // ping arrived, outage over
        assert_eq!(monitor.observe_gap(5), None);
        assert_eq!(monitor.observe_gap(60), Some(TrackingAlertLevel::Major));
    }

    #[test]
    fn throttle_admits_after_the_window_elapses() {
        let mut throttle = PingThrottle::default();
        let trip = Uuid::new_v4();
        let driver = Uuid::new_v4();

        assert!(throttle.admit(trip, driver, t(0)));
        assert!(!throttle.admit(trip, driver, t(1)));
        // 2.4s after the stored ping is past the 2s window
        assert!(throttle.admit(trip, driver, t(0) + Duration::milliseconds(2400)));
    }

    #[test]
    fn throttle_is_keyed_per_trip_and_driver() {
        let mut throttle = PingThrottle::default();
        let trip = Uuid::new_v4();
        let driver = Uuid::new_v4();
        let other_driver = Uuid::new_v4();

        assert!(throttle.admit(trip, driver, t(0)));
        assert!(throttle.admit(trip, other_driver, t(0)));
        assert!(throttle.admit(Uuid::new_v4(), driver, t(0)));
        assert!(!throttle.admit(trip, driver, t(1)));
    }

    #[test]
    fn forget_trip_clears_its_entries() {
        let mut throttle = PingThrottle::default();
        let trip = Uuid::new_v4();
        let driver = Uuid::new_v4();

        assert!(throttle.admit(trip, driver, t(0)));
        throttle.forget_trip(&trip);
        assert!(throttle.admit(trip, driver, t(0)));
    }
}
