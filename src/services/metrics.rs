use chrono::{Datelike, Timelike, Weekday};
use tracing::debug;

use crate::{
    config::WorkingHours,
    models::{geo::GeoPoint, trip::Trip},
};

const FULL_COMPLIANCE: f64 = 100.0;

/// Derives distance, duration, route compliance and the after-hours flag of a
/// finished trip from its raw readings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TripMetricsCalculator {
    hours: WorkingHours,
}

impl TripMetricsCalculator {
    pub fn new(hours: WorkingHours) -> Self {
        Self { hours }
    }

    /// Fills in the derived fields. A trip without an end time is returned
    /// untouched; re-running on the same readings gives the same result.
    pub fn calculate(&self, mut trip: Trip) -> Trip {
        let Some(end_time) = trip.end_time else {
            return trip;
        };

        let elapsed = end_time - trip.start_time;
        trip.duration_minutes = Some(elapsed.num_seconds().div_euclid(60));

        if let Some(end_odometer) = trip.end_odometer {
            trip.distance_travelled = end_odometer.checked_sub(trip.start_odometer);
        }

        if let (Some(start), Some(end)) = (trip.start_point(), trip.end_point()) {
            if let Some(compliance) = route_compliance(start, end, trip.job_target) {
                trip.route_compliance = Some(compliance);
            }
        }

        trip.is_after_hours = self.is_after_hours(&trip);

        debug!(
            trip = %trip.trip_number,
            duration = ?trip.duration_minutes,
            distance = ?trip.distance_travelled,
            compliance = ?trip.route_compliance,
            after_hours = trip.is_after_hours,
            "trip metrics calculated"
        );
        trip
    }

    pub fn is_after_hours(&self, trip: &Trip) -> bool {
        let local = trip.start_time.with_timezone(&self.hours.utc_offset);
        let weekend = matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
        weekend || local.hour() < self.hours.start_hour || local.hour() >= self.hours.end_hour
    }
}

/// Straight-line distance to the job compared against the straight-line
/// distance actually covered, as a percentage capped at 100.
pub fn route_compliance(start: GeoPoint, end: GeoPoint, target: Option<GeoPoint>) -> Option<f64> {
    let gps_distance = start.distance_km(&end);
    if gps_distance == 0.0 {
        return Some(FULL_COMPLIANCE);
    }
    let target = target?;
    let expected_distance = start.distance_km(&target);
    let ratio = expected_distance / gps_distance * 100.0;
    Some(round_percent(ratio.min(FULL_COMPLIANCE)))
}

fn round_percent(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
