use chrono::{DateTime, Utc};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::geo::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TripStatus {
    #[default]
    Started,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Started => "started",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: i64,
    pub trip_number: String,
    pub job_id: i64,
    pub driver_id: i64,
    pub vehicle_id: i64,

    pub start_time: DateTime<Utc>,
    pub start_odometer: Decimal,
    pub start_fuel_level: Option<Decimal>,
    pub start_location_lat: Option<f64>,
    pub start_location_lng: Option<f64>,

    pub end_time: Option<DateTime<Utc>>,
    pub end_odometer: Option<Decimal>,
    pub end_fuel_level: Option<Decimal>,
    pub end_location_lat: Option<f64>,
    pub end_location_lng: Option<f64>,

    /// Where the job is, copied from the job when the trip is loaded.
    #[serde(skip)]
    pub job_target: Option<GeoPoint>,

    pub distance_travelled: Option<Decimal>,
    pub duration_minutes: Option<i64>,
    pub route_compliance: Option<f64>,
    pub is_after_hours: bool,

    pub status: TripStatus,
    pub notes: String,
}

impl Trip {
    pub fn start_point(&self) -> Option<GeoPoint> {
        GeoPoint::from_parts(self.start_location_lat, self.start_location_lng)
    }

    pub fn end_point(&self) -> Option<GeoPoint> {
        GeoPoint::from_parts(self.end_location_lat, self.end_location_lng)
    }

    pub fn is_active(&self) -> bool {
        self.status == TripStatus::Started
    }

    pub fn fuel_consumed(&self) -> Option<Decimal> {
        match (self.start_fuel_level, self.end_fuel_level) {
            (Some(start), Some(end)) => start.checked_sub(end),
            _ => None,
        }
    }

    /// Distance per unit of fuel. Only defined when fuel was actually used.
    pub fn fuel_efficiency(&self) -> Option<f64> {
        let consumed = self.fuel_consumed().filter(|fuel| *fuel > Decimal::ZERO)?;
        let distance = self.distance_travelled?;
        distance.checked_div(consumed)?.to_f64()
    }
}

impl fmt::Display for Trip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.trip_number, self.status)
    }
}

/// Readings captured when the driver sets off.
#[derive(Debug, Clone)]
pub struct TripStart {
    pub start_odometer: Decimal,
    pub start_fuel_level: Option<Decimal>,
    pub start_location: GeoPoint,
}

/// Readings captured when the driver arrives back.
#[derive(Debug, Clone)]
pub struct TripEnd {
    pub end_odometer: Decimal,
    pub end_fuel_level: Option<Decimal>,
    pub end_location: GeoPoint,
    pub notes: String,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn started_trip() -> Trip {
        Trip {
            id: 1,
            trip_number: "TRIP-00001".into(),
            job_id: 1,
            driver_id: 1,
            vehicle_id: 1,
            start_time: Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
            start_odometer: "45230.5".parse().unwrap(),
            start_fuel_level: None,
            start_location_lat: None,
            start_location_lng: None,
            end_time: None,
            end_odometer: None,
            end_fuel_level: None,
            end_location_lat: None,
            end_location_lng: None,
            job_target: None,
            distance_travelled: None,
            duration_minutes: None,
            route_compliance: None,
            is_after_hours: false,
            status: TripStatus::Started,
            notes: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::started_trip;
    use super::*;

    fn dec(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn fuel_consumed_needs_both_readings() {
        let mut trip = started_trip();
        trip.start_fuel_level = Some(dec("60"));
        assert_eq!(trip.fuel_consumed(), None);

        trip.end_fuel_level = Some(dec("45.5"));
        assert_eq!(trip.fuel_consumed(), Some(dec("14.5")));
    }

    #[test]
    fn fuel_efficiency_divides_distance_by_fuel() {
        let mut trip = started_trip();
        trip.start_fuel_level = Some(dec("50"));
        trip.end_fuel_level = Some(dec("46"));
        trip.distance_travelled = Some(dec("34.2"));
        let efficiency = trip.fuel_efficiency().unwrap();
        assert!((efficiency - 8.55).abs() < 1e-9);
    }

    #[test]
    fn fuel_efficiency_is_absent_without_consumption() {
        let mut trip = started_trip();
        trip.distance_travelled = Some(dec("34.2"));
        trip.start_fuel_level = Some(dec("40"));
        trip.end_fuel_level = Some(dec("40"));
        assert_eq!(trip.fuel_efficiency(), None);

        // refuelled on the way
        trip.end_fuel_level = Some(dec("55"));
        assert_eq!(trip.fuel_efficiency(), None);
    }

    #[test]
    fn overflowing_fuel_readings_give_no_consumption() {
        let mut trip = started_trip();
        trip.distance_travelled = Some(dec("34.2"));
        trip.start_fuel_level = Some(Decimal::MAX);
        trip.end_fuel_level = Some(Decimal::MIN);
        assert_eq!(trip.fuel_consumed(), None);
        assert_eq!(trip.fuel_efficiency(), None);
    }

    #[test]
    fn fuel_efficiency_is_absent_without_distance() {
        let mut trip = started_trip();
        trip.start_fuel_level = Some(dec("50"));
        trip.end_fuel_level = Some(dec("40"));
        assert_eq!(trip.fuel_efficiency(), None);
    }
}
