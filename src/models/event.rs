use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TripEventType {
    Departure,
    Arrival,
    Delay,
    FuelStop,
    Incident,
    Photo,
    Completed,
    Other,
}

impl TripEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripEventType::Departure => "departure",
            TripEventType::Arrival => "arrival",
            TripEventType::Delay => "delay",
            TripEventType::FuelStop => "fuel_stop",
            TripEventType::Incident => "incident",
            TripEventType::Photo => "photo",
            TripEventType::Completed => "completed",
            TripEventType::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TripEventType::Departure => "Departure",
            TripEventType::Arrival => "Arrival at Job Site",
            TripEventType::Delay => "Delay",
            TripEventType::FuelStop => "Fuel Stop",
            TripEventType::Incident => "Incident",
            TripEventType::Photo => "Photo",
            TripEventType::Completed => "Job Completed",
            TripEventType::Other => "Other",
        }
    }

    /// Departures are implied by the trip start and cannot be logged by hand.
    pub fn is_driver_loggable(&self) -> bool {
        !matches!(self, TripEventType::Departure)
    }
}

impl fmt::Display for TripEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TripEventType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let kind = match value {
            "departure" => TripEventType::Departure,
            "arrival" => TripEventType::Arrival,
            "delay" => TripEventType::Delay,
            "fuel_stop" => TripEventType::FuelStop,
            "incident" => TripEventType::Incident,
            "photo" => TripEventType::Photo,
            "completed" => TripEventType::Completed,
            "other" => TripEventType::Other,
            other => return Err(format!("unknown event type `{other}`")),
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TripEvent {
    pub id: i64,
    pub trip_id: i64,
    pub event_type: TripEventType,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
}
