use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, NoneAsEmptyString};

use super::api::{job_view, trip_view, JobView, TripEventView, TripView};
use crate::{
    auth::CurrentDriver,
    error::AppError,
    models::{
        driver::Driver,
        event::TripEventType,
        geo::GeoPoint,
        gps::GpsRoutePoint,
        job::JobStatus,
        trip::{TripEnd, TripStart},
    },
    state::AppState,
};

/// Actions a driver takes from the mobile form.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(dashboard))
        .route("/jobs/:id/start", post(start_trip))
        .route("/trips/:id/end", post(end_trip))
        .route("/trips/:id/events", post(add_event))
        .route("/trips/:id/gps-points", post(record_gps_point))
}

#[derive(Serialize)]
struct DashboardView {
    driver: Driver,
    assigned_jobs: Vec<JobView>,
    active_trip: Option<TripView>,
}

async fn dashboard(
    State(state): State<AppState>,
    current: CurrentDriver,
) -> Result<Json<DashboardView>, AppError> {
    let me = current.require_driver()?;
    let driver = state.store.get_driver(me.id).await?;
    let mut assigned_jobs = Vec::new();
    for job in state
        .store
        .jobs_by_driver(driver.id, Some(JobStatus::Assigned))
        .await?
    {
        assigned_jobs.push(job_view(&state.store, job).await?);
    }
    let active_trip = match state.trips.current_trip(driver.id).await? {
        Some(trip) => Some(trip_view(&state.store, trip).await?),
        None => None,
    };
    Ok(Json(DashboardView {
        driver,
        assigned_jobs,
        active_trip,
    }))
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StartTripForm {
    #[serde_as(as = "NoneAsEmptyString")]
    start_odometer: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    start_fuel_level: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    start_lat: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    start_lng: Option<String>,
}

impl StartTripForm {
    fn validate(self) -> Result<TripStart, AppError> {
        Ok(TripStart {
            start_odometer: required_decimal(
                self.start_odometer,
                odometer_limit(),
                "Starting odometer reading is required.",
                "Invalid odometer reading.",
            )?,
            start_location: required_point(self.start_lat, self.start_lng)?,
            start_fuel_level: optional_decimal(
                self.start_fuel_level,
                fuel_limit(),
                "Invalid fuel level.",
            )?,
        })
    }
}

async fn start_trip(
    State(state): State<AppState>,
    current: CurrentDriver,
    Path(job_id): Path<i64>,
    Form(form): Form<StartTripForm>,
) -> Result<(StatusCode, Json<TripView>), AppError> {
    let me = current.require_driver()?;
    let start = form.validate()?;
    let trip = state.trips.start_trip(me.id, job_id, start).await?;
    Ok((StatusCode::CREATED, Json(trip_view(&state.store, trip).await?)))
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EndTripForm {
    #[serde_as(as = "NoneAsEmptyString")]
    end_odometer: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    end_fuel_level: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    end_lat: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    end_lng: Option<String>,
    notes: String,
}

impl EndTripForm {
    fn validate(self) -> Result<TripEnd, AppError> {
        Ok(TripEnd {
            end_odometer: required_decimal(
                self.end_odometer,
                odometer_limit(),
                "Ending odometer reading is required.",
                "Invalid odometer reading.",
            )?,
            end_location: required_point(self.end_lat, self.end_lng)?,
            end_fuel_level: optional_decimal(
                self.end_fuel_level,
                fuel_limit(),
                "Invalid fuel level.",
            )?,
            notes: self.notes.trim().to_string(),
        })
    }
}

async fn end_trip(
    State(state): State<AppState>,
    current: CurrentDriver,
    Path(trip_id): Path<i64>,
    Form(form): Form<EndTripForm>,
) -> Result<Json<TripView>, AppError> {
    let me = current.require_driver()?;
    let end = form.validate()?;
    let trip = state.trips.end_trip(me.id, trip_id, end).await?;
    Ok(Json(trip_view(&state.store, trip).await?))
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventForm {
    #[serde_as(as = "NoneAsEmptyString")]
    event_type: Option<String>,
    description: String,
    #[serde_as(as = "NoneAsEmptyString")]
    location_lat: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    location_lng: Option<String>,
}

async fn add_event(
    State(state): State<AppState>,
    current: CurrentDriver,
    Path(trip_id): Path<i64>,
    Form(form): Form<EventForm>,
) -> Result<(StatusCode, Json<TripEventView>), AppError> {
    let me = current.require_driver()?;
    let raw_type = form
        .event_type
        .as_deref()
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .ok_or_else(|| AppError::bad_request("Event type and description are required."))?;
    let event_type: TripEventType = raw_type
        .parse()
        .map_err(|_| AppError::bad_request("Invalid event type."))?;
    // A half-typed location is dropped rather than rejected.
    let location = parse_point(form.location_lat.as_deref(), form.location_lng.as_deref());
    let event = state
        .trips
        .add_event(me.id, trip_id, event_type, &form.description, location)
        .await?;
    Ok((StatusCode::CREATED, Json(event.into())))
}

#[derive(Debug, Deserialize)]
struct GpsPointBody {
    latitude: f64,
    longitude: f64,
    speed: Option<f64>,
}

async fn record_gps_point(
    State(state): State<AppState>,
    current: CurrentDriver,
    Path(trip_id): Path<i64>,
    Json(body): Json<GpsPointBody>,
) -> Result<(StatusCode, Json<GpsRoutePoint>), AppError> {
    let me = current.require_driver()?;
    let point = GeoPoint::new(body.latitude, body.longitude);
    let saved = state
        .trips
        .record_gps_point(me.id, trip_id, point, body.speed)
        .await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// Readings are stored with two decimals: odometers up to ten digits, fuel
/// levels up to five.
fn odometer_limit() -> Decimal {
    Decimal::new(99_999_999_99, 2)
}

fn fuel_limit() -> Decimal {
    Decimal::new(999_99, 2)
}

fn required_decimal(
    value: Option<String>,
    max: Decimal,
    missing: &str,
    invalid: &str,
) -> Result<Decimal, AppError> {
    let raw = value.ok_or_else(|| AppError::bad_request(missing))?;
    parse_reading(&raw, max).ok_or_else(|| AppError::bad_request(invalid))
}

fn optional_decimal(
    value: Option<String>,
    max: Decimal,
    invalid: &str,
) -> Result<Option<Decimal>, AppError> {
    value
        .map(|raw| parse_reading(&raw, max).ok_or_else(|| AppError::bad_request(invalid)))
        .transpose()
}

fn parse_reading(raw: &str, max: Decimal) -> Option<Decimal> {
    raw.trim()
        .parse::<Decimal>()
        .ok()
        .filter(|value| *value >= Decimal::ZERO && *value <= max)
}

fn required_point(lat: Option<String>, lng: Option<String>) -> Result<GeoPoint, AppError> {
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return Err(AppError::bad_request(
            "GPS location is required. Please enable location services.",
        ));
    };
    parse_point(Some(&lat), Some(&lng))
        .filter(GeoPoint::is_valid)
        .ok_or_else(|| AppError::bad_request("Invalid GPS coordinates. Please try again."))
}

fn parse_point(lat: Option<&str>, lng: Option<&str>) -> Option<GeoPoint> {
    let lat = lat?.trim().parse().ok()?;
    let lng = lng?.trim().parse().ok()?;
    Some(GeoPoint::new(lat, lng))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_form_requires_an_odometer() {
        let form = StartTripForm {
            start_lat: Some("-26.2".into()),
            start_lng: Some("28.0".into()),
            ..Default::default()
        };
        let err = form.validate().unwrap_err();
        assert_eq!(err.to_string(), "Starting odometer reading is required.");
    }

    #[test]
    fn start_form_requires_a_location() {
        let form = StartTripForm {
            start_odometer: Some("1000".into()),
            start_lat: Some("-26.2".into()),
            ..Default::default()
        };
        let err = form.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "GPS location is required. Please enable location services."
        );
    }

    #[test]
    fn start_form_rejects_garbage_numbers() {
        let form = StartTripForm {
            start_odometer: Some("lots".into()),
            start_lat: Some("-26.2".into()),
            start_lng: Some("28.0".into()),
            ..Default::default()
        };
        assert_eq!(
            form.validate().unwrap_err().to_string(),
            "Invalid odometer reading."
        );

        let form = StartTripForm {
            start_odometer: Some("1000".into()),
            start_lat: Some("north".into()),
            start_lng: Some("28.0".into()),
            ..Default::default()
        };
        assert_eq!(
            form.validate().unwrap_err().to_string(),
            "Invalid GPS coordinates. Please try again."
        );
    }

    #[test]
    fn end_form_keeps_optional_fuel_empty() {
        let form = EndTripForm {
            end_odometer: Some(" 45264.7 ".into()),
            end_lat: Some("-26.1".into()),
            end_lng: Some("28.05".into()),
            notes: "  gate was locked ".into(),
            ..Default::default()
        };
        let end = form.validate().unwrap();
        assert_eq!(end.end_odometer, "45264.7".parse().unwrap());
        assert_eq!(end.end_fuel_level, None);
        assert_eq!(end.notes, "gate was locked");
    }

    #[test]
    fn readings_outside_the_stored_range_are_rejected() {
        let form = StartTripForm {
            start_odometer: Some("-79228162514264337593543950335".into()),
            start_lat: Some("-26.2".into()),
            start_lng: Some("28.0".into()),
            ..Default::default()
        };
        assert_eq!(
            form.validate().unwrap_err().to_string(),
            "Invalid odometer reading."
        );

        let form = EndTripForm {
            end_odometer: Some("79228162514264337593543950335".into()),
            end_lat: Some("-26.1".into()),
            end_lng: Some("28.05".into()),
            ..Default::default()
        };
        assert_eq!(
            form.validate().unwrap_err().to_string(),
            "Invalid odometer reading."
        );

        let form = EndTripForm {
            end_odometer: Some("45264.7".into()),
            end_fuel_level: Some("-79228162514264337593543950335".into()),
            end_lat: Some("-26.1".into()),
            end_lng: Some("28.05".into()),
            ..Default::default()
        };
        assert_eq!(form.validate().unwrap_err().to_string(), "Invalid fuel level.");

        let form = StartTripForm {
            start_odometer: Some("99999999.99".into()),
            start_fuel_level: Some("1000".into()),
            start_lat: Some("-26.2".into()),
            start_lng: Some("28.0".into()),
        };
        assert_eq!(form.validate().unwrap_err().to_string(), "Invalid fuel level.");
    }

    #[test]
    fn half_a_location_is_ignored() {
        assert_eq!(parse_point(Some("1.5"), None), None);
        assert_eq!(parse_point(Some("1.5"), Some("x")), None);
        assert_eq!(
            parse_point(Some("1.5"), Some("2.5")),
            Some(GeoPoint::new(1.5, 2.5))
        );
    }
}
