use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, NoneAsEmptyString};

use crate::{
    error::AppError,
    models::{
        driver::Driver,
        event::TripEvent,
        gps::GpsRoutePoint,
        job::Job,
        trip::{Trip, TripStatus},
        vehicle::Vehicle,
    },
    services::storage::FleetStore,
    state::AppState,
};

/// Read-only endpoints consumed by the reporting dashboard.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/drivers", get(drivers_list))
        .route("/drivers/:id", get(driver_detail))
        .route("/vehicles", get(vehicles_list))
        .route("/vehicles/:id", get(vehicle_detail))
        .route("/jobs", get(jobs_list))
        .route("/jobs/by_driver", get(jobs_by_driver))
        .route("/jobs/:id", get(job_detail))
        .route("/trips", get(trips_list))
        .route("/trips/active", get(trips_active))
        .route("/trips/by_driver", get(trips_by_driver))
        .route("/trips/:id", get(trip_detail))
        .route("/trips/:id/gps_route", get(trip_gps_route))
        .route("/trip-events", get(events_list))
        .route("/trip-events/by_trip", get(events_by_trip))
        .route("/trip-events/:id", get(event_detail))
        .route("/gps-points", get(gps_points_list))
        .route("/gps-points/:id", get(gps_point_detail))
}

#[derive(Debug, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub driver_name: Option<String>,
    pub vehicle_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TripEventView {
    #[serde(flatten)]
    pub event: TripEvent,
    pub event_type_display: &'static str,
}

impl From<TripEvent> for TripEventView {
    fn from(event: TripEvent) -> Self {
        let event_type_display = event.event_type.label();
        Self {
            event,
            event_type_display,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TripView {
    #[serde(flatten)]
    pub trip: Trip,
    pub job_details: JobView,
    pub driver_name: String,
    pub vehicle_name: String,
    pub fuel_consumed: Option<Decimal>,
    pub fuel_efficiency: Option<f64>,
    pub events: Vec<TripEventView>,
}

pub async fn job_view(store: &FleetStore, job: Job) -> Result<JobView, AppError> {
    let driver_name = match job.assigned_driver_id {
        Some(id) => Some(store.get_driver(id).await?.to_string()),
        None => None,
    };
    let vehicle_name = match job.assigned_vehicle_id {
        Some(id) => Some(store.get_vehicle(id).await?.to_string()),
        None => None,
    };
    Ok(JobView {
        job,
        driver_name,
        vehicle_name,
    })
}

pub async fn trip_view(store: &FleetStore, trip: Trip) -> Result<TripView, AppError> {
    let job = store.get_job(trip.job_id).await?;
    let job_details = job_view(store, job).await?;
    let driver_name = store.get_driver(trip.driver_id).await?.to_string();
    let vehicle_name = store.get_vehicle(trip.vehicle_id).await?.to_string();
    let events = store
        .events_for_trip(trip.id)
        .await?
        .into_iter()
        .map(TripEventView::from)
        .collect();
    Ok(TripView {
        fuel_consumed: trip.fuel_consumed(),
        fuel_efficiency: trip.fuel_efficiency(),
        trip,
        job_details,
        driver_name,
        vehicle_name,
        events,
    })
}

async fn trip_views(store: &FleetStore, trips: Vec<Trip>) -> Result<Vec<TripView>, AppError> {
    let mut views = Vec::with_capacity(trips.len());
    for trip in trips {
        views.push(trip_view(store, trip).await?);
    }
    Ok(views)
}

async fn job_views(store: &FleetStore, jobs: Vec<Job>) -> Result<Vec<JobView>, AppError> {
    let mut views = Vec::with_capacity(jobs.len());
    for job in jobs {
        views.push(job_view(store, job).await?);
    }
    Ok(views)
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DriverFilter {
    #[serde_as(as = "NoneAsEmptyString")]
    driver_id: Option<i64>,
}

impl DriverFilter {
    fn required(&self) -> Result<i64, AppError> {
        self.driver_id
            .ok_or_else(|| AppError::bad_request("driver_id parameter required"))
    }
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TripFilter {
    #[serde_as(as = "NoneAsEmptyString")]
    trip_id: Option<i64>,
}

async fn drivers_list(State(state): State<AppState>) -> Result<Json<Vec<Driver>>, AppError> {
    Ok(Json(state.store.list_active_drivers().await?))
}

async fn driver_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Driver>, AppError> {
    let driver = state.store.get_driver(id).await?;
    if !driver.is_active {
        return Err(AppError::NotFound);
    }
    Ok(Json(driver))
}

async fn vehicles_list(State(state): State<AppState>) -> Result<Json<Vec<Vehicle>>, AppError> {
    Ok(Json(state.store.list_vehicles().await?))
}

async fn vehicle_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vehicle>, AppError> {
    Ok(Json(state.store.get_vehicle(id).await?))
}

async fn jobs_list(State(state): State<AppState>) -> Result<Json<Vec<JobView>>, AppError> {
    let jobs = state.store.list_jobs().await?;
    Ok(Json(job_views(&state.store, jobs).await?))
}

async fn jobs_by_driver(
    State(state): State<AppState>,
    Query(filter): Query<DriverFilter>,
) -> Result<Json<Vec<JobView>>, AppError> {
    let driver_id = filter.required()?;
    let jobs = state.store.jobs_by_driver(driver_id, None).await?;
    Ok(Json(job_views(&state.store, jobs).await?))
}

async fn job_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<JobView>, AppError> {
    let job = state.store.get_job(id).await?;
    Ok(Json(job_view(&state.store, job).await?))
}

async fn trips_list(State(state): State<AppState>) -> Result<Json<Vec<TripView>>, AppError> {
    let trips = state.store.list_trips().await?;
    Ok(Json(trip_views(&state.store, trips).await?))
}

async fn trips_active(State(state): State<AppState>) -> Result<Json<Vec<TripView>>, AppError> {
    let trips = state.store.trips_with_status(TripStatus::Started).await?;
    Ok(Json(trip_views(&state.store, trips).await?))
}

async fn trips_by_driver(
    State(state): State<AppState>,
    Query(filter): Query<DriverFilter>,
) -> Result<Json<Vec<TripView>>, AppError> {
    let driver_id = filter.required()?;
    let trips = state.store.trips_by_driver(driver_id).await?;
    Ok(Json(trip_views(&state.store, trips).await?))
}

async fn trip_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TripView>, AppError> {
    let trip = state.store.get_trip(id).await?;
    Ok(Json(trip_view(&state.store, trip).await?))
}

async fn trip_gps_route(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<GpsRoutePoint>>, AppError> {
    let trip = state.store.get_trip(id).await?;
    Ok(Json(state.store.gps_points_for_trip(trip.id).await?))
}

async fn events_list(State(state): State<AppState>) -> Result<Json<Vec<TripEventView>>, AppError> {
    let events = state.store.list_events().await?;
    Ok(Json(events.into_iter().map(TripEventView::from).collect()))
}

async fn events_by_trip(
    State(state): State<AppState>,
    Query(filter): Query<TripFilter>,
) -> Result<Json<Vec<TripEventView>>, AppError> {
    let trip_id = filter
        .trip_id
        .ok_or_else(|| AppError::bad_request("trip_id parameter required"))?;
    let events = state.store.events_for_trip(trip_id).await?;
    Ok(Json(events.into_iter().map(TripEventView::from).collect()))
}

async fn event_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TripEventView>, AppError> {
    Ok(Json(state.store.get_event(id).await?.into()))
}

async fn gps_points_list(
    State(state): State<AppState>,
) -> Result<Json<Vec<GpsRoutePoint>>, AppError> {
    Ok(Json(state.store.list_gps_points().await?))
}

async fn gps_point_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<GpsRoutePoint>, AppError> {
    Ok(Json(state.store.get_gps_point(id).await?))
}
