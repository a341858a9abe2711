use chrono::Utc;
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::{
        event::{TripEvent, TripEventType},
        geo::GeoPoint,
        gps::GpsRoutePoint,
        job::Job,
        trip::{Trip, TripEnd, TripStart, TripStatus},
    },
    services::{metrics::TripMetricsCalculator, storage::FleetStore},
};

/// Driver-facing trip lifecycle: start, log along the way, end.
#[derive(Clone)]
pub struct TripService {
    store: FleetStore,
    calculator: TripMetricsCalculator,
}

impl TripService {
    pub fn new(store: FleetStore, calculator: TripMetricsCalculator) -> Self {
        Self { store, calculator }
    }

    pub async fn start_trip(
        &self,
        driver_id: i64,
        job_id: i64,
        start: TripStart,
    ) -> Result<Trip, AppError> {
        let job = self.assigned_job(driver_id, job_id).await?;
        if job.status.is_closed() {
            return Err(AppError::conflict(format!(
                "Job {} is already {}.",
                job.job_number, job.status
            )));
        }
        let vehicle_id = job
            .assigned_vehicle_id
            .ok_or_else(|| AppError::bad_request("No vehicle is assigned to this job."))?;
        if !start.start_location.is_valid() {
            return Err(AppError::bad_request(
                "Invalid GPS coordinates. Please try again.",
            ));
        }

        let trip = self
            .store
            .insert_trip(&job, driver_id, vehicle_id, &start, Utc::now())
            .await?;
        info!(
            "trip {} started by driver {driver_id} for job {}",
            trip.trip_number, job.job_number
        );
        Ok(trip)
    }

    pub async fn end_trip(
        &self,
        driver_id: i64,
        trip_id: i64,
        end: TripEnd,
    ) -> Result<Trip, AppError> {
        let mut trip = self.active_trip(driver_id, trip_id).await?;
        if end.end_odometer < trip.start_odometer {
            return Err(AppError::bad_request(
                "Ending odometer cannot be less than starting odometer.",
            ));
        }
        if !end.end_location.is_valid() {
            return Err(AppError::bad_request(
                "Invalid GPS coordinates. Please try again.",
            ));
        }

        trip.end_odometer = Some(end.end_odometer);
        trip.end_fuel_level = end.end_fuel_level;
        trip.end_location_lat = Some(end.end_location.lat);
        trip.end_location_lng = Some(end.end_location.lng);
        trip.notes = end.notes;
        trip.end_time = Some(Utc::now());
        trip.status = TripStatus::Completed;

        let trip = self.calculator.calculate(trip);
        self.store.complete_trip(&trip).await?;
        if trip.is_after_hours {
            warn!("trip {} was driven after hours", trip.trip_number);
        }
        info!(
            "trip {} completed: distance {:?}, {:?} min",
            trip.trip_number, trip.distance_travelled, trip.duration_minutes
        );
        Ok(trip)
    }

    pub async fn add_event(
        &self,
        driver_id: i64,
        trip_id: i64,
        event_type: TripEventType,
        description: &str,
        location: Option<GeoPoint>,
    ) -> Result<TripEvent, AppError> {
        let trip = self.active_trip(driver_id, trip_id).await?;
        let description = description.trim();
        if description.is_empty() {
            return Err(AppError::bad_request(
                "Event type and description are required.",
            ));
        }
        if !event_type.is_driver_loggable() {
            return Err(AppError::bad_request("Invalid event type."));
        }
        let location = location.filter(GeoPoint::is_valid);
        let event = self
            .store
            .insert_event(trip.id, event_type, description, location)
            .await?;
        info!("{} event added to {}", event_type.label(), trip.trip_number);
        Ok(event)
    }

    pub async fn record_gps_point(
        &self,
        driver_id: i64,
        trip_id: i64,
        point: GeoPoint,
        speed: Option<f64>,
    ) -> Result<GpsRoutePoint, AppError> {
        let trip = self.active_trip(driver_id, trip_id).await?;
        if !point.is_valid() {
            return Err(AppError::bad_request(
                "Invalid GPS coordinates. Please try again.",
            ));
        }
        if speed.is_some_and(|speed| !speed.is_finite() || speed < 0.0) {
            return Err(AppError::bad_request("Invalid speed."));
        }
        self.store.insert_gps_point(trip.id, point, speed).await
    }

    /// The driver's trip that is still under way, if any.
    pub async fn current_trip(&self, driver_id: i64) -> Result<Option<Trip>, AppError> {
        self.store.active_trip_for_driver(driver_id).await
    }

    async fn assigned_job(&self, driver_id: i64, job_id: i64) -> Result<Job, AppError> {
        let job = self.store.get_job(job_id).await?;
        if job.assigned_driver_id != Some(driver_id) {
            return Err(AppError::NotFound);
        }
        Ok(job)
    }

    async fn active_trip(&self, driver_id: i64, trip_id: i64) -> Result<Trip, AppError> {
        let trip = self.store.get_trip(trip_id).await?;
        if trip.driver_id != driver_id {
            return Err(AppError::NotFound);
        }
        if !trip.is_active() {
            return Err(AppError::conflict(format!(
                "Trip {} is no longer active.",
                trip.trip_number
            )));
        }
        Ok(trip)
    }
}
