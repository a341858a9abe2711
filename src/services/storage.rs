use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::{debug, info};

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        driver::{Driver, NewDriver},
        event::{TripEvent, TripEventType},
        geo::GeoPoint,
        gps::GpsRoutePoint,
        job::{Job, JobStatus, NewJob},
        trip::{Trip, TripStart, TripStatus},
        vehicle::{NewVehicle, Vehicle},
    },
    services::numbering::{self, Sequence},
};

const TRIP_SELECT: &str = r#"
    SELECT t.*, j.job_location_lat AS job_lat, j.job_location_lng AS job_lng
    FROM trips t
    JOIN jobs j ON j.id = t.job_id
"#;

/// SQLite-backed persistence for the dispatch entities.
#[derive(Clone)]
pub struct FleetStore {
    db: DbPool,
}

impl FleetStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Moves a counter past any number already present, e.g. after rows were
    /// imported with their numbers filled in.
    pub async fn reconcile_sequence(&self, sequence: Sequence) -> Result<(), AppError> {
        let query = match sequence {
            Sequence::Trip => "SELECT trip_number FROM trips",
            Sequence::Job => "SELECT job_number FROM jobs",
        };
        let numbers: Vec<String> = sqlx::query_scalar(query).fetch_all(&self.db).await?;
        let highest = numbers
            .iter()
            .filter_map(|number| numbering::parse_number(sequence, number))
            .max()
            .unwrap_or(0);
        sqlx::query("UPDATE sequences SET value = MAX(value, ?) WHERE name = ?")
            .bind(highest)
            .bind(sequence.tag())
            .execute(&self.db)
            .await?;
        debug!("sequence {} reconciled at {highest}", sequence.tag());
        Ok(())
    }

    // drivers

    pub async fn create_driver(&self, new: NewDriver) -> Result<Driver, AppError> {
        let id = sqlx::query(
            r#"INSERT INTO drivers (full_name, username, phone, license_number, is_active, created_at)
               VALUES (?, ?, ?, ?, 1, ?)"#,
        )
        .bind(&new.full_name)
        .bind(&new.username)
        .bind(&new.phone)
        .bind(&new.license_number)
        .bind(Utc::now())
        .execute(&self.db)
        .await?
        .last_insert_rowid();
        self.get_driver(id).await
    }

    pub async fn get_driver(&self, id: i64) -> Result<Driver, AppError> {
        sqlx::query_as::<_, Driver>("SELECT * FROM drivers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list_active_drivers(&self) -> Result<Vec<Driver>, AppError> {
        let drivers = sqlx::query_as::<_, Driver>(
            "SELECT * FROM drivers WHERE is_active = 1 ORDER BY full_name, id",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(drivers)
    }

    // vehicles

    pub async fn create_vehicle(&self, new: NewVehicle) -> Result<Vehicle, AppError> {
        let id = sqlx::query(
            r#"INSERT INTO vehicles (name, registration_number, vehicle_type, fuel_capacity, current_odometer, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&new.name)
        .bind(&new.registration_number)
        .bind(new.vehicle_type)
        .bind(new.fuel_capacity.to_string())
        .bind(new.current_odometer.to_string())
        .bind(Utc::now())
        .execute(&self.db)
        .await?
        .last_insert_rowid();
        self.get_vehicle(id).await
    }

    pub async fn get_vehicle(&self, id: i64) -> Result<Vehicle, AppError> {
        let row = sqlx::query("SELECT * FROM vehicles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        vehicle_from_row(&row)
    }

    pub async fn list_vehicles(&self) -> Result<Vec<Vehicle>, AppError> {
        let rows = sqlx::query("SELECT * FROM vehicles ORDER BY name, id")
            .fetch_all(&self.db)
            .await?;
        rows.iter().map(vehicle_from_row).collect()
    }

    // jobs

    pub async fn create_job(&self, new: NewJob) -> Result<Job, AppError> {
        let mut tx = self.db.begin().await?;
        let job_number = numbering::next_number(&mut *tx, Sequence::Job).await?;
        let id = sqlx::query(
            r#"INSERT INTO jobs (job_number, customer_name, customer_phone, job_location,
                   job_location_lat, job_location_lng, description, instructions,
                   expected_duration, scheduled_start, assigned_driver_id, assigned_vehicle_id,
                   status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&job_number)
        .bind(&new.customer_name)
        .bind(&new.customer_phone)
        .bind(&new.job_location)
        .bind(new.job_location_lat)
        .bind(new.job_location_lng)
        .bind(&new.description)
        .bind(&new.instructions)
        .bind(new.expected_duration)
        .bind(new.scheduled_start)
        .bind(new.assigned_driver_id)
        .bind(new.assigned_vehicle_id)
        .bind(new.status)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;
        info!("job {job_number} created");
        self.get_job(id).await
    }

    pub async fn get_job(&self, id: i64) -> Result<Job, AppError> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>, AppError> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs ORDER BY scheduled_start DESC, id DESC",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(jobs)
    }

    pub async fn jobs_by_driver(
        &self,
        driver_id: i64,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, AppError> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"SELECT * FROM jobs
               WHERE assigned_driver_id = ? AND (? IS NULL OR status = ?)
               ORDER BY scheduled_start DESC, id DESC"#,
        )
        .bind(driver_id)
        .bind(status)
        .bind(status)
        .fetch_all(&self.db)
        .await?;
        Ok(jobs)
    }

    // trips

    /// Inserts a started trip under a fresh number and moves the job to
    /// in progress, all or nothing.
    pub async fn insert_trip(
        &self,
        job: &Job,
        driver_id: i64,
        vehicle_id: i64,
        start: &TripStart,
        start_time: DateTime<Utc>,
    ) -> Result<Trip, AppError> {
        let mut tx = self.db.begin().await?;
        let trip_number = numbering::next_number(&mut *tx, Sequence::Trip).await?;
        let id = sqlx::query(
            r#"INSERT INTO trips (trip_number, job_id, driver_id, vehicle_id, start_time,
                   start_odometer, start_fuel_level, start_location_lat, start_location_lng,
                   status)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&trip_number)
        .bind(job.id)
        .bind(driver_id)
        .bind(vehicle_id)
        .bind(start_time)
        .bind(start.start_odometer.to_string())
        .bind(start.start_fuel_level.map(|fuel| fuel.to_string()))
        .bind(start.start_location.lat)
        .bind(start.start_location.lng)
        .bind(TripStatus::Started)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
            .bind(JobStatus::InProgress)
            .bind(job.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get_trip(id).await
    }

    /// Writes the end readings and derived metrics of a trip, carries the
    /// odometer over to the vehicle and closes the job. Fails with a conflict
    /// when the trip was ended by someone else in the meantime.
    pub async fn complete_trip(&self, trip: &Trip) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;
        let updated = sqlx::query(
            r#"UPDATE trips SET
                   end_time = ?, end_odometer = ?, end_fuel_level = ?,
                   end_location_lat = ?, end_location_lng = ?,
                   distance_travelled = ?, duration_minutes = ?, route_compliance = ?,
                   is_after_hours = ?, status = ?, notes = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(trip.end_time)
        .bind(trip.end_odometer.map(|odo| odo.to_string()))
        .bind(trip.end_fuel_level.map(|fuel| fuel.to_string()))
        .bind(trip.end_location_lat)
        .bind(trip.end_location_lng)
        .bind(trip.distance_travelled.map(|distance| distance.to_string()))
        .bind(trip.duration_minutes)
        .bind(trip.route_compliance)
        .bind(trip.is_after_hours)
        .bind(trip.status)
        .bind(&trip.notes)
        .bind(trip.id)
        .bind(TripStatus::Started)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            tx.rollback().await?;
            return Err(AppError::conflict(format!(
                "Trip {} is no longer active.",
                trip.trip_number
            )));
        }

        if let Some(end_odometer) = trip.end_odometer {
            sqlx::query("UPDATE vehicles SET current_odometer = ? WHERE id = ?")
                .bind(end_odometer.to_string())
                .bind(trip.vehicle_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
            .bind(JobStatus::Completed)
            .bind(trip.job_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_trip(&self, id: i64) -> Result<Trip, AppError> {
        let row = sqlx::query(&format!("{TRIP_SELECT} WHERE t.id = ?"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        trip_from_row(&row)
    }

    pub async fn list_trips(&self) -> Result<Vec<Trip>, AppError> {
        let rows = sqlx::query(&format!(
            "{TRIP_SELECT} ORDER BY t.start_time DESC, t.id DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(trip_from_row).collect()
    }

    pub async fn trips_by_driver(&self, driver_id: i64) -> Result<Vec<Trip>, AppError> {
        let rows = sqlx::query(&format!(
            "{TRIP_SELECT} WHERE t.driver_id = ? ORDER BY t.start_time DESC, t.id DESC"
        ))
        .bind(driver_id)
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(trip_from_row).collect()
    }

    pub async fn trips_with_status(&self, status: TripStatus) -> Result<Vec<Trip>, AppError> {
        let rows = sqlx::query(&format!(
            "{TRIP_SELECT} WHERE t.status = ? ORDER BY t.start_time DESC, t.id DESC"
        ))
        .bind(status)
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(trip_from_row).collect()
    }

    pub async fn active_trip_for_driver(&self, driver_id: i64) -> Result<Option<Trip>, AppError> {
        let row = sqlx::query(&format!(
            "{TRIP_SELECT} WHERE t.driver_id = ? AND t.status = ? ORDER BY t.start_time DESC, t.id DESC LIMIT 1"
        ))
        .bind(driver_id)
        .bind(TripStatus::Started)
        .fetch_optional(&self.db)
        .await?;
        row.as_ref().map(trip_from_row).transpose()
    }

    // events

    pub async fn insert_event(
        &self,
        trip_id: i64,
        event_type: TripEventType,
        description: &str,
        location: Option<GeoPoint>,
    ) -> Result<TripEvent, AppError> {
        let id = sqlx::query(
            r#"INSERT INTO trip_events (trip_id, event_type, timestamp, description, location_lat, location_lng)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(trip_id)
        .bind(event_type)
        .bind(Utc::now())
        .bind(description)
        .bind(location.map(|point| point.lat))
        .bind(location.map(|point| point.lng))
        .execute(&self.db)
        .await?
        .last_insert_rowid();
        self.get_event(id).await
    }

    pub async fn get_event(&self, id: i64) -> Result<TripEvent, AppError> {
        sqlx::query_as::<_, TripEvent>("SELECT * FROM trip_events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list_events(&self) -> Result<Vec<TripEvent>, AppError> {
        let events =
            sqlx::query_as::<_, TripEvent>("SELECT * FROM trip_events ORDER BY timestamp, id")
                .fetch_all(&self.db)
                .await?;
        Ok(events)
    }

    pub async fn events_for_trip(&self, trip_id: i64) -> Result<Vec<TripEvent>, AppError> {
        let events = sqlx::query_as::<_, TripEvent>(
            "SELECT * FROM trip_events WHERE trip_id = ? ORDER BY timestamp, id",
        )
        .bind(trip_id)
        .fetch_all(&self.db)
        .await?;
        Ok(events)
    }

    // gps trace

    pub async fn insert_gps_point(
        &self,
        trip_id: i64,
        point: GeoPoint,
        speed: Option<f64>,
    ) -> Result<GpsRoutePoint, AppError> {
        let id = sqlx::query(
            r#"INSERT INTO gps_route_points (trip_id, latitude, longitude, timestamp, speed)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(trip_id)
        .bind(point.lat)
        .bind(point.lng)
        .bind(Utc::now())
        .bind(speed)
        .execute(&self.db)
        .await?
        .last_insert_rowid();
        self.get_gps_point(id).await
    }

    pub async fn get_gps_point(&self, id: i64) -> Result<GpsRoutePoint, AppError> {
        sqlx::query_as::<_, GpsRoutePoint>("SELECT * FROM gps_route_points WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    pub async fn list_gps_points(&self) -> Result<Vec<GpsRoutePoint>, AppError> {
        let points = sqlx::query_as::<_, GpsRoutePoint>(
            "SELECT * FROM gps_route_points ORDER BY timestamp, id",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(points)
    }

    pub async fn gps_points_for_trip(&self, trip_id: i64) -> Result<Vec<GpsRoutePoint>, AppError> {
        let points = sqlx::query_as::<_, GpsRoutePoint>(
            "SELECT * FROM gps_route_points WHERE trip_id = ? ORDER BY timestamp, id",
        )
        .bind(trip_id)
        .fetch_all(&self.db)
        .await?;
        Ok(points)
    }
}

fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, AppError> {
    raw.parse()
        .map_err(|err| AppError::Other(anyhow::anyhow!("bad decimal in {column}: {err}")))
}

fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal, AppError> {
    let raw: String = row.try_get(column)?;
    parse_decimal(column, &raw)
}

fn optional_decimal(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, AppError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| parse_decimal(column, &raw)).transpose()
}

fn vehicle_from_row(row: &SqliteRow) -> Result<Vehicle, AppError> {
    Ok(Vehicle {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        registration_number: row.try_get("registration_number")?,
        vehicle_type: row.try_get("vehicle_type")?,
        fuel_capacity: decimal(row, "fuel_capacity")?,
        current_odometer: decimal(row, "current_odometer")?,
        created_at: row.try_get("created_at")?,
    })
}

fn trip_from_row(row: &SqliteRow) -> Result<Trip, AppError> {
    Ok(Trip {
        id: row.try_get("id")?,
        trip_number: row.try_get("trip_number")?,
        job_id: row.try_get("job_id")?,
        driver_id: row.try_get("driver_id")?,
        vehicle_id: row.try_get("vehicle_id")?,
        start_time: row.try_get("start_time")?,
        start_odometer: decimal(row, "start_odometer")?,
        start_fuel_level: optional_decimal(row, "start_fuel_level")?,
        start_location_lat: row.try_get("start_location_lat")?,
        start_location_lng: row.try_get("start_location_lng")?,
        end_time: row.try_get("end_time")?,
        end_odometer: optional_decimal(row, "end_odometer")?,
        end_fuel_level: optional_decimal(row, "end_fuel_level")?,
        end_location_lat: row.try_get("end_location_lat")?,
        end_location_lng: row.try_get("end_location_lng")?,
        job_target: GeoPoint::from_parts(row.try_get("job_lat")?, row.try_get("job_lng")?),
        distance_travelled: optional_decimal(row, "distance_travelled")?,
        duration_minutes: row.try_get("duration_minutes")?,
        route_compliance: row.try_get("route_compliance")?,
        is_after_hours: row.try_get("is_after_hours")?,
        status: row.try_get("status")?,
        notes: row.try_get("notes")?,
    })
}
