use std::{collections::HashSet, fmt, net::SocketAddr};

use anyhow::Context;
use chrono::{Duration, Utc};
use cucumber::{given, then, when, World as _};
use fleet::{
    config::{AppConfig, WorkingHours},
    db::{init_pool, run_migrations},
    error::AppError,
    models::{
        driver::{Driver, NewDriver},
        geo::GeoPoint,
        job::{Job, JobStatus, NewJob},
        trip::{Trip, TripEnd, TripStart, TripStatus},
        vehicle::{NewVehicle, Vehicle, VehicleType},
    },
    state::AppState,
};
use rust_decimal::Decimal;
use tempfile::TempDir;

#[derive(Debug, cucumber::World, Default)]
struct FleetWorld {
    state: Option<TestState>,
    driver: Option<Driver>,
    vehicle: Option<Vehicle>,
    job: Option<Job>,
    trip: Option<Trip>,
    started: Vec<Trip>,
    last_error: Option<String>,
}

impl FleetWorld {
    fn app_state(&self) -> &AppState {
        self.state
            .as_ref()
            .expect("state must be initialised first")
            .app()
    }

    fn driver_id(&self) -> i64 {
        self.driver.as_ref().expect("driver must exist").id
    }

    fn job_id(&self) -> i64 {
        self.job.as_ref().expect("job must exist").id
    }

    fn trip_id(&self) -> i64 {
        self.trip.as_ref().expect("a trip must have been started").id
    }

    async fn reload_trip(&self) -> Trip {
        self.app_state()
            .store
            .get_trip(self.trip_id())
            .await
            .expect("load trip")
    }

    fn record<T>(&mut self, result: Result<T, AppError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Some(value)
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                None
            }
        }
    }
}

struct TestState {
    app: AppState,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let db_path = root.path().join("bdd.sqlite");
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url: database_url.clone(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            working_hours: WorkingHours::default(),
        };

        let db = init_pool(&config.database_url).await?;
        run_migrations(&db).await?;

        let app = AppState::new(&config, db);
        Ok(Self { app, _root: root })
    }

    fn app(&self) -> &AppState {
        &self.app
    }
}

fn dec(value: &str) -> Decimal {
    value.parse().expect("decimal literal")
}

fn trip_start(odometer: &str, fuel: Option<&str>, lat: f64, lng: f64) -> TripStart {
    TripStart {
        start_odometer: dec(odometer),
        start_fuel_level: fuel.map(dec),
        start_location: GeoPoint::new(lat, lng),
    }
}

fn trip_end(odometer: &str, fuel: Option<&str>, lat: f64, lng: f64) -> TripEnd {
    TripEnd {
        end_odometer: dec(odometer),
        end_fuel_level: fuel.map(dec),
        end_location: GeoPoint::new(lat, lng),
        notes: String::new(),
    }
}

#[given("a fresh fleet")]
async fn given_fresh_fleet(world: &mut FleetWorld) {
    world.state = Some(TestState::new().await.expect("state"));
}

#[given(regex = r#"^a driver "([^"]+)" with licence "([^"]+)"$"#)]
async fn given_driver(world: &mut FleetWorld, name: String, licence: String) {
    let driver = world
        .app_state()
        .store
        .create_driver(NewDriver {
            username: name.to_lowercase().replace(' ', "."),
            full_name: name,
            phone: "+27 82 555 0101".into(),
            license_number: licence,
        })
        .await
        .expect("create driver");
    world.driver = Some(driver);
}

#[given(regex = r#"^a vehicle "([^"]+)" registered "([^"]+)" with odometer "([^"]+)"$"#)]
async fn given_vehicle(world: &mut FleetWorld, name: String, registration: String, odo: String) {
    let vehicle = world
        .app_state()
        .store
        .create_vehicle(NewVehicle {
            name,
            registration_number: registration,
            vehicle_type: VehicleType::Bakkie,
            fuel_capacity: dec("80"),
            current_odometer: dec(&odo),
        })
        .await
        .expect("create vehicle");
    world.vehicle = Some(vehicle);
}

async fn create_job(
    world: &mut FleetWorld,
    customer: String,
    target: Option<GeoPoint>,
    with_vehicle: bool,
) {
    let vehicle_id = if with_vehicle {
        world.vehicle.as_ref().map(|vehicle| vehicle.id)
    } else {
        None
    };
    let job = world
        .app_state()
        .store
        .create_job(NewJob {
            customer_name: customer,
            customer_phone: "+27 11 555 0199".into(),
            job_location: "12 Main Road".into(),
            job_location_lat: target.map(|point| point.lat),
            job_location_lng: target.map(|point| point.lng),
            description: "Burst geyser".into(),
            instructions: String::new(),
            expected_duration: 90,
            scheduled_start: Utc::now() + Duration::hours(1),
            assigned_driver_id: Some(world.driver_id()),
            assigned_vehicle_id: vehicle_id,
            status: JobStatus::Assigned,
        })
        .await
        .expect("create job");
    world.job = Some(job);
}

#[given(regex = r#"^an assigned job for "([^"]+)" at (-?\d+(?:\.\d+)?), (-?\d+(?:\.\d+)?)$"#)]
async fn given_job(world: &mut FleetWorld, customer: String, lat: f64, lng: f64) {
    create_job(world, customer, Some(GeoPoint::new(lat, lng)), true).await;
}

#[given(regex = r#"^an assigned job without a vehicle for "([^"]+)"$"#)]
async fn given_job_without_vehicle(world: &mut FleetWorld, customer: String) {
    create_job(world, customer, None, false).await;
}

async fn start_with(world: &mut FleetWorld, start: TripStart) {
    let result = world
        .app_state()
        .trips
        .start_trip(world.driver_id(), world.job_id(), start)
        .await;
    if let Some(trip) = world.record(result) {
        world.trip = Some(trip);
    }
}

#[when(
    regex = r#"^the driver starts the trip with odometer "([^"]+)" at (-?\d+(?:\.\d+)?), (-?\d+(?:\.\d+)?)$"#
)]
async fn when_start(world: &mut FleetWorld, odo: String, lat: f64, lng: f64) {
    start_with(world, trip_start(&odo, None, lat, lng)).await;
}

#[when(
    regex = r#"^the driver starts the trip with odometer "([^"]+)" and fuel "([^"]+)" at (-?\d+(?:\.\d+)?), (-?\d+(?:\.\d+)?)$"#
)]
async fn when_start_with_fuel(
    world: &mut FleetWorld,
    odo: String,
    fuel: String,
    lat: f64,
    lng: f64,
) {
    start_with(world, trip_start(&odo, Some(&fuel), lat, lng)).await;
}

async fn end_with(world: &mut FleetWorld, end: TripEnd) {
    let result = world
        .app_state()
        .trips
        .end_trip(world.driver_id(), world.trip_id(), end)
        .await;
    world.record(result);
}

#[when(
    regex = r#"^the driver ends the trip with odometer "([^"]+)" at (-?\d+(?:\.\d+)?), (-?\d+(?:\.\d+)?)$"#
)]
async fn when_end(world: &mut FleetWorld, odo: String, lat: f64, lng: f64) {
    end_with(world, trip_end(&odo, None, lat, lng)).await;
}

#[when(
    regex = r#"^the driver ends the trip with odometer "([^"]+)" and fuel "([^"]+)" at (-?\d+(?:\.\d+)?), (-?\d+(?:\.\d+)?)$"#
)]
async fn when_end_with_fuel(
    world: &mut FleetWorld,
    odo: String,
    fuel: String,
    lat: f64,
    lng: f64,
) {
    end_with(world, trip_end(&odo, Some(&fuel), lat, lng)).await;
}

#[when(regex = r#"^the driver logs a "([^"]+)" event "([^"]*)"$"#)]
async fn when_log_event(world: &mut FleetWorld, kind: String, description: String) {
    let event_type = kind.parse().expect("known event type");
    let result = world
        .app_state()
        .trips
        .add_event(world.driver_id(), world.trip_id(), event_type, &description, None)
        .await;
    world.record(result);
}

#[when(regex = r"^the driver records GPS points at (.+)$")]
async fn when_record_points(world: &mut FleetWorld, points: String) {
    for pair in points.split(" and ") {
        let (lat, lng) = pair.split_once(',').expect("lat, lng pair");
        let point = GeoPoint::new(
            lat.trim().parse().expect("latitude"),
            lng.trim().parse().expect("longitude"),
        );
        world
            .app_state()
            .trips
            .record_gps_point(world.driver_id(), world.trip_id(), point, Some(42.0))
            .await
            .expect("record gps point");
    }
}

#[when(regex = r"^the driver starts (\d+) trips one after another$")]
async fn when_start_sequentially(world: &mut FleetWorld, count: usize) {
    for _ in 0..count {
        let trip = world
            .app_state()
            .trips
            .start_trip(
                world.driver_id(),
                world.job_id(),
                trip_start("45230.5", None, -26.2041, 28.0473),
            )
            .await
            .expect("start trip");
        world.started.push(trip);
    }
}

#[when(regex = r"^the driver starts (\d+) trips at the same time$")]
async fn when_start_concurrently(world: &mut FleetWorld, count: usize) {
    let driver_id = world.driver_id();
    let job_id = world.job_id();
    let handles: Vec<_> = (0..count)
        .map(|_| {
            let trips = world.app_state().trips.clone();
            tokio::spawn(async move {
                trips
                    .start_trip(driver_id, job_id, trip_start("45230.5", None, -26.2041, 28.0473))
                    .await
            })
        })
        .collect();
    for handle in handles {
        let trip = handle.await.expect("join").expect("start trip");
        world.started.push(trip);
    }
}

#[then(regex = r#"^the trip number is "([^"]+)"$"#)]
async fn then_trip_number(world: &mut FleetWorld, expected: String) {
    assert_eq!(world.reload_trip().await.trip_number, expected);
}

#[then(regex = r#"^the trip is "([^"]+)"$"#)]
async fn then_trip_status(world: &mut FleetWorld, expected: String) {
    assert_eq!(world.reload_trip().await.status.as_str(), expected);
}

#[then(regex = r#"^the job is "([^"]+)"$"#)]
async fn then_job_status(world: &mut FleetWorld, expected: String) {
    let job = world
        .app_state()
        .store
        .get_job(world.job_id())
        .await
        .expect("load job");
    assert_eq!(job.status.as_str(), expected);
}

#[then(regex = r#"^the distance travelled is "([^"]+)"$"#)]
async fn then_distance(world: &mut FleetWorld, expected: String) {
    let trip = world.reload_trip().await;
    assert_eq!(trip.status, TripStatus::Completed);
    assert_eq!(trip.distance_travelled, Some(dec(&expected)));
    assert!(trip.duration_minutes.is_some());
}

#[then(regex = r"^the route compliance is (\d+(?:\.\d+)?)$")]
async fn then_compliance(world: &mut FleetWorld, expected: f64) {
    let compliance = world.reload_trip().await.route_compliance.expect("compliance");
    assert!((compliance - expected).abs() < 0.01, "got {compliance}");
}

#[then(regex = r#"^the vehicle odometer is "([^"]+)"$"#)]
async fn then_vehicle_odometer(world: &mut FleetWorld, expected: String) {
    let vehicle_id = world.vehicle.as_ref().expect("vehicle").id;
    let vehicle = world
        .app_state()
        .store
        .get_vehicle(vehicle_id)
        .await
        .expect("load vehicle");
    assert_eq!(vehicle.current_odometer, dec(&expected));
}

#[then(regex = r#"^the fuel consumed is "([^"]+)"$"#)]
async fn then_fuel_consumed(world: &mut FleetWorld, expected: String) {
    assert_eq!(world.reload_trip().await.fuel_consumed(), Some(dec(&expected)));
}

#[then(regex = r"^the fuel efficiency is (\d+(?:\.\d+)?)$")]
async fn then_fuel_efficiency(world: &mut FleetWorld, expected: f64) {
    let efficiency = world.reload_trip().await.fuel_efficiency().expect("efficiency");
    assert!((efficiency - expected).abs() < 1e-9, "got {efficiency}");
}

#[then(regex = r#"^the request fails with "([^"]+)"$"#)]
async fn then_request_fails(world: &mut FleetWorld, expected: String) {
    assert_eq!(world.last_error.as_deref(), Some(expected.as_str()));
}

#[then(regex = r#"^the trip has events "([^"]*)"$"#)]
async fn then_trip_events(world: &mut FleetWorld, expected: String) {
    let events = world
        .app_state()
        .store
        .events_for_trip(world.trip_id())
        .await
        .expect("load events");
    let kinds: Vec<&str> = events.iter().map(|event| event.event_type.as_str()).collect();
    assert_eq!(kinds.join(", "), expected);
}

#[then(regex = r"^the trip has (\d+) GPS points ending at (-?\d+(?:\.\d+)?), (-?\d+(?:\.\d+)?)$")]
async fn then_gps_points(world: &mut FleetWorld, count: usize, lat: f64, lng: f64) {
    let points = world
        .app_state()
        .store
        .gps_points_for_trip(world.trip_id())
        .await
        .expect("load points");
    assert_eq!(points.len(), count);
    let last = points.last().expect("at least one point");
    assert_eq!((last.latitude, last.longitude), (lat, lng));
}

#[then(regex = r"^the trip numbers are TRIP-(\d+) to TRIP-(\d+)$")]
async fn then_numbers_in_sequence(world: &mut FleetWorld, first: u32, last: u32) {
    let numbers: Vec<String> = world.started.iter().map(|trip| trip.trip_number.clone()).collect();
    let expected: Vec<String> = (first..=last).map(|n| format!("TRIP-{n:05}")).collect();
    assert_eq!(numbers, expected);
}

#[then(regex = r"^all (\d+) trip numbers are distinct$")]
async fn then_numbers_distinct(world: &mut FleetWorld, count: usize) {
    let numbers: HashSet<&str> = world
        .started
        .iter()
        .map(|trip| trip.trip_number.as_str())
        .collect();
    assert_eq!(world.started.len(), count);
    assert_eq!(numbers.len(), count);
}

#[tokio::main]
async fn main() {
    FleetWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
