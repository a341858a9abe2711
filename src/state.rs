use crate::{
    config::AppConfig,
    db::DbPool,
    services::{metrics::TripMetricsCalculator, storage::FleetStore, trips::TripService},
};

#[derive(Clone)]
pub struct AppState {
    pub store: FleetStore,
    pub trips: TripService,
}

impl AppState {
    pub fn new(config: &AppConfig, db: DbPool) -> Self {
        let store = FleetStore::new(db);
        let calculator = TripMetricsCalculator::new(config.working_hours);
        let trips = TripService::new(store.clone(), calculator);
        Self { store, trips }
    }
}
