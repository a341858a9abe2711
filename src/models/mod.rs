pub mod driver;
pub mod event;
pub mod geo;
pub mod gps;
pub mod job;
pub mod trip;
pub mod vehicle;
