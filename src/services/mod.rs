pub mod metrics;
pub mod numbering;
pub mod storage;
pub mod trips;
