use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum VehicleType {
    Bakkie,
    Van,
    Truck,
    Sedan,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Bakkie => "bakkie",
            VehicleType::Van => "van",
            VehicleType::Truck => "truck",
            VehicleType::Sedan => "sedan",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub name: String,
    pub registration_number: String,
    pub vehicle_type: VehicleType,
    pub fuel_capacity: Decimal,
    pub current_odometer: Decimal,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.registration_number)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVehicle {
    pub name: String,
    pub registration_number: String,
    pub vehicle_type: VehicleType,
    pub fuel_capacity: Decimal,
    pub current_odometer: Decimal,
}
