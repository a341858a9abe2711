use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Driver {
    pub id: i64,
    pub full_name: String,
    pub username: String,
    pub phone: String,
    pub license_number: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.full_name, self.license_number)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDriver {
    pub full_name: String,
    pub username: String,
    pub phone: String,
    pub license_number: String,
}
