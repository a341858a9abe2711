use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Assigned => "assigned",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled jobs cannot be driven again.
    pub fn is_closed(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: i64,
    pub job_number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub job_location: String,
    pub job_location_lat: Option<f64>,
    pub job_location_lng: Option<f64>,
    pub description: String,
    pub instructions: String,
    /// Minutes.
    pub expected_duration: i64,
    pub scheduled_start: DateTime<Utc>,
    pub assigned_driver_id: Option<i64>,
    pub assigned_vehicle_id: Option<i64>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.job_number, self.customer_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub customer_name: String,
    pub customer_phone: String,
    pub job_location: String,
    pub job_location_lat: Option<f64>,
    pub job_location_lng: Option<f64>,
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    pub expected_duration: i64,
    pub scheduled_start: DateTime<Utc>,
    pub assigned_driver_id: Option<i64>,
    pub assigned_vehicle_id: Option<i64>,
    pub status: JobStatus,
}
