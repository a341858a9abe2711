use std::{env, net::SocketAddr, str::FromStr};

use chrono::{FixedOffset, Offset, Utc};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub working_hours: WorkingHours,
}

/// Weekday window that counts as regular working time. Trips starting outside
/// of it, or on a weekend, are flagged as after hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHours {
    pub start_hour: u32,
    pub end_hour: u32,
    pub utc_offset: FixedOffset,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            start_hour: 6,
            end_hour: 18,
            utc_offset: Utc.fix(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://fleet.db".to_string());
        let listen_addr: SocketAddr = parse_var("APP_LISTEN_ADDR", "127.0.0.1:3000")?;

        let defaults = WorkingHours::default();
        let start_hour: u32 = parse_var("WORKDAY_START_HOUR", &defaults.start_hour.to_string())?;
        let end_hour: u32 = parse_var("WORKDAY_END_HOUR", &defaults.end_hour.to_string())?;
        if start_hour >= end_hour || end_hour > 24 {
            return Err(AppError::Config(format!(
                "invalid working hours {start_hour}..{end_hour}"
            )));
        }

        let offset_minutes: i32 = parse_var("FLEET_UTC_OFFSET_MINUTES", "0")?;
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            AppError::Config(format!(
                "invalid FLEET_UTC_OFFSET_MINUTES: {offset_minutes}"
            ))
        })?;

        Ok(Self {
            database_url,
            listen_addr,
            working_hours: WorkingHours {
                start_hour,
                end_hour,
                utc_offset,
            },
        })
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|err| AppError::Config(format!("invalid {name}: {err}")))
}
