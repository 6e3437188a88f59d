use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::engine::EngineOptions;
use crate::error::AppError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://roster.db";
pub const DEFAULT_HOUR_TOLERANCE: u32 = 3;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 30;

/// Whether more than one schedule per semester may be published at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishPolicy {
    /// Publishing never looks at other schedules of the semester.
    Permissive,
    /// Publishing fails while another schedule of the semester is published.
    Exclusive,
}

impl PublishPolicy {
    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(PublishPolicy::Permissive),
            "exclusive" => Ok(PublishPolicy::Exclusive),
            other => Err(AppError::Configuration(format!(
                "Unknown publish policy '{}', expected 'permissive' or 'exclusive'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub database_url: String,
    pub publish_policy: PublishPolicy,
    pub hour_tolerance_hours: u32,
    pub generation_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            publish_policy: PublishPolicy::Permissive,
            hour_tolerance_hours: DEFAULT_HOUR_TOLERANCE,
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let database_url = dotenvy::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(defaults.database_url);

        let publish_policy = match dotenvy::var("ROSTER_PUBLISH_POLICY") {
            Ok(raw) => PublishPolicy::from_str(&raw)?,
            Err(_) => defaults.publish_policy,
        };

        let hour_tolerance_hours = match dotenvy::var("ROSTER_HOUR_TOLERANCE") {
            Ok(raw) => raw.trim().parse::<u32>().map_err(|_| {
                AppError::Configuration(format!("ROSTER_HOUR_TOLERANCE must be a whole number of hours, got '{}'", raw))
            })?,
            Err(_) => defaults.hour_tolerance_hours,
        };

        let generation_timeout = match dotenvy::var("ROSTER_GENERATION_TIMEOUT_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(AppError::Configuration(format!(
                        "ROSTER_GENERATION_TIMEOUT_SECS must be a positive number of seconds, got '{}'",
                        raw
                    )));
                }
            },
            Err(_) => defaults.generation_timeout,
        };

        let config = Self {
            database_url,
            publish_policy,
            hour_tolerance_hours,
            generation_timeout,
        };

        info!(
            publish_policy = ?config.publish_policy,
            hour_tolerance_hours = config.hour_tolerance_hours,
            generation_timeout_secs = config.generation_timeout.as_secs(),
            "Scheduler configuration loaded"
        );

        Ok(config)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            hour_tolerance_minutes: i64::from(self.hour_tolerance_hours) * 60,
        }
    }
}
