#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod config;
mod database;
mod db;
mod engine;
mod env;
mod error;
mod lifecycle;
mod models;
mod reporting;
mod submission;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use api::{
    api_activate_shift, api_availability_summary, api_create_shift, api_create_worker,
    api_deactivate_shift, api_delete_schedule, api_generate_schedule, api_get_availability,
    api_get_schedule, api_get_shift, api_get_worker, api_get_worker_availability,
    api_list_schedules, api_list_shifts, api_list_workers, api_my_schedule,
    api_publish_schedule, api_schedule_assignments, api_schedule_report, api_schedule_warnings,
    api_submit_availability, api_update_shift, api_update_worker, bad_request_api, forbidden_api,
    internal_error_api, not_found_api, unauthorized_api, unprocessable_api, health,
};
use config::SchedulerConfig;
use rocket::{Build, Rocket};
use telemetry::{TelemetryFairing, init_tracing};

use sqlx::SqlitePool;
use tracing::info;

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    env::load_environment()?;
    let _telemetry = init_tracing()?;

    let config = SchedulerConfig::from_env()?;

    let pool = database::connect(&config.database_url).await?;
    database::apply_schema(&pool).await?;

    init_rocket(pool, config)
        .await
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("Rocket failed: {}", e))?;

    Ok(())
}

pub async fn init_rocket(pool: SqlitePool, config: SchedulerConfig) -> Rocket<Build> {
    info!("Starting shift roster");

    rocket::build()
        .manage(pool)
        .manage(config)
        .mount(
            "/api",
            routes![
                api_create_worker,
                api_list_workers,
                api_get_worker,
                api_update_worker,
                api_create_shift,
                api_list_shifts,
                api_get_shift,
                api_update_shift,
                api_activate_shift,
                api_deactivate_shift,
                api_submit_availability,
                api_get_availability,
                api_get_worker_availability,
                api_availability_summary,
                api_generate_schedule,
                api_list_schedules,
                api_get_schedule,
                api_schedule_assignments,
                api_schedule_warnings,
                api_publish_schedule,
                api_delete_schedule,
                api_schedule_report,
                api_my_schedule,
            ],
        )
        .register(
            "/api",
            catchers![
                bad_request_api,
                unauthorized_api,
                forbidden_api,
                not_found_api,
                unprocessable_api,
                internal_error_api,
            ],
        )
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
}
