#[cfg(test)]
pub mod test_db {
    use crate::auth::{CALLER_HEADER, Role};
    use crate::config::SchedulerConfig;
    use crate::database::apply_schema;
    use crate::db::{
        AvailabilityEntry, NewShift, create_shift, create_worker, replace_availability,
        set_worker_active,
    };
    use crate::error::AppError;
    use crate::models::{PreferenceRank, ShiftId, ShiftType, WorkerId};
    use chrono::NaiveTime;
    use rocket::http::Header;
    use rocket::local::asynchronous::Client;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::{Pool, Sqlite};
    use std::collections::{BTreeMap, HashMap};
    use std::str::FromStr;
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub const SEMESTER: &str = "fall-2025";

    #[derive(Default)]
    pub struct TestDbBuilder {
        workers: Vec<TestWorker>,
        shifts: Vec<TestShift>,
        availability: Vec<TestAvailability>,
    }

    pub struct TestWorker {
        pub name: String,
        pub role: Role,
        pub desired_weekly_hours: Option<u32>,
        pub active: bool,
    }

    pub struct TestShift {
        pub name: String,
        pub day_of_week: u8,
        pub start: String,
        pub end: String,
        pub required_workers: u32,
    }

    pub struct TestAvailability {
        pub worker: String,
        pub shift: String,
        pub semester: String,
        pub is_available: bool,
        pub rank: Option<u8>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn admin(mut self, name: &str) -> Self {
            self.workers.push(TestWorker {
                name: name.to_string(),
                role: Role::Admin,
                desired_weekly_hours: None,
                active: true,
            });
            self
        }

        pub fn worker(mut self, name: &str, desired_weekly_hours: Option<u32>) -> Self {
            self.workers.push(TestWorker {
                name: name.to_string(),
                role: Role::Worker,
                desired_weekly_hours,
                active: true,
            });
            self
        }

        pub fn inactive_worker(mut self, name: &str) -> Self {
            self.workers.push(TestWorker {
                name: name.to_string(),
                role: Role::Worker,
                desired_weekly_hours: None,
                active: false,
            });
            self
        }

        /// `start` and `end` are `HH:MM`.
        pub fn shift(mut self, name: &str, day_of_week: u8, start: &str, end: &str, required: u32) -> Self {
            self.shifts.push(TestShift {
                name: name.to_string(),
                day_of_week,
                start: start.to_string(),
                end: end.to_string(),
                required_workers: required,
            });
            self
        }

        pub fn available(mut self, worker: &str, shift: &str, rank: Option<u8>) -> Self {
            self.availability.push(TestAvailability {
                worker: worker.to_string(),
                shift: shift.to_string(),
                semester: SEMESTER.to_string(),
                is_available: true,
                rank,
            });
            self
        }

        pub fn unavailable(mut self, worker: &str, shift: &str) -> Self {
            self.availability.push(TestAvailability {
                worker: worker.to_string(),
                shift: shift.to_string(),
                semester: SEMESTER.to_string(),
                is_available: false,
                rank: None,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            let pool = memory_pool().await?;

            let mut worker_ids: HashMap<String, WorkerId> = HashMap::new();
            let mut shift_ids: HashMap<String, ShiftId> = HashMap::new();

            for worker in &self.workers {
                let id =
                    create_worker(&pool, &worker.name, worker.role, worker.desired_weekly_hours)
                        .await?;
                if !worker.active {
                    set_worker_active(&pool, id, false).await?;
                }
                worker_ids.insert(worker.name.clone(), id);
            }

            for shift in &self.shifts {
                let id = create_shift(
                    &pool,
                    &NewShift {
                        day_of_week: shift.day_of_week,
                        start_time: parse_time(&shift.start)?,
                        end_time: parse_time(&shift.end)?,
                        shift_type: if shift.day_of_week >= 5 {
                            ShiftType::Weekend
                        } else {
                            ShiftType::Weekday
                        },
                        required_workers: shift.required_workers,
                    },
                )
                .await?;
                shift_ids.insert(shift.name.clone(), id);
            }

            let mut submissions: BTreeMap<(WorkerId, String), Vec<AvailabilityEntry>> =
                BTreeMap::new();
            for entry in &self.availability {
                let worker_id = worker_ids[&entry.worker];
                let shift_id = shift_ids[&entry.shift];
                submissions
                    .entry((worker_id, entry.semester.clone()))
                    .or_default()
                    .push(AvailabilityEntry {
                        shift_id,
                        is_available: entry.is_available,
                        preference_rank: entry.rank.map(PreferenceRank::new).transpose()?,
                    });
            }
            for ((worker_id, semester), entries) in &submissions {
                replace_availability(&pool, *worker_id, semester, entries).await?;
            }

            Ok(TestDb {
                pool,
                worker_ids,
                shift_ids,
            })
        }
    }

    fn parse_time(raw: &str) -> Result<NaiveTime, AppError> {
        NaiveTime::parse_from_str(raw, "%H:%M")
            .map_err(|e| AppError::Validation(format!("Bad test time '{}': {}", raw, e)))
    }

    /// Single-connection in-memory pool; every connection to `sqlite::memory:` would
    /// otherwise see its own empty database.
    pub async fn memory_pool() -> Result<Pool<Sqlite>, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder()
                .is_test(true)
                .parse_filters("debug")
                .try_init();
        });

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        apply_schema(&pool).await?;
        Ok(pool)
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub worker_ids: HashMap<String, WorkerId>,
        pub shift_ids: HashMap<String, ShiftId>,
    }

    impl TestDb {
        pub fn worker_id(&self, name: &str) -> WorkerId {
            self.worker_ids[name]
        }

        pub fn shift_id(&self, name: &str) -> ShiftId {
            self.shift_ids[name]
        }

        pub async fn count(&self, table: &str) -> i64 {
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .unwrap()
        }
    }

    /// Two shifts, an admin and three workers with ranked availability.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin("admin")
            .worker("ana", Some(10))
            .worker("ben", Some(10))
            .worker("cho", None)
            .shift("mon_morning", 0, "09:00", "13:00", 2)
            .shift("tue_evening", 1, "17:00", "21:00", 1)
            .available("ana", "mon_morning", Some(1))
            .available("ben", "mon_morning", Some(3))
            .available("cho", "mon_morning", Some(5))
            .available("cho", "tue_evening", Some(2))
            .unavailable("ana", "tue_evening")
            .build()
            .await
            .unwrap()
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        setup_test_client_with(test_db, SchedulerConfig::default()).await
    }

    pub async fn setup_test_client_with(
        test_db: TestDb,
        config: SchedulerConfig,
    ) -> (Client, TestDb) {
        let rocket = crate::init_rocket(test_db.pool.clone(), config).await;
        let client = Client::tracked(rocket)
            .await
            .expect("valid rocket instance");
        (client, test_db)
    }

    pub fn as_caller(id: WorkerId) -> Header<'static> {
        Header::new(CALLER_HEADER, id.to_string())
    }
}
