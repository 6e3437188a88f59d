#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use crate::config::{PublishPolicy, SchedulerConfig};
    use crate::db::{
        NewSchedule, get_schedule_assignments, get_schedule_warnings, insert_generated_schedule,
    };
    use crate::engine::{CoverageWarning, GenerationOutcome, ProposedAssignment};
    use crate::error::AppError;
    use crate::lifecycle::{
        create_schedule, create_schedule_with, delete_schedule, get_schedule, list_schedules,
        publish_schedule, schedule_assignments, worker_schedule,
    };
    use crate::models::ScheduleStatus;
    use crate::test::utils::test_db::{SEMESTER, TestDbBuilder, create_standard_test_db};
    use rocket::tokio;

    #[rocket::async_test]
    async fn create_persists_draft_with_assignments() {
        let test_db = create_standard_test_db().await;
        let admin = test_db.worker_id("admin");

        let generated = create_schedule(
            &test_db.pool,
            &SchedulerConfig::default(),
            SEMESTER,
            Some(admin),
            Some("first pass".to_string()),
        )
        .await
        .unwrap();

        let schedule = &generated.schedule;
        assert_eq!(schedule.status, ScheduleStatus::Draft);
        assert_eq!(schedule.semester, SEMESTER);
        assert!(schedule.published_at.is_none());
        assert_eq!(schedule.generated_by, Some(admin));
        assert_eq!(schedule.notes.as_deref(), Some("first pass"));

        let stored = get_schedule_assignments(&test_db.pool, schedule.id)
            .await
            .unwrap();
        assert_eq!(stored, generated.assignments);
        assert_eq!(stored.len(), 3);

        let monday = test_db.shift_id("mon_morning");
        let mut monday_workers: Vec<i64> = stored
            .iter()
            .filter(|a| a.shift_id == monday)
            .map(|a| a.worker_id)
            .collect();
        monday_workers.sort();
        assert_eq!(
            monday_workers,
            vec![test_db.worker_id("ana"), test_db.worker_id("ben")]
        );
        assert!(generated.warnings.is_empty());
    }

    #[rocket::async_test]
    async fn create_records_coverage_warnings() {
        let test_db = TestDbBuilder::new()
            .worker("solo", None)
            .shift("busy", 4, "10:00", "14:00", 3)
            .available("solo", "busy", Some(1))
            .build()
            .await
            .unwrap();

        let generated = create_schedule(
            &test_db.pool,
            &SchedulerConfig::default(),
            SEMESTER,
            None,
            None,
        )
        .await
        .unwrap();

        assert_eq!(generated.assignments.len(), 1);
        let stored = get_schedule_warnings(&test_db.pool, generated.schedule.id)
            .await
            .unwrap();
        assert_eq!(stored, generated.warnings);
        assert_eq!(stored[0].message, "Friday 10:00-14:00: 1/3 staffed");
    }

    #[rocket::async_test]
    async fn create_without_shifts_writes_nothing() {
        let test_db = TestDbBuilder::new()
            .worker("idle", None)
            .build()
            .await
            .unwrap();

        let err = create_schedule(
            &test_db.pool,
            &SchedulerConfig::default(),
            SEMESTER,
            None,
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::InsufficientData(_)));
        assert_eq!(test_db.count("schedules").await, 0);
        assert_eq!(test_db.count("schedule_assignments").await, 0);
    }

    #[rocket::async_test]
    async fn create_rejects_blank_semester() {
        let test_db = create_standard_test_db().await;
        let err = create_schedule(&test_db.pool, &SchedulerConfig::default(), "  ", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[rocket::async_test]
    async fn publish_is_one_way() {
        let test_db = create_standard_test_db().await;
        let config = SchedulerConfig::default();
        let generated = create_schedule(&test_db.pool, &config, SEMESTER, None, None)
            .await
            .unwrap();
        let id = generated.schedule.id;

        let published = publish_schedule(&test_db.pool, config.publish_policy, id)
            .await
            .unwrap();
        assert_eq!(published.status, ScheduleStatus::Published);
        let first_published_at = published.published_at.unwrap();

        let err = publish_schedule(&test_db.pool, config.publish_policy, id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let reloaded = get_schedule(&test_db.pool, id).await.unwrap();
        assert_eq!(reloaded.status, ScheduleStatus::Published);
        assert_eq!(reloaded.published_at, Some(first_published_at));
    }

    #[rocket::async_test]
    async fn concurrent_publish_has_exactly_one_winner() {
        let test_db = create_standard_test_db().await;
        let config = SchedulerConfig::default();
        let id = create_schedule(&test_db.pool, &config, SEMESTER, None, None)
            .await
            .unwrap()
            .schedule
            .id;

        let (first, second) = tokio::join!(
            publish_schedule(&test_db.pool, PublishPolicy::Permissive, id),
            publish_schedule(&test_db.pool, PublishPolicy::Permissive, id)
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|r| matches!(r, Err(AppError::InvalidState(_))))
        );
    }

    #[rocket::async_test]
    async fn publish_unknown_schedule_is_not_found() {
        let test_db = create_standard_test_db().await;
        let err = publish_schedule(&test_db.pool, PublishPolicy::Permissive, 999)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[rocket::async_test]
    async fn permissive_policy_allows_two_published_schedules() {
        let test_db = create_standard_test_db().await;
        let config = SchedulerConfig::default();

        let first = create_schedule(&test_db.pool, &config, SEMESTER, None, None)
            .await
            .unwrap();
        let second = create_schedule(&test_db.pool, &config, SEMESTER, None, None)
            .await
            .unwrap();

        publish_schedule(&test_db.pool, PublishPolicy::Permissive, first.schedule.id)
            .await
            .unwrap();
        publish_schedule(&test_db.pool, PublishPolicy::Permissive, second.schedule.id)
            .await
            .unwrap();

        let published: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM schedules WHERE semester = ? AND status = 'published'",
        )
        .bind(SEMESTER)
        .fetch_one(&test_db.pool)
        .await
        .unwrap();
        assert_eq!(published, 2);
    }

    #[rocket::async_test]
    async fn exclusive_policy_blocks_second_publish() {
        let test_db = create_standard_test_db().await;
        let config = SchedulerConfig {
            publish_policy: PublishPolicy::Exclusive,
            ..SchedulerConfig::default()
        };

        let first = create_schedule(&test_db.pool, &config, SEMESTER, None, None)
            .await
            .unwrap();
        let second = create_schedule(&test_db.pool, &config, SEMESTER, None, None)
            .await
            .unwrap();

        publish_schedule(&test_db.pool, config.publish_policy, first.schedule.id)
            .await
            .unwrap();
        let err = publish_schedule(&test_db.pool, config.publish_policy, second.schedule.id)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidState(msg) if msg.contains(SEMESTER)));
        let untouched = get_schedule(&test_db.pool, second.schedule.id)
            .await
            .unwrap();
        assert_eq!(untouched.status, ScheduleStatus::Draft);
    }

    #[rocket::async_test]
    async fn delete_removes_schedule_and_assignments() {
        let test_db = create_standard_test_db().await;
        let id = create_schedule(&test_db.pool, &SchedulerConfig::default(), SEMESTER, None, None)
            .await
            .unwrap()
            .schedule
            .id;

        delete_schedule(&test_db.pool, id).await.unwrap();

        assert!(matches!(
            get_schedule(&test_db.pool, id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(
            get_schedule_assignments(&test_db.pool, id)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(matches!(
            schedule_assignments(&test_db.pool, id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(test_db.count("schedule_conflicts").await, 0);

        assert!(matches!(
            delete_schedule(&test_db.pool, id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn list_returns_newest_first() {
        let test_db = create_standard_test_db().await;
        let config = SchedulerConfig::default();

        let older = create_schedule(&test_db.pool, &config, SEMESTER, None, None)
            .await
            .unwrap();
        let newer = create_schedule(&test_db.pool, &config, SEMESTER, None, None)
            .await
            .unwrap();

        let listed = list_schedules(&test_db.pool, Some(SEMESTER)).await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![newer.schedule.id, older.schedule.id]);

        assert!(
            list_schedules(&test_db.pool, Some("spring-2030"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[rocket::async_test]
    async fn worker_sees_only_published_assignments() {
        let test_db = create_standard_test_db().await;
        let config = SchedulerConfig::default();
        let ana = test_db.worker_id("ana");

        let id = create_schedule(&test_db.pool, &config, SEMESTER, None, None)
            .await
            .unwrap()
            .schedule
            .id;

        assert!(
            worker_schedule(&test_db.pool, ana, SEMESTER)
                .await
                .unwrap()
                .is_empty()
        );

        publish_schedule(&test_db.pool, config.publish_policy, id)
            .await
            .unwrap();

        let visible = worker_schedule(&test_db.pool, ana, SEMESTER).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].schedule_id, id);
        assert_eq!(visible[0].shift.id, test_db.shift_id("mon_morning"));
        assert_eq!(visible[0].assignment_score.map(|r| r.get()), Some(1));
    }

    #[rocket::async_test]
    async fn generation_timeout_writes_nothing() {
        let test_db = create_standard_test_db().await;
        let config = SchedulerConfig {
            generation_timeout: Duration::from_millis(10),
            ..SchedulerConfig::default()
        };

        let err = create_schedule_with(&test_db.pool, &config, SEMESTER, None, None, |_, _, _| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(GenerationOutcome::default())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Timeout(_)));
        assert_eq!(test_db.count("schedules").await, 0);
    }

    #[rocket::async_test]
    async fn engine_failure_inside_worker_is_returned() {
        let test_db = create_standard_test_db().await;

        let err = create_schedule_with(
            &test_db.pool,
            &SchedulerConfig::default(),
            SEMESTER,
            None,
            None,
            |semester, _, _| Err(AppError::InsufficientData(format!("nothing for {}", semester))),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::InsufficientData(msg) if msg.contains(SEMESTER)));
        assert_eq!(test_db.count("schedules").await, 0);
    }

    fn new_schedule() -> NewSchedule {
        NewSchedule {
            semester: SEMESTER.to_string(),
            created_at: Utc::now(),
            generated_by: None,
            algorithm_version: "hand-built".to_string(),
            notes: None,
        }
    }

    fn proposed(worker_id: i64, shift_id: i64) -> ProposedAssignment {
        ProposedAssignment {
            worker_id,
            shift_id,
            score: None,
        }
    }

    #[rocket::async_test]
    async fn overlapping_assignments_abort_the_whole_write() {
        let test_db = TestDbBuilder::new()
            .worker("ana", None)
            .shift("morning", 0, "09:00", "13:00", 1)
            .shift("midday", 0, "12:00", "16:00", 1)
            .build()
            .await
            .unwrap();
        let ana = test_db.worker_id("ana");
        let outcome = GenerationOutcome {
            assignments: vec![
                proposed(ana, test_db.shift_id("morning")),
                proposed(ana, test_db.shift_id("midday")),
            ],
            ..GenerationOutcome::default()
        };

        let err = insert_generated_schedule(&test_db.pool, &new_schedule(), &outcome)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ConstraintViolation(msg) if msg.contains("overlapping")));
        assert_eq!(test_db.count("schedules").await, 0);
        assert_eq!(test_db.count("schedule_assignments").await, 0);
    }

    #[rocket::async_test]
    async fn over_staffed_shift_aborts_the_whole_write() {
        let test_db = TestDbBuilder::new()
            .worker("ana", None)
            .worker("ben", None)
            .shift("solo", 2, "09:00", "11:00", 1)
            .shift("later", 3, "09:00", "11:00", 1)
            .build()
            .await
            .unwrap();
        let solo = test_db.shift_id("solo");
        let outcome = GenerationOutcome {
            assignments: vec![
                proposed(test_db.worker_id("ana"), test_db.shift_id("later")),
                proposed(test_db.worker_id("ana"), solo),
                proposed(test_db.worker_id("ben"), solo),
            ],
            warnings: vec![CoverageWarning {
                shift_id: solo,
                assigned: 0,
                required: 1,
                message: "never stored".to_string(),
            }],
            ..GenerationOutcome::default()
        };

        let err = insert_generated_schedule(&test_db.pool, &new_schedule(), &outcome)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ConstraintViolation(msg) if msg.contains("over-staffed")));
        assert_eq!(test_db.count("schedules").await, 0);
        assert_eq!(test_db.count("schedule_assignments").await, 0);
        assert_eq!(test_db.count("schedule_conflicts").await, 0);
    }

    #[rocket::async_test]
    async fn duplicate_assignment_aborts_the_whole_write() {
        let test_db = TestDbBuilder::new()
            .worker("ana", None)
            .shift("pair", 4, "09:00", "11:00", 2)
            .build()
            .await
            .unwrap();
        let pair = test_db.shift_id("pair");
        let ana = test_db.worker_id("ana");
        let outcome = GenerationOutcome {
            assignments: vec![proposed(ana, pair), proposed(ana, pair)],
            ..GenerationOutcome::default()
        };

        let err = insert_generated_schedule(&test_db.pool, &new_schedule(), &outcome)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ConstraintViolation(_)));
        assert_eq!(test_db.count("schedules").await, 0);
        assert_eq!(test_db.count("schedule_assignments").await, 0);
    }

    #[rocket::async_test]
    async fn admin_availability_is_ignored() {
        let test_db = TestDbBuilder::new()
            .admin("boss")
            .worker("w", None)
            .shift("pair", 0, "09:00", "13:00", 2)
            .available("boss", "pair", Some(1))
            .available("w", "pair", Some(2))
            .build()
            .await
            .unwrap();

        let generated = create_schedule(
            &test_db.pool,
            &SchedulerConfig::default(),
            SEMESTER,
            None,
            None,
        )
        .await
        .unwrap();

        let assigned: Vec<i64> = generated.assignments.iter().map(|a| a.worker_id).collect();
        assert_eq!(assigned, vec![test_db.worker_id("w")]);
        assert_eq!(generated.warnings.len(), 1);
    }

    #[rocket::async_test]
    async fn corrupt_warning_counts_are_reported() {
        let test_db = create_standard_test_db().await;
        let id = create_schedule(&test_db.pool, &SchedulerConfig::default(), SEMESTER, None, None)
            .await
            .unwrap()
            .schedule
            .id;

        sqlx::query(
            "INSERT INTO schedule_conflicts
             (schedule_id, conflict_type, severity, shift_id, assigned, required, description)
             VALUES (?, 'understaffed', 'warning', ?, -1, 2, 'bad row')",
        )
        .bind(id)
        .bind(test_db.shift_id("mon_morning"))
        .execute(&test_db.pool)
        .await
        .unwrap();

        assert!(matches!(
            get_schedule_warnings(&test_db.pool, id).await,
            Err(AppError::Internal(_))
        ));
    }

    #[rocket::async_test]
    async fn assignments_cannot_be_edited() {
        let test_db = create_standard_test_db().await;
        let id = create_schedule(&test_db.pool, &SchedulerConfig::default(), SEMESTER, None, None)
            .await
            .unwrap()
            .schedule
            .id;

        let result = sqlx::query(
            "UPDATE schedule_assignments SET assignment_score = 2 WHERE schedule_id = ?",
        )
        .bind(id)
        .execute(&test_db.pool)
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("constraint violation"));
    }
}
