use std::sync::Arc;

use cadence_core::clock::{Clock, FixedClock};
use cadence_core::config::EngineConfig;
use cadence_core::coordinator::Coordinator;
use cadence_core::db::establish_connection;
use cadence_core::models::{
    ItemField, ItemStatus, JobErrorType, NewItemData, NewTemplateData, RecurrencePattern,
    TemplateField, UpdateItemData, UpdateTemplateData,
};
use cadence_core::query::ListItemsParams;
use cadence_core::services::{ItemService, TemplateService};
use cadence_core::storage::sqlite::SqliteStorage;
use cadence_core::storage::Storage;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;
use uuid::Uuid;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

async fn setup() -> (Arc<dyn Storage>, Arc<FixedClock>, TempDir) {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let db_path = temp_dir.path().join("test.db");
    let pool = establish_connection(&db_path.to_string_lossy())
        .await
        .expect("establish connection");
    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(pool));
    let clock = Arc::new(FixedClock::new(t0()));
    (storage, clock, temp_dir)
}

fn daily_template(list_id: Uuid) -> NewTemplateData {
    NewTemplateData {
        list_id,
        title: "Water the plants".to_string(),
        tags: None,
        priority: None,
        estimated_duration_minutes: None,
        due_offset_minutes: None,
        recurrence_pattern: RecurrencePattern::Daily,
        recurrence_config: serde_json::json!({ "interval": 1 }),
        sync_horizon_days: 14,
        generation_horizon_days: 365,
    }
}

/// Scenario A: create a daily template and expect 14 synced
/// items, a `generated_through` marker at the end of the sync window, and a
/// pending remainder job covering the rest of the generation horizon.
#[tokio::test]
async fn scenario_a_create_materializes_sync_horizon_and_enqueues_remainder() {
    let (storage, clock, _dir) = setup().await;
    let service = TemplateService::new(Arc::clone(&storage), clock.clone(), EngineConfig::default());
    let list_id = Uuid::now_v7();

    let template = service.create(daily_template(list_id)).await.expect("create");
    assert_eq!(template.generated_through, t0() + Duration::days(14));

    let (items, total) = storage
        .list_items(&ListItemsParams { list_id, status: None, offset: 0, limit: 100 })
        .await
        .expect("list items");
    assert_eq!(total, 14);
    assert_eq!(items.len(), 14);

    assert!(storage
        .has_active_job_for_template(template.id)
        .await
        .expect("active job check"));
}

/// Scenario B: deleting a recurring item instance archives it, records a
/// `deleted` exception, and a re-run of generation over the same window
/// produces no item at that occurrence.
#[tokio::test]
async fn scenario_b_delete_recurring_instance_leaves_deleted_exception() {
    let (storage, clock, _dir) = setup().await;
    let template_service = TemplateService::new(Arc::clone(&storage), clock.clone(), EngineConfig::default());
    let item_service = ItemService::new(Arc::clone(&storage), clock.clone(), EngineConfig::default());
    let list_id = Uuid::now_v7();

    let template = template_service.create(daily_template(list_id)).await.expect("create");
    let target = t0() + Duration::days(3);
    let (items, _) = storage
        .list_items(&ListItemsParams { list_id, status: None, offset: 0, limit: 100 })
        .await
        .expect("list items");
    let victim = items.iter().find(|i| i.occurs_at == Some(target)).expect("item at T0+3d");

    item_service.delete(list_id, victim.id).await.expect("delete");

    let archived = storage.get_item(victim.id).await.expect("get item").expect("still exists");
    assert_eq!(archived.status, ItemStatus::Archived);

    let exceptions = storage
        .list_exceptions(template.id, t0(), t0() + Duration::days(14))
        .await
        .expect("list exceptions");
    assert!(exceptions
        .iter()
        .any(|e| e.occurs_at == target && e.exception_type == cadence_core::models::ExceptionType::Deleted));

    let remaining = storage
        .list_items(&ListItemsParams { list_id, status: None, offset: 0, limit: 100 })
        .await
        .expect("list items")
        .0;
    assert!(!remaining.iter().any(|i| i.occurs_at == Some(target)));
}

/// Scenario C: editing a recurring item's title keeps the back-reference,
/// records an `edited` exception, and a subsequent reconciliation batch
/// does not overwrite it.
#[tokio::test]
async fn scenario_c_edit_recurring_instance_survives_reconciliation() {
    let (storage, clock, _dir) = setup().await;
    let template_service = TemplateService::new(Arc::clone(&storage), clock.clone(), EngineConfig::default());
    let item_service = ItemService::new(Arc::clone(&storage), clock.clone(), EngineConfig::default());
    let list_id = Uuid::now_v7();

    let template = template_service.create(daily_template(list_id)).await.expect("create");
    let target = t0() + Duration::days(5);
    let (items, _) = storage
        .list_items(&ListItemsParams { list_id, status: None, offset: 0, limit: 100 })
        .await
        .expect("list items");
    let victim = items.iter().find(|i| i.occurs_at == Some(target)).expect("item at T0+5d");

    let mut update = UpdateItemData { mask: vec![ItemField::Title], ..Default::default() };
    update.title = Some("X".to_string());
    let edited = item_service.update(list_id, victim.id, update).await.expect("update");
    assert_eq!(edited.title, "X");
    assert_eq!(edited.recurring_template_id, Some(template.id));

    let exceptions = storage
        .list_exceptions(template.id, t0(), t0() + Duration::days(14))
        .await
        .expect("list exceptions");
    assert!(exceptions
        .iter()
        .any(|e| e.occurs_at == target && e.exception_type == cadence_core::models::ExceptionType::Edited));

    cadence_core::reconciliation::reconcile_template(storage.as_ref(), clock.as_ref(), &{
        storage.get_template_by_id(template.id).await.expect("get template").expect("exists")
    }, 400)
    .await
    .expect("reconcile");

    let still = storage.get_item(victim.id).await.expect("get item").expect("exists");
    assert_eq!(still.title, "X");
}

/// Scenario D: a pattern change from daily to weekly on T0+2d removes every
/// future item and regenerates from the new pattern, advancing
/// `generated_through` to the new sync horizon.
#[tokio::test]
async fn scenario_d_pattern_change_replaces_future_items() {
    let (storage, clock, _dir) = setup().await;
    let service = TemplateService::new(Arc::clone(&storage), clock.clone(), EngineConfig::default());
    let list_id = Uuid::now_v7();

    let template = service.create(daily_template(list_id)).await.expect("create");
    clock.set(t0() + Duration::days(2));

    let mut update = UpdateTemplateData {
        mask: vec![TemplateField::RecurrencePattern, TemplateField::RecurrenceConfig],
        ..Default::default()
    };
    update.recurrence_pattern = Some(RecurrencePattern::Weekly);
    update.recurrence_config = Some(serde_json::json!({ "interval": 1, "weekday": "thu" }));

    let updated = service.update(list_id, template.id, update).await.expect("update");
    assert_eq!(updated.generated_through, t0() + Duration::days(2) + Duration::days(14));

    let (items, _) = storage
        .list_items(&ListItemsParams { list_id, status: None, offset: 0, limit: 100 })
        .await
        .expect("list items");
    assert!(items.iter().all(|i| i.occurs_at.unwrap() >= t0() + Duration::days(2)));
}

/// Scenario E: a job whose lease expired is reclaimed by a different worker
/// and the `claimed_by` ownership transfers cleanly.
#[tokio::test]
async fn scenario_e_expired_lease_is_reclaimed_by_another_worker() {
    let (storage, clock, _dir) = setup().await;
    let coordinator = Coordinator::new(Arc::clone(&storage), clock.clone());
    let service = TemplateService::new(Arc::clone(&storage), clock.clone(), EngineConfig::default());
    let list_id = Uuid::now_v7();
    let mut data = daily_template(list_id);
    data.sync_horizon_days = 1;
    let template = service.create(data).await.expect("create");
    assert!(storage.has_active_job_for_template(template.id).await.expect("check"));

    let lease_ttl = std::time::Duration::from_secs(60);
    let job = coordinator.claim_next("worker-1", lease_ttl).await.expect("claim").expect("job present");
    assert_eq!(job.claimed_by.as_deref(), Some("worker-1"));

    clock.advance(Duration::seconds(120));
    let reclaimed = coordinator.claim_next("worker-2", lease_ttl).await.expect("claim").expect("job still present");
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.claimed_by.as_deref(), Some("worker-2"));
}

/// Scenario F: a job that exhausts its retries is dead-lettered once, and
/// `retry_dead_letter` creates a fresh pending job.
#[tokio::test]
async fn scenario_f_exhausted_retries_dead_letter_and_retry() {
    let (storage, clock, _dir) = setup().await;
    let coordinator = Coordinator::new(Arc::clone(&storage), clock.clone());
    let mut retry_cfg = cadence_core::config::RetryConfig::default();
    retry_cfg.max_retries = 2;

    let template_id = Uuid::now_v7();
    let job = storage
        .enqueue_job(
            cadence_core::models::NewGenerationJob {
                template_id,
                generate_from: t0(),
                generate_until: t0() + Duration::days(30),
                scheduled_for: t0(),
            },
            t0(),
        )
        .await
        .expect("enqueue");

    let lease_ttl = std::time::Duration::from_secs(60);
    for attempt in 0..=retry_cfg.max_retries {
        let claimed = coordinator
            .claim_next("worker-1", lease_ttl)
            .await
            .expect("claim")
            .expect("job present");
        assert_eq!(claimed.id, job.id);
        let will_retry = coordinator
            .fail(job.id, "worker-1", "boom", &retry_cfg)
            .await
            .expect("fail");
        if attempt < retry_cfg.max_retries {
            assert!(will_retry, "attempt {attempt} should still retry");
            // Jump past the backoff delay so the next claim sees the job
            // as ready (`scheduled_for <= now`) without needing to sleep.
            clock.advance(Duration::seconds(310));
        } else {
            assert!(!will_retry, "final attempt should exhaust retries");
        }
    }

    let dead_letters = storage.list_dead_letter(10).await.expect("list dead letter");
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].error_type, JobErrorType::Exhausted);

    let retried = storage
        .retry_dead_letter(dead_letters[0].id, "reviewer", clock.now())
        .await
        .expect("retry dead letter");
    assert_eq!(retried.retry_count, 0);
    assert_eq!(retried.status, cadence_core::models::JobStatus::Pending);

    let refreshed = storage.get_dead_letter(dead_letters[0].id).await.expect("get dead letter").expect("exists");
    assert_eq!(refreshed.resolution, cadence_core::models::DeadLetterResolution::Retried);
}

/// Item creation validates titles the same way the template service does.
#[tokio::test]
async fn item_service_rejects_blank_titles() {
    let (storage, clock, _dir) = setup().await;
    let item_service = ItemService::new(storage, clock, EngineConfig::default());
    let data = NewItemData {
        list_id: Uuid::now_v7(),
        title: "   ".to_string(),
        priority: None,
        tags: None,
        due_at: None,
        starts_at: None,
        estimated_duration_minutes: None,
        timezone: None,
    };
    let err = item_service.create(data).await.expect_err("blank title must fail");
    assert!(matches!(err, cadence_core::CoreError::Validation(_)));
}

/// Updating or deleting an item through the wrong list surfaces as
/// `NotFound`, same as a missing id, rather than leaking that the item
/// exists under a different list.
#[tokio::test]
async fn item_service_rejects_wrong_list_ownership() {
    let (storage, clock, _dir) = setup().await;
    let item_service = ItemService::new(Arc::clone(&storage), clock.clone(), EngineConfig::default());
    let owning_list = Uuid::now_v7();
    let other_list = Uuid::now_v7();

    let item = item_service
        .create(NewItemData {
            list_id: owning_list,
            title: "Buy milk".to_string(),
            priority: None,
            tags: None,
            due_at: None,
            starts_at: None,
            estimated_duration_minutes: None,
            timezone: None,
        })
        .await
        .expect("create");

    let mut update = UpdateItemData { mask: vec![ItemField::Title], ..Default::default() };
    update.title = Some("Buy oat milk".to_string());
    let err = item_service
        .update(other_list, item.id, update)
        .await
        .expect_err("wrong list must not be able to update");
    assert!(matches!(err, cadence_core::CoreError::NotFound(_)));

    let err = item_service
        .delete(other_list, item.id)
        .await
        .expect_err("wrong list must not be able to delete");
    assert!(matches!(err, cadence_core::CoreError::NotFound(_)));

    let still_there = storage.get_item(item.id).await.expect("get item").expect("untouched");
    assert_eq!(still_there.title, "Buy milk");
}
