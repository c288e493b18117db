mod common;

use std::collections::HashMap;
use std::sync::Arc;

use crosslist::models::{
    error_codes, AutomationResult, ExecutionKind, RegistrationStatus,
};
use crosslist::orchestrator::RegistrationOrchestrator;
use crosslist::paths::ExecutionPath;
use crosslist::platforms::Platform;
use crosslist::AppError;

use common::{insert_pending_attempt, retry_config, sample_product, setup_pool, StubPath};

async fn orchestrator_with(
    results: Vec<AutomationResult>,
) -> (RegistrationOrchestrator, sqlx::SqlitePool) {
    let pool = setup_pool().await;
    let mut paths: HashMap<ExecutionKind, Arc<dyn ExecutionPath>> = HashMap::new();
    paths.insert(ExecutionKind::Api, StubPath::new(ExecutionKind::Api, results));
    (
        RegistrationOrchestrator::new(pool.clone(), paths, retry_config()),
        pool,
    )
}

#[tokio::test]
async fn test_successful_registration() {
    let (orchestrator, _pool) = orchestrator_with(vec![AutomationResult::success(
        Platform::Naver,
        Some("91823".to_string()),
        Some("https://smartstore.example/p/91823".to_string()),
    )])
    .await;

    let attempt = orchestrator
        .submit_registration("naver", &sample_product())
        .await
        .unwrap();

    assert_eq!(attempt.status, RegistrationStatus::Success);
    assert_eq!(attempt.platform_product_id.as_deref(), Some("91823"));
    assert_eq!(attempt.retry_count, 0);
    assert!(attempt.started_at.is_some());
    assert!(attempt.completed_at.is_some());
    // Successful runs keep a response snapshot too, not just failures.
    assert!(attempt.response_data.is_some());
}

#[tokio::test]
async fn test_unknown_platform_creates_no_row() {
    let (orchestrator, pool) = orchestrator_with(vec![]).await;

    let err = orchestrator
        .submit_registration("ebay", &sample_product())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UnsupportedPlatform { .. }));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM registration_attempts")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn test_invalid_product_rejected_before_insert() {
    let (orchestrator, pool) = orchestrator_with(vec![]).await;

    let mut product = sample_product();
    product.price = -5;
    let err = orchestrator
        .submit_registration("naver", &product)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM registration_attempts")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn test_transient_failure_retries_then_succeeds() {
    let (orchestrator, _pool) = orchestrator_with(vec![
        AutomationResult::failure(Platform::Naver, error_codes::NETWORK, "connection refused"),
        AutomationResult::success(Platform::Naver, Some("91824".to_string()), None),
    ])
    .await;

    let attempt = orchestrator
        .submit_registration("naver", &sample_product())
        .await
        .unwrap();

    assert_eq!(attempt.status, RegistrationStatus::Success);
    assert_eq!(attempt.retry_count, 1);
    assert!(attempt.error_code.is_none());
}

#[tokio::test]
async fn test_permanent_failure_does_not_retry_inline() {
    let (orchestrator, _pool) = orchestrator_with(vec![AutomationResult::failure(
        Platform::Naver,
        error_codes::VALIDATION,
        "category is required",
    )])
    .await;

    let attempt = orchestrator
        .submit_registration("naver", &sample_product())
        .await
        .unwrap();

    assert_eq!(attempt.status, RegistrationStatus::Failed);
    assert_eq!(attempt.retry_count, 0);
    assert_eq!(attempt.error_code.as_deref(), Some(error_codes::VALIDATION));
}

#[tokio::test]
async fn test_transient_failures_stop_at_retry_ceiling() {
    let failures = (0..4)
        .map(|_| AutomationResult::failure(Platform::Naver, error_codes::TIMEOUT, "timed out"))
        .collect();
    let (orchestrator, _pool) = orchestrator_with(failures).await;

    let attempt = orchestrator
        .submit_registration("naver", &sample_product())
        .await
        .unwrap();

    // Initial run plus three retries, then the budget is spent.
    assert_eq!(attempt.status, RegistrationStatus::Failed);
    assert_eq!(attempt.retry_count, 3);

    let err = orchestrator.retry_attempt(&attempt.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_manual_retry_of_permanent_failure() {
    let (orchestrator, _pool) = orchestrator_with(vec![
        AutomationResult::failure(Platform::Naver, error_codes::VALIDATION, "bad category"),
        AutomationResult::success(Platform::Naver, Some("91825".to_string()), None),
    ])
    .await;

    let failed = orchestrator
        .submit_registration("naver", &sample_product())
        .await
        .unwrap();
    assert_eq!(failed.status, RegistrationStatus::Failed);

    let retried = orchestrator.retry_attempt(&failed.id).await.unwrap();
    assert_eq!(retried.status, RegistrationStatus::Success);
    assert_eq!(retried.retry_count, 1);
}

#[tokio::test]
async fn test_cancel_pending_attempt() {
    let (orchestrator, pool) = orchestrator_with(vec![]).await;
    let pending = insert_pending_attempt(&pool, Platform::Naver, &sample_product())
        .await
        .unwrap();

    let cancelled = orchestrator.cancel_attempt(&pending.id).await.unwrap();
    assert_eq!(cancelled.status, RegistrationStatus::Failed);
    assert_eq!(cancelled.error_code.as_deref(), Some(error_codes::CANCELLED));
}

#[tokio::test]
async fn test_cancel_refused_after_terminal_state() {
    let (orchestrator, _pool) = orchestrator_with(vec![AutomationResult::success(
        Platform::Naver,
        None,
        None,
    )])
    .await;

    let attempt = orchestrator
        .submit_registration("naver", &sample_product())
        .await
        .unwrap();
    let err = orchestrator.cancel_attempt(&attempt.id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let reloaded = orchestrator.get_attempt(&attempt.id).await.unwrap();
    assert_eq!(reloaded.status, RegistrationStatus::Success);
}

#[tokio::test]
async fn test_retry_refused_for_successful_attempt() {
    let (orchestrator, _pool) = orchestrator_with(vec![AutomationResult::success(
        Platform::Naver,
        None,
        None,
    )])
    .await;

    let attempt = orchestrator
        .submit_registration("naver", &sample_product())
        .await
        .unwrap();
    assert!(orchestrator.retry_attempt(&attempt.id).await.is_err());
}

#[tokio::test]
async fn test_resume_replays_stored_snapshot() {
    let (orchestrator, pool) = orchestrator_with(vec![AutomationResult::success(
        Platform::Naver,
        Some("91826".to_string()),
        None,
    )])
    .await;
    let pending = insert_pending_attempt(&pool, Platform::Naver, &sample_product())
        .await
        .unwrap();

    let resumed = orchestrator.resume(&pending.id).await.unwrap();
    assert_eq!(resumed.status, RegistrationStatus::Success);
    assert_eq!(resumed.platform_product_id.as_deref(), Some("91826"));
}

#[tokio::test]
async fn test_platform_status_counts_and_recent() {
    let (orchestrator, _pool) = orchestrator_with(vec![
        AutomationResult::success(Platform::Naver, None, None),
        AutomationResult::failure(Platform::Naver, error_codes::VALIDATION, "rejected"),
    ])
    .await;

    orchestrator
        .submit_registration("naver", &sample_product())
        .await
        .unwrap();
    let mut second = sample_product();
    second.external_id = "inv-1002".to_string();
    orchestrator
        .submit_registration("naver", &second)
        .await
        .unwrap();

    let status = orchestrator.platform_status(Platform::Naver).await.unwrap();
    assert_eq!(status.success, 1);
    assert_eq!(status.failed, 1);
    assert_eq!(status.pending, 0);
    assert_eq!(status.recent.len(), 2);

    let eligible = orchestrator.retry_eligible().await.unwrap();
    assert_eq!(eligible.len(), 1); // the failed one still has budget
}

#[tokio::test]
async fn test_list_by_platform_with_status_filter() {
    let (orchestrator, _pool) = orchestrator_with(vec![
        AutomationResult::success(Platform::Naver, None, None),
        AutomationResult::failure(Platform::Naver, error_codes::VALIDATION, "rejected"),
    ])
    .await;

    orchestrator
        .submit_registration("naver", &sample_product())
        .await
        .unwrap();
    let mut second = sample_product();
    second.external_id = "inv-1002".to_string();
    orchestrator
        .submit_registration("naver", &second)
        .await
        .unwrap();

    let all = orchestrator
        .list_by_platform(Platform::Naver, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let failed = orchestrator
        .list_by_platform(Platform::Naver, Some(RegistrationStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].product_ref, "inv-1002");
}

#[tokio::test]
async fn test_sweep_resumes_failed_and_orphaned_attempts() {
    let (orchestrator, pool) = orchestrator_with(vec![
        AutomationResult::failure(Platform::Naver, error_codes::VALIDATION, "rejected"),
        AutomationResult::success(Platform::Naver, None, None), // sweep of the failed one
        AutomationResult::success(Platform::Naver, None, None), // sweep of the orphan
    ])
    .await;

    let failed = orchestrator
        .submit_registration("naver", &sample_product())
        .await
        .unwrap();
    assert_eq!(failed.status, RegistrationStatus::Failed);
    let orphan = insert_pending_attempt(&pool, Platform::Naver, &sample_product())
        .await
        .unwrap();

    let orchestrator = Arc::new(orchestrator);
    let resumed = crosslist::sweeper::sweep(&orchestrator, 2).await.unwrap();
    assert_eq!(resumed, 2);

    assert_eq!(
        orchestrator.get_attempt(&failed.id).await.unwrap().status,
        RegistrationStatus::Success
    );
    assert_eq!(
        orchestrator.get_attempt(&orphan.id).await.unwrap().status,
        RegistrationStatus::Success
    );

    // Nothing left to sweep.
    assert_eq!(crosslist::sweeper::sweep(&orchestrator, 2).await.unwrap(), 0);
}

#[tokio::test]
async fn test_no_path_registered_for_kind() {
    let (orchestrator, pool) = orchestrator_with(vec![]).await;
    let pending = insert_pending_attempt(&pool, Platform::Bunjang, &sample_product())
        .await
        .unwrap();

    // Only the API path is registered in this fixture.
    let err = orchestrator.resume(&pending.id).await.unwrap_err();
    assert!(matches!(err, AppError::Automation(_)));

    // The row must not be stranded IN_PROGRESS: it stays PENDING, visible
    // to the sweeper and still cancellable.
    let reloaded = orchestrator.get_attempt(&pending.id).await.unwrap();
    assert_eq!(reloaded.status, RegistrationStatus::Pending);
}
