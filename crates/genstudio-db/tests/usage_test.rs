mod helpers;

use genstudio_core::models::UsageKind;
use genstudio_core::AppError;
use genstudio_db::UsageRepository;
use helpers::{create_user, setup_test_db};

#[tokio::test]
async fn test_try_consume_stops_at_limit() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let user = create_user(&db.pool).await;
    let usage = UsageRepository::new(db.pool.clone());
    usage.ensure_defaults(user.id, 2, 1).await.unwrap();

    assert!(usage.try_consume(user.id, UsageKind::Image).await.unwrap().is_some());
    let second = usage
        .try_consume(user.id, UsageKind::Image)
        .await
        .unwrap()
        .expect("second credit");
    assert_eq!(second.used, 2);
    assert!(usage.try_consume(user.id, UsageKind::Image).await.unwrap().is_none());

    let counter = usage.get(user.id, UsageKind::Image).await.unwrap().unwrap();
    assert_eq!((counter.used, counter.credit_limit), (2, 2));
}

#[tokio::test]
async fn test_concurrent_consumers_never_exceed_limit() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let user = create_user(&db.pool).await;
    let usage = UsageRepository::new(db.pool.clone());
    usage.ensure_defaults(user.id, 3, 0).await.unwrap();

    let attempts = (0..10).map(|_| {
        let usage = usage.clone();
        let user_id = user.id;
        tokio::spawn(async move { usage.try_consume(user_id, UsageKind::Image).await })
    });
    let mut granted = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        if attempt.await.unwrap().unwrap().is_some() {
            granted += 1;
        }
    }

    assert_eq!(granted, 3);
    let counter = usage.get(user.id, UsageKind::Image).await.unwrap().unwrap();
    assert_eq!(counter.used, 3);
}

#[tokio::test]
async fn test_release_saturates_at_zero() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let user = create_user(&db.pool).await;
    let usage = UsageRepository::new(db.pool.clone());
    usage.ensure_defaults(user.id, 2, 2).await.unwrap();

    usage.try_consume(user.id, UsageKind::Video).await.unwrap();
    usage.release(user.id, UsageKind::Video).await.unwrap();
    usage.release(user.id, UsageKind::Video).await.unwrap();

    let counter = usage.get(user.id, UsageKind::Video).await.unwrap().unwrap();
    assert_eq!(counter.used, 0);
    assert_eq!(counter.remaining(), 2);
}

#[tokio::test]
async fn test_ensure_defaults_keeps_existing_counters() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let user = create_user(&db.pool).await;
    let usage = UsageRepository::new(db.pool.clone());
    usage.ensure_defaults(user.id, 10, 3).await.unwrap();
    usage.try_consume(user.id, UsageKind::Image).await.unwrap();

    usage.ensure_defaults(user.id, 99, 99).await.unwrap();

    let counters = usage.list_for_user(user.id).await.unwrap();
    assert_eq!(counters.len(), 2);
    let image = usage.get(user.id, UsageKind::Image).await.unwrap().unwrap();
    assert_eq!((image.used, image.credit_limit), (1, 10));
}

#[tokio::test]
async fn test_lowered_limit_keeps_consumed_credits() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let user = create_user(&db.pool).await;
    let usage = UsageRepository::new(db.pool.clone());
    usage.ensure_defaults(user.id, 5, 1).await.unwrap();
    for _ in 0..4 {
        usage.try_consume(user.id, UsageKind::Image).await.unwrap();
    }

    let lowered = usage.set_limit(user.id, UsageKind::Image, 2).await.unwrap();
    assert_eq!((lowered.used, lowered.credit_limit), (4, 2));
    assert_eq!(lowered.remaining(), 0);
    assert!(usage.try_consume(user.id, UsageKind::Image).await.unwrap().is_none());

    let raised = usage.set_limit(user.id, UsageKind::Image, 5).await.unwrap();
    assert_eq!(raised.used, 4);
    assert_eq!(raised.remaining(), 1);
}

#[tokio::test]
async fn test_negative_limit_rejected() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let user = create_user(&db.pool).await;
    let usage = UsageRepository::new(db.pool.clone());

    let err = usage
        .set_limit(user.id, UsageKind::Video, -1)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_schema_rejects_negative_usage() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let user = create_user(&db.pool).await;
    let usage = UsageRepository::new(db.pool.clone());
    usage.ensure_defaults(user.id, 1, 1).await.unwrap();

    let result = sqlx::query("UPDATE usage_counters SET used = -1 WHERE user_id = $1")
        .bind(user.id)
        .execute(&db.pool)
        .await;
    assert!(result.is_err());
}
