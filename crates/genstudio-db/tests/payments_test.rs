mod helpers;

use genstudio_core::models::{
    CreditPackage, NewPaymentRequest, PaymentStatus, ReviewDecision, UsageKind,
};
use genstudio_core::AppError;
use genstudio_db::{PaymentRepository, UsageRepository};
use helpers::{create_user, setup_test_db};
use sqlx::PgPool;
use uuid::Uuid;

fn starter() -> CreditPackage {
    CreditPackage::default_catalog()
        .into_iter()
        .find(|p| p.id == "starter")
        .expect("starter package")
}

async fn submit(pool: &PgPool, user_id: Uuid) -> Uuid {
    PaymentRepository::new(pool.clone())
        .create(&NewPaymentRequest {
            user_id,
            package: starter(),
            contact_name: "Dana".to_string(),
            contact_phone: Some("+15550100".to_string()),
            contact_email: None,
            payment_reference: "TRX-1001".to_string(),
        })
        .await
        .expect("submit payment")
        .id
}

async fn limits(pool: &PgPool, user_id: Uuid) -> (i32, i32) {
    let usage = UsageRepository::new(pool.clone());
    let image = usage.get(user_id, UsageKind::Image).await.unwrap();
    let video = usage.get(user_id, UsageKind::Video).await.unwrap();
    (
        image.map(|c| c.credit_limit).unwrap_or_default(),
        video.map(|c| c.credit_limit).unwrap_or_default(),
    )
}

#[tokio::test]
async fn test_approving_twice_grants_credits_once() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let user = create_user(&db.pool).await;
    let admin = create_user(&db.pool).await;
    UsageRepository::new(db.pool.clone())
        .ensure_defaults(user.id, 10, 3)
        .await
        .unwrap();
    let payments = PaymentRepository::new(db.pool.clone());
    let id = submit(&db.pool, user.id).await;

    let (approved, applied) = payments
        .resolve(id, ReviewDecision::Approve, admin.id, Some("paid"))
        .await
        .unwrap();
    assert!(applied);
    assert_eq!(approved.status, PaymentStatus::Approved);
    assert_eq!(approved.reviewed_by, Some(admin.id));

    let (again, applied) = payments
        .resolve(id, ReviewDecision::Approve, admin.id, None)
        .await
        .unwrap();
    assert!(!applied);
    assert_eq!(again.status, PaymentStatus::Approved);

    let package = starter();
    assert_eq!(
        limits(&db.pool, user.id).await,
        (10 + package.image_credits, 3 + package.video_credits)
    );
}

#[tokio::test]
async fn test_concurrent_approvals_grant_once() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let user = create_user(&db.pool).await;
    let admin = create_user(&db.pool).await;
    let payments = PaymentRepository::new(db.pool.clone());
    let id = submit(&db.pool, user.id).await;

    let (first, second) = tokio::join!(
        payments.resolve(id, ReviewDecision::Approve, admin.id, None),
        payments.resolve(id, ReviewDecision::Approve, admin.id, None),
    );
    let applied = [first.unwrap().1, second.unwrap().1];
    assert_eq!(applied.iter().filter(|a| **a).count(), 1);

    let package = starter();
    assert_eq!(
        limits(&db.pool, user.id).await,
        (package.image_credits, package.video_credits)
    );
}

#[tokio::test]
async fn test_reject_after_approve_conflicts() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let user = create_user(&db.pool).await;
    let admin = create_user(&db.pool).await;
    let payments = PaymentRepository::new(db.pool.clone());
    let id = submit(&db.pool, user.id).await;

    payments
        .resolve(id, ReviewDecision::Approve, admin.id, None)
        .await
        .unwrap();
    let before = limits(&db.pool, user.id).await;

    let err = payments
        .resolve(id, ReviewDecision::Reject, admin.id, Some("changed my mind"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let stored = payments.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Approved);
    assert_eq!(limits(&db.pool, user.id).await, before);
}

#[tokio::test]
async fn test_rejection_grants_nothing() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let user = create_user(&db.pool).await;
    let admin = create_user(&db.pool).await;
    let payments = PaymentRepository::new(db.pool.clone());
    let id = submit(&db.pool, user.id).await;

    let (rejected, applied) = payments
        .resolve(id, ReviewDecision::Reject, admin.id, Some("no transfer found"))
        .await
        .unwrap();
    assert!(applied);
    assert_eq!(rejected.status, PaymentStatus::Rejected);
    assert_eq!(rejected.admin_note.as_deref(), Some("no transfer found"));
    assert_eq!(limits(&db.pool, user.id).await, (0, 0));

    let err = payments
        .resolve(id, ReviewDecision::Approve, admin.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_unknown_payment_not_found() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let admin = create_user(&db.pool).await;
    let err = PaymentRepository::new(db.pool.clone())
        .resolve(Uuid::new_v4(), ReviewDecision::Approve, admin.id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
