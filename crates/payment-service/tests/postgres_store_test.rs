//! PostgreSQL 存储集成测试
//!
//! 需要可用的数据库：`TEST_DATABASE_URL=... cargo test -- --ignored`

use std::sync::Arc;

use studyhub_payment::store::OrderStatusUpdate;
use studyhub_payment::{
    NewPaymentOrder, NewReferral, OrderStatus, PaymentStore, PaymentTx, PgPaymentStore,
    RefundStatus, User, generate_receipt,
};
use studyhub_shared::database::Database;
use studyhub_shared::test_utils::{test_database_config, test_email, test_referral_code};

async fn store() -> Arc<PgPaymentStore> {
    let db = Database::connect(&test_database_config())
        .await
        .expect("connect test database");
    db.run_migrations().await.expect("run migrations");
    Arc::new(PgPaymentStore::new(db.pool().clone()))
}

async fn insert_user(store: &PgPaymentStore, user: &User) {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, role, referral_code, total_referrals,
                           referral_earnings, refund_eligible, refund_status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.name)
    .bind(user.role)
    .bind(&user.referral_code)
    .bind(user.total_referrals)
    .bind(user.referral_earnings)
    .bind(user.refund_eligible)
    .bind(user.refund_status)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(store.pool())
    .await
    .expect("insert user");
}

fn new_user(name: &str) -> User {
    User::new(test_email(), name, test_referral_code())
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_rollback_on_drop() {
    let store = store().await;
    let user = new_user("Payer");
    insert_user(&store, &user).await;

    let order = store
        .insert_order(NewPaymentOrder {
            user_id: user.id,
            gateway_order_id: format!("order_{}", user.referral_code),
            amount: 499,
            currency: "INR".to_string(),
            receipt: generate_receipt(),
            referral_code: None,
        })
        .await
        .unwrap();

    {
        let mut tx = store.begin().await.unwrap();
        tx.lock_order(&order.gateway_order_id).await.unwrap().unwrap();
        tx.update_order_status(order.id, OrderStatusUpdate::completed("pay_x", chrono::Utc::now()))
            .await
            .unwrap();
    }

    let stored = store
        .find_order_by_gateway_id(&order.gateway_order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Created);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_referral_pair_unique_and_eligibility_cas() {
    let store = store().await;
    let referrer = new_user("Referrer");
    let payer = new_user("Payer");
    insert_user(&store, &referrer).await;
    insert_user(&store, &payer).await;

    let order = store
        .insert_order(NewPaymentOrder {
            user_id: payer.id,
            gateway_order_id: format!("order_{}", payer.referral_code),
            amount: 499,
            currency: "INR".to_string(),
            receipt: generate_receipt(),
            referral_code: Some(referrer.referral_code.clone()),
        })
        .await
        .unwrap();

    let referral = || NewReferral {
        referrer_id: referrer.id,
        referred_user_id: payer.id,
        referral_code: referrer.referral_code.clone(),
        reward_amount: 49,
        order_id: order.id,
    };

    let mut tx = store.begin().await.unwrap();
    assert!(tx.insert_completed_referral(referral()).await.unwrap().is_some());
    assert!(tx.insert_completed_referral(referral()).await.unwrap().is_none());

    let stats = tx.increment_referral_stats(referrer.id, 49).await.unwrap();
    assert_eq!(stats.total_referrals, 1);
    assert_eq!(stats.referral_earnings, 49);

    assert!(tx.grant_refund_eligibility(referrer.id).await.unwrap());
    assert!(!tx.grant_refund_eligibility(referrer.id).await.unwrap());
    assert!(
        tx.advance_refund_status(referrer.id, RefundStatus::Eligible, RefundStatus::Processing)
            .await
            .unwrap()
    );
    tx.commit().await.unwrap();

    let stored = store.find_user(referrer.id).await.unwrap().unwrap();
    assert!(stored.refund_eligible);
    assert_eq!(stored.refund_status, RefundStatus::Processing);
}
