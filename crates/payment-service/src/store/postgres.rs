//! PostgreSQL 存储实现
//!
//! 行锁使用 `SELECT ... FOR UPDATE`，计数器使用 `SET x = x + $n` 原子递增，
//! 资格授予与退款状态推进使用带条件的 UPDATE，以影响行数判断是否成功。

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgExecutor;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{OrderStatusUpdate, PaymentStore, PaymentTx};
use crate::error::{PaymentError, Result};
use crate::models::{
    AuditLogEntry, NewAuditEntry, NewPaymentOrder, NewReferral, NewRefund, PaymentOrder, Referral,
    Refund, RefundStatus, User, UserPaymentRecord,
};

/// PostgreSQL 存储
#[derive(Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// PostgreSQL 事务
pub struct PgPaymentTx {
    tx: Transaction<'static, Postgres>,
}

// ==================== 共享查询 ====================

async fn find_user_by_code<'e>(executor: impl PgExecutor<'e>, code: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE referral_code = $1")
        .bind(code)
        .fetch_optional(executor)
        .await?;
    Ok(user)
}

async fn insert_audit<'e>(executor: impl PgExecutor<'e>, entry: NewAuditEntry) -> Result<AuditLogEntry> {
    let entry = entry.into_entry(Utc::now());
    let row = sqlx::query_as::<_, AuditLogEntry>(
        r#"
        INSERT INTO audit_logs (id, action, user_id, order_id, details, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(entry.id)
    .bind(entry.action)
    .bind(entry.user_id)
    .bind(entry.order_id)
    .bind(&entry.details)
    .bind(entry.created_at)
    .fetch_one(executor)
    .await?;
    Ok(row)
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    type Tx = PgPaymentTx;

    async fn begin(&self) -> Result<Self::Tx> {
        let tx = self.pool.begin().await?;
        Ok(PgPaymentTx { tx })
    }

    async fn insert_order(&self, order: NewPaymentOrder) -> Result<PaymentOrder> {
        let order = order.into_order(Utc::now());
        let row = sqlx::query_as::<_, PaymentOrder>(
            r#"
            INSERT INTO payment_orders
                (id, user_id, gateway_order_id, amount, currency, receipt, status,
                 referral_code, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&order.gateway_order_id)
        .bind(order.amount)
        .bind(&order.currency)
        .bind(&order.receipt)
        .bind(order.status)
        .bind(&order.referral_code)
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<PaymentOrder>> {
        let order = sqlx::query_as::<_, PaymentOrder>(
            "SELECT * FROM payment_orders WHERE gateway_order_id = $1",
        )
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_referral_code(&self, code: &str) -> Result<Option<User>> {
        find_user_by_code(&self.pool, code).await
    }

    async fn list_referrals_by_referrer(&self, referrer_id: Uuid, limit: i64) -> Result<Vec<Referral>> {
        let referrals = sqlx::query_as::<_, Referral>(
            r#"
            SELECT * FROM referrals
            WHERE referrer_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(referrer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(referrals)
    }

    async fn find_active_refund(&self, user_id: Uuid) -> Result<Option<Refund>> {
        let refund = sqlx::query_as::<_, Refund>(
            r#"
            SELECT * FROM refunds
            WHERE user_id = $1 AND status NOT IN ('processed', 'rejected')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(refund)
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
        insert_audit(&self.pool, entry).await
    }
}

#[async_trait]
impl PaymentTx for PgPaymentTx {
    async fn lock_order(&mut self, gateway_order_id: &str) -> Result<Option<PaymentOrder>> {
        let order = sqlx::query_as::<_, PaymentOrder>(
            "SELECT * FROM payment_orders WHERE gateway_order_id = $1 FOR UPDATE",
        )
        .bind(gateway_order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(order)
    }

    async fn update_order_status(&mut self, order_id: Uuid, update: OrderStatusUpdate) -> Result<PaymentOrder> {
        sqlx::query_as::<_, PaymentOrder>(
            r#"
            UPDATE payment_orders
            SET status = $2,
                gateway_payment_id = COALESCE($3, gateway_payment_id),
                failure_reason = COALESCE($4, failure_reason),
                verified_at = COALESCE($5, verified_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(update.status)
        .bind(update.gateway_payment_id)
        .bind(update.failure_reason)
        .bind(update.verified_at)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))
    }

    async fn lock_user(&mut self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn record_user_payment(&mut self, user_id: Uuid, payment: UserPaymentRecord) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET role = CASE WHEN role = 'admin' THEN role ELSE 'paid' END,
                payment_id = $2,
                payment_amount = $3,
                paid_at = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&payment.payment_id)
        .bind(payment.amount)
        .bind(payment.paid_at)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(PaymentError::UserNotFound(user_id))
    }

    async fn find_user_by_referral_code(&mut self, code: &str) -> Result<Option<User>> {
        find_user_by_code(&mut *self.tx, code).await
    }

    async fn set_referred_by_if_empty(&mut self, user_id: Uuid, code: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET referred_by = $2, updated_at = NOW()
            WHERE id = $1 AND referred_by IS NULL
            "#,
        )
        .bind(user_id)
        .bind(code)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_completed_referral(&mut self, referral: NewReferral) -> Result<Option<Referral>> {
        let referral = referral.into_referral(Utc::now());
        let row = sqlx::query_as::<_, Referral>(
            r#"
            INSERT INTO referrals
                (id, referrer_id, referred_user_id, referral_code, status, reward_amount,
                 order_id, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (referrer_id, referred_user_id) WHERE status = 'completed' DO NOTHING
            RETURNING *
            "#,
        )
        .bind(referral.id)
        .bind(referral.referrer_id)
        .bind(referral.referred_user_id)
        .bind(&referral.referral_code)
        .bind(referral.status)
        .bind(referral.reward_amount)
        .bind(referral.order_id)
        .bind(referral.created_at)
        .bind(referral.completed_at)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn increment_referral_stats(&mut self, referrer_id: Uuid, reward: i64) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET total_referrals = total_referrals + 1,
                referral_earnings = referral_earnings + $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(referrer_id)
        .bind(reward)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(PaymentError::UserNotFound(referrer_id))
    }

    async fn grant_refund_eligibility(&mut self, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refund_eligible = TRUE, refund_status = $2, updated_at = NOW()
            WHERE id = $1 AND refund_eligible = FALSE AND refund_status = $3
            "#,
        )
        .bind(user_id)
        .bind(RefundStatus::Eligible)
        .bind(RefundStatus::NotEligible)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn has_active_refund(&mut self, user_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM refunds
                WHERE user_id = $1 AND status NOT IN ('processed', 'rejected')
            )
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn insert_refund(&mut self, refund: NewRefund) -> Result<Refund> {
        let refund = refund.into_refund(Utc::now());
        let row = sqlx::query_as::<_, Refund>(
            r#"
            INSERT INTO refunds
                (id, user_id, amount, status, method, referral_count_snapshot, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(refund.id)
        .bind(refund.user_id)
        .bind(refund.amount)
        .bind(refund.status)
        .bind(&refund.method)
        .bind(refund.referral_count_snapshot)
        .bind(refund.created_at)
        .bind(refund.updated_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn advance_refund_status(
        &mut self,
        user_id: Uuid,
        from: RefundStatus,
        to: RefundStatus,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let result = sqlx::query(
            r#"
            UPDATE users
            SET refund_status = $3, updated_at = NOW()
            WHERE id = $1 AND refund_status = $2
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
        insert_audit(&mut *self.tx, entry).await
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
