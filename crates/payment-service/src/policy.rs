//! 推荐奖励策略
//!
//! 纯函数，无 I/O：
//! - 奖励 = 支付金额的 10%，向下取整（最小货币单位）
//! - 成功推荐数达到 20 时触发退款资格
//!
//! 里程碑只依据事务内递增后的推荐数和存储的 `refund_eligible` 标记判断，
//! 已获得资格的推荐人不会被重复授予。

use serde::Deserialize;

/// 推荐奖励比例（百分比）
pub const REFERRAL_REWARD_PERCENT: i64 = 10;

/// 获得退款资格所需的成功推荐数
pub const REFUND_MILESTONE: i32 = 20;

/// 里程碑评估结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneOutcome {
    pub reached_milestone: bool,
}

/// 奖励策略配置（`[reward]` 配置段）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub percent: i64,
    pub milestone: i32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            percent: REFERRAL_REWARD_PERCENT,
            milestone: REFUND_MILESTONE,
        }
    }
}

/// 推荐奖励策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardPolicy {
    percent: i64,
    milestone: i32,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            percent: REFERRAL_REWARD_PERCENT,
            milestone: REFUND_MILESTONE,
        }
    }
}

impl From<&RewardConfig> for RewardPolicy {
    fn from(config: &RewardConfig) -> Self {
        Self::new(config.percent, config.milestone)
    }
}

impl RewardPolicy {
    /// 非法配置（比例不在 0..=100 或里程碑 < 1）回退为默认值
    pub fn new(percent: i64, milestone: i32) -> Self {
        let defaults = Self::default();
        Self {
            percent: if (0..=100).contains(&percent) {
                percent
            } else {
                defaults.percent
            },
            milestone: if milestone >= 1 {
                milestone
            } else {
                defaults.milestone
            },
        }
    }

    pub fn milestone(&self) -> i32 {
        self.milestone
    }

    /// 计算单次推荐奖励，负数金额视为 0
    pub fn compute_reward(&self, payment_amount: i64) -> i64 {
        if payment_amount <= 0 {
            return 0;
        }
        // i128 防止极端金额溢出
        (payment_amount as i128 * self.percent as i128 / 100) as i64
    }

    pub fn evaluate_milestone(&self, completed_referral_count: i32) -> MilestoneOutcome {
        MilestoneOutcome {
            reached_milestone: completed_referral_count >= self.milestone,
        }
    }

    /// 是否应在本次事务中授予退款资格
    pub fn should_grant_eligibility(&self, completed_referral_count: i32, already_eligible: bool) -> bool {
        !already_eligible && self.evaluate_milestone(completed_referral_count).reached_milestone
    }
}
