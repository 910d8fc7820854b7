use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Metered resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "usage_kind", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Image,
    Video,
}

impl UsageKind {
    pub const ALL: [UsageKind; 2] = [UsageKind::Image, UsageKind::Video];
}

impl Display for UsageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UsageKind::Image => write!(f, "image"),
            UsageKind::Video => write!(f, "video"),
        }
    }
}

impl FromStr for UsageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(UsageKind::Image),
            "video" => Ok(UsageKind::Video),
            _ => Err(anyhow::anyhow!("Invalid usage kind: {}", s)),
        }
    }
}

/// Per-user, per-kind credit counter.
///
/// `0 <= used <= credit_limit` holds after every operation; the database
/// enforces the same bounds with a CHECK constraint and conditional updates.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UsageCounter {
    pub user_id: Uuid,
    pub kind: UsageKind,
    pub used: i32,
    pub credit_limit: i32,
    pub updated_at: DateTime<Utc>,
}

impl UsageCounter {
    pub fn new(user_id: Uuid, kind: UsageKind, credit_limit: i32) -> Self {
        Self {
            user_id,
            kind,
            used: 0,
            credit_limit: credit_limit.max(0),
            updated_at: Utc::now(),
        }
    }

    /// Consume one credit. Returns whether the increment was allowed.
    pub fn try_increment(&mut self) -> bool {
        if self.used < self.credit_limit {
            self.used += 1;
            true
        } else {
            false
        }
    }

    /// `limit - count`, never negative.
    pub fn remaining(&self) -> i32 {
        (self.credit_limit - self.used).max(0)
    }

    /// Give back one reserved credit (vendor call failed or was cancelled).
    pub fn release(&mut self) {
        self.used = (self.used - 1).max(0);
    }

    /// Add purchased credits to the limit.
    pub fn grant(&mut self, credits: i32) {
        self.credit_limit = self.credit_limit.saturating_add(credits.max(0));
    }

    /// Overwrite the limit. Consumed credits are kept, so a lowered limit
    /// leaves `remaining()` at zero rather than forgetting past usage.
    pub fn set_limit(&mut self, limit: i32) {
        self.credit_limit = limit.max(0);
    }

    pub fn summary(&self) -> UsageSummary {
        UsageSummary {
            kind: self.kind,
            used: self.used,
            limit: self.credit_limit,
            remaining: self.remaining(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct UsageSummary {
    pub kind: UsageKind,
    pub used: i32,
    pub limit: i32,
    pub remaining: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(limit: i32) -> UsageCounter {
        UsageCounter::new(Uuid::new_v4(), UsageKind::Image, limit)
    }

    #[test]
    fn test_increment_until_limit() {
        let mut c = counter(2);
        assert!(c.try_increment());
        assert!(c.try_increment());
        assert!(!c.try_increment());
        assert_eq!(c.used, 2);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn test_zero_limit_never_allows() {
        let mut c = counter(0);
        assert!(!c.try_increment());
        assert_eq!(c.used, 0);
    }

    #[test]
    fn test_release_saturates_at_zero() {
        let mut c = counter(3);
        c.release();
        assert_eq!(c.used, 0);
        assert!(c.try_increment());
        c.release();
        c.release();
        assert_eq!(c.used, 0);
        assert_eq!(c.remaining(), 3);
    }

    #[test]
    fn test_grant_extends_limit() {
        let mut c = counter(1);
        assert!(c.try_increment());
        assert!(!c.try_increment());
        c.grant(5);
        assert_eq!(c.remaining(), 5);
        c.grant(-4);
        assert_eq!(c.credit_limit, 6);
    }

    #[test]
    fn test_lowering_then_raising_limit_keeps_usage() {
        let mut c = counter(5);
        for _ in 0..4 {
            assert!(c.try_increment());
        }
        c.set_limit(2);
        assert_eq!(c.used, 4);
        assert_eq!(c.remaining(), 0);
        assert!(!c.try_increment());

        c.set_limit(5);
        assert_eq!(c.used, 4);
        assert_eq!(c.remaining(), 1);
    }

    #[test]
    fn test_bounds_hold_over_mixed_sequence() {
        let mut c = counter(3);
        let ops = [0, 0, 1, 0, 0, 0, 2, 1, 1, 1, 0, 3, 0, 0, 0, 0, 0];
        for op in ops {
            match op {
                0 => {
                    c.try_increment();
                }
                1 => c.release(),
                2 => c.grant(1),
                _ => c.set_limit(2),
            }
            assert!(c.used >= 0);
            assert_eq!(c.remaining(), (c.credit_limit - c.used).max(0));
        }
    }
}
