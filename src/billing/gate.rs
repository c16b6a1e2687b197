//! Weekly scan quota for free-tier users.
//!
//! The quota is a fixed window: the first scan of a period stamps the window
//! start, and the count resets only once the whole window has elapsed. It is
//! a soft limit kept in local storage and is trivially bypassable.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::billing::tier::Tier;
use crate::config::Config;
use crate::db::{Database, StorageKey};

#[derive(Debug, Clone, Copy)]
pub struct UsagePolicy {
    pub window: Duration,
    pub free_scans: u32,
}

impl UsagePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window: Duration::days(config.usage_window_days.max(1)),
            free_scans: config.free_scans_per_window,
        }
    }
}

impl Default for UsagePolicy {
    fn default() -> Self {
        Self {
            window: Duration::days(7),
            free_scans: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageRecord {
    pub last_scan: Option<DateTime<Utc>>,
    pub scan_count: u32,
}

#[derive(Clone)]
pub struct UsageGate {
    db: Database,
    policy: UsagePolicy,
}

impl UsageGate {
    pub fn new(db: Database, policy: UsagePolicy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> UsagePolicy {
        self.policy
    }

    pub async fn usage(&self) -> Result<UsageRecord> {
        let last_scan = match self.db.get(StorageKey::LastScan).await? {
            Some(raw) => {
                let parsed = raw
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(DateTime::<Utc>::from_timestamp_millis);
                if parsed.is_none() {
                    warn!("Ignoring unreadable last scan timestamp '{}'", raw);
                }
                parsed
            }
            None => None,
        };
        let scan_count = self
            .db
            .get(StorageKey::ScanCount)
            .await?
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .unwrap_or(0);

        Ok(UsageRecord {
            last_scan,
            scan_count,
        })
    }

    /// When the current window ends, if one is open.
    pub fn window_resets_at(&self, record: &UsageRecord) -> Option<DateTime<Utc>> {
        record.last_scan.map(|start| start + self.policy.window)
    }

    pub async fn check_limit(&self, tier: Tier) -> Result<bool> {
        self.check_limit_at(tier, Utc::now()).await
    }

    pub async fn check_limit_at(&self, tier: Tier, now: DateTime<Utc>) -> Result<bool> {
        if tier.is_premium() {
            return Ok(true);
        }

        let record = self.usage().await?;
        let window_expired = match record.last_scan {
            None => true,
            Some(start) => now - start > self.policy.window,
        };

        if window_expired {
            self.db
                .set(StorageKey::LastScan, &now.timestamp_millis().to_string())
                .await?;
            self.db.set(StorageKey::ScanCount, "0").await?;
            info!("Usage window opened at {}", now.to_rfc3339());
            return Ok(true);
        }

        let allowed = record.scan_count < self.policy.free_scans;
        debug!(
            scan_count = record.scan_count,
            free_scans = self.policy.free_scans,
            allowed,
            "usage check"
        );
        Ok(allowed)
    }

    pub async fn record_usage(&self, tier: Tier) -> Result<()> {
        self.record_usage_at(tier, Utc::now()).await
    }

    pub async fn record_usage_at(&self, tier: Tier, now: DateTime<Utc>) -> Result<()> {
        if tier.is_premium() {
            return Ok(());
        }

        let count = self.usage().await?.scan_count;
        self.db
            .set(StorageKey::ScanCount, &count.saturating_add(1).to_string())
            .await?;
        if count == 0 {
            self.db
                .set(StorageKey::LastScan, &now.timestamp_millis().to_string())
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn gate() -> (Database, UsageGate) {
        let db = Database::init("sqlite::memory:").await.unwrap();
        let gate = UsageGate::new(db.clone(), UsagePolicy::default());
        (db, gate)
    }

    #[tokio::test]
    async fn first_scan_is_allowed_and_second_is_blocked() {
        let (_db, gate) = gate().await;
        let now = Utc::now();

        assert!(gate.check_limit_at(Tier::Free, now).await.unwrap());
        gate.record_usage_at(Tier::Free, now).await.unwrap();

        let later = now + Duration::days(3);
        assert!(!gate.check_limit_at(Tier::Free, later).await.unwrap());
        assert_eq!(gate.usage().await.unwrap().scan_count, 1);
    }

    #[tokio::test]
    async fn expired_window_resets_the_count() {
        let (db, gate) = gate().await;
        let now = Utc::now();
        let eight_days_ago = now - Duration::days(8);
        db.set(
            StorageKey::LastScan,
            &eight_days_ago.timestamp_millis().to_string(),
        )
        .await
        .unwrap();
        db.set(StorageKey::ScanCount, "1").await.unwrap();

        assert!(gate.check_limit_at(Tier::Free, now).await.unwrap());

        let record = gate.usage().await.unwrap();
        assert_eq!(record.scan_count, 0);
        assert_eq!(
            record.last_scan.map(|ts| ts.timestamp_millis()),
            Some(now.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn window_is_fixed_not_sliding() {
        let (_db, gate) = gate().await;
        let start = Utc::now();
        gate.check_limit_at(Tier::Free, start).await.unwrap();
        gate.record_usage_at(Tier::Free, start).await.unwrap();

        let just_inside = start + Duration::days(7);
        assert!(!gate.check_limit_at(Tier::Free, just_inside).await.unwrap());

        let just_after = start + Duration::days(7) + Duration::milliseconds(1);
        assert!(gate.check_limit_at(Tier::Free, just_after).await.unwrap());
    }

    #[tokio::test]
    async fn premium_is_never_limited_or_counted() {
        let (db, gate) = gate().await;
        let now = Utc::now();
        db.set(StorageKey::LastScan, &now.timestamp_millis().to_string())
            .await
            .unwrap();
        db.set(StorageKey::ScanCount, "5").await.unwrap();

        assert!(gate.check_limit_at(Tier::Premium, now).await.unwrap());
        gate.record_usage_at(Tier::Premium, now).await.unwrap();
        assert_eq!(gate.usage().await.unwrap().scan_count, 5);
    }

    #[tokio::test]
    async fn recording_stamps_window_only_on_first_scan() {
        let db = Database::init("sqlite::memory:").await.unwrap();
        let gate = UsageGate::new(
            db,
            UsagePolicy {
                window: Duration::days(7),
                free_scans: 3,
            },
        );
        let first = Utc::now();
        gate.record_usage_at(Tier::Free, first).await.unwrap();
        gate.record_usage_at(Tier::Free, first + Duration::hours(2))
            .await
            .unwrap();

        let record = gate.usage().await.unwrap();
        assert_eq!(record.scan_count, 2);
        assert_eq!(
            record.last_scan.map(|ts| ts.timestamp_millis()),
            Some(first.timestamp_millis())
        );
        assert_eq!(
            gate.window_resets_at(&record).map(|ts| ts.timestamp_millis()),
            Some((first + Duration::days(7)).timestamp_millis())
        );
    }

    #[tokio::test]
    async fn count_at_the_ceiling_stays_there() {
        let (db, gate) = gate().await;
        let now = Utc::now();
        db.set(StorageKey::LastScan, &now.timestamp_millis().to_string())
            .await
            .unwrap();
        db.set(StorageKey::ScanCount, &u32::MAX.to_string())
            .await
            .unwrap();

        gate.record_usage_at(Tier::Free, now).await.unwrap();
        assert_eq!(gate.usage().await.unwrap().scan_count, u32::MAX);
        assert!(!gate.check_limit_at(Tier::Free, now).await.unwrap());
    }
}
