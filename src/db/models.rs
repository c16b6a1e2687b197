use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The scalar keys persisted between runs. Values are plain strings with no
/// schema versioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKey {
    Tier,
    LastScan,
    ScanCount,
    HasSeenIntro,
}

impl StorageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::Tier => "glowAI_tier",
            StorageKey::LastScan => "glowAI_last_scan_date",
            StorageKey::ScanCount => "glowAI_scan_count_week",
            StorageKey::HasSeenIntro => "glowAI_has_seen_intro",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KvRow {
    pub key: String,
    pub value: String,
}
