use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use crate::db::{Database, StorageKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tier {
    #[default]
    Free,
    Premium,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "FREE",
            Tier::Premium => "PREMIUM",
        }
    }

    pub fn is_premium(self) -> bool {
        matches!(self, Tier::Premium)
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Free => "Free Tier",
            Tier::Premium => "Premium Member",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(Tier::Free),
            "PREMIUM" => Ok(Tier::Premium),
            other => Err(anyhow!("Unknown tier '{other}'")),
        }
    }
}

#[derive(Clone)]
pub struct TierStore {
    db: Database,
}

impl TierStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn load(&self) -> Result<Tier> {
        let Some(raw) = self.db.get(StorageKey::Tier).await? else {
            return Ok(Tier::Free);
        };
        match raw.parse::<Tier>() {
            Ok(tier) => Ok(tier),
            Err(err) => {
                warn!("Ignoring stored tier value: {err}");
                Ok(Tier::Free)
            }
        }
    }

    pub async fn save(&self, tier: Tier) -> Result<()> {
        self.db.set(StorageKey::Tier, tier.as_str()).await?;
        info!("Tier set to {}", tier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_tier_values() {
        assert_eq!("PREMIUM".parse::<Tier>().unwrap(), Tier::Premium);
        assert_eq!(" free ".parse::<Tier>().unwrap(), Tier::Free);
        assert!("GOLD".parse::<Tier>().is_err());
    }

    #[tokio::test]
    async fn defaults_to_free_and_persists_upgrade() {
        let db = Database::init("sqlite::memory:").await.unwrap();
        let store = TierStore::new(db.clone());
        assert_eq!(store.load().await.unwrap(), Tier::Free);

        store.save(Tier::Premium).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Tier::Premium);
        assert_eq!(
            db.get(StorageKey::Tier).await.unwrap().as_deref(),
            Some("PREMIUM")
        );
    }

    #[tokio::test]
    async fn garbage_tier_value_reads_as_free() {
        let db = Database::init("sqlite::memory:").await.unwrap();
        db.set(StorageKey::Tier, "platinum").await.unwrap();
        assert_eq!(TierStore::new(db).load().await.unwrap(), Tier::Free);
    }
}
