use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use common::Result;

/// Coins assumed to have no perpetual market when no file exists yet.
pub const DEFAULT_COINS: &[&str] = &[
    "XCH", "ETHW", "DOT", "ADA", "LINK", "UNI", "ATOM", "LTC", "BCH", "XRP", "DOGE", "SHIB",
    "MATIC", "AVAX", "SOL", "TRX", "ETC", "FIL", "NEAR",
];

#[derive(Debug, Serialize, Deserialize)]
struct CoinFile {
    coins: Vec<String>,
    last_updated: DateTime<Utc>,
}

/// Coins known to lack a derivative market, persisted as JSON and grown
/// write-through whenever a derivative lookup fails.
pub struct NoDerivativeSet {
    path: Option<PathBuf>,
    coins: RwLock<BTreeSet<String>>,
}

impl NoDerivativeSet {
    /// Load the set from `path`. A missing file is seeded with
    /// [`DEFAULT_COINS`] and written out. An unreadable file is logged and
    /// the set starts empty; the next insert rewrites it.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let coins = if tokio::fs::try_exists(&path).await? {
            match read_file(&path).await {
                Ok(coins) => {
                    info!(count = coins.len(), "Loaded coins without derivative market");
                    coins
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable no-derivative list, starting empty");
                    BTreeSet::new()
                }
            }
        } else {
            let coins: BTreeSet<String> = DEFAULT_COINS.iter().map(|c| c.to_string()).collect();
            write_file(&path, &coins).await?;
            info!(count = coins.len(), "Seeded coins without derivative market");
            coins
        };

        Ok(Self {
            path: Some(path),
            coins: RwLock::new(coins),
        })
    }

    /// Unpersisted set, starting empty.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            coins: RwLock::new(BTreeSet::new()),
        }
    }

    pub async fn contains(&self, coin: &str) -> bool {
        self.coins.read().await.contains(&coin.to_uppercase())
    }

    /// Record a coin. Returns `false` if it was already present. A failed
    /// write is logged and the coin stays recorded in memory.
    pub async fn insert(&self, coin: &str) -> bool {
        let mut coins = self.coins.write().await;
        if !coins.insert(coin.to_uppercase()) {
            return false;
        }
        info!(%coin, "Coin added to no-derivative list");
        if let Some(path) = &self.path {
            if let Err(e) = write_file(path, &coins).await {
                warn!(path = %path.display(), error = %e, "Failed to persist no-derivative list");
            }
        }
        true
    }

    /// Sorted coin symbols.
    pub async fn list(&self) -> Vec<String> {
        self.coins.read().await.iter().cloned().collect()
    }
}

async fn read_file(path: &Path) -> Result<BTreeSet<String>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let file: CoinFile = serde_json::from_str(&raw)?;
    Ok(file.coins.iter().map(|c| c.to_uppercase()).collect())
}

async fn write_file(path: &Path, coins: &BTreeSet<String>) -> Result<()> {
    let file = CoinFile {
        coins: coins.iter().cloned().collect(),
        last_updated: Utc::now(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_seeded_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_derivative_coins.json");
        let set = NoDerivativeSet::load(&path).await.unwrap();
        assert!(set.contains("sol").await);
        assert_eq!(set.list().await.len(), DEFAULT_COINS.len());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn insert_is_write_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.json");
        tokio::fs::write(
            &path,
            r#"{"coins":["xch"],"last_updated":"2024-01-01T00:00:00Z"}"#,
        )
        .await
        .unwrap();

        let set = NoDerivativeSet::load(&path).await.unwrap();
        assert_eq!(set.list().await, vec!["XCH".to_string()]);
        assert!(set.insert("pepe").await);
        assert!(!set.insert("PEPE").await);

        let reloaded = NoDerivativeSet::load(&path).await.unwrap();
        assert_eq!(reloaded.list().await, vec!["PEPE".to_string(), "XCH".to_string()]);
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty_and_is_rewritten_on_insert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let set = NoDerivativeSet::load(&path).await.unwrap();
        assert!(set.list().await.is_empty());

        assert!(set.insert("ETHW").await);
        let reloaded = NoDerivativeSet::load(&path).await.unwrap();
        assert_eq!(reloaded.list().await, vec!["ETHW".to_string()]);
    }

    #[tokio::test]
    async fn in_memory_set_starts_empty() {
        let set = NoDerivativeSet::in_memory();
        assert!(set.list().await.is_empty());
        assert!(set.insert("BTC").await);
        assert!(set.contains("btc").await);
    }
}
