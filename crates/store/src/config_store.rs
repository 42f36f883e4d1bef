use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{info, warn};

use common::{
    ConfigIssue, ConfigSection, Error, NtfyConfig, Pair, PairConfig, Result, Thresholds,
};

use crate::MonitorFile;

/// Owns the monitored pairs, their thresholds and the notification endpoint.
///
/// Every mutator is a load-validate-save unit held under the write lock: the
/// change is applied to a copy, the copy is written to disk, and only then
/// does it replace the in-memory state. A rejected or failed mutation leaves
/// both memory and file untouched.
pub struct ConfigStore {
    path: PathBuf,
    state: RwLock<MonitorFile>,
}

impl ConfigStore {
    /// Load the file at `path`, creating it with `default_ntfy` and no pairs
    /// when it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>, default_ntfy: NtfyConfig) -> Result<Self> {
        let path = path.into();
        let file = if tokio::fs::try_exists(&path).await? {
            let file = MonitorFile::read(&path).await?;
            info!(path = %path.display(), pairs = file.pairs.len(), "Configuration loaded");
            for issue in file.validate() {
                warn!(%issue, "Configuration issue");
            }
            file
        } else {
            let file = MonitorFile::new(default_ntfy);
            file.write(&path).await?;
            info!(path = %path.display(), "Created new configuration file");
            file
        };

        Ok(Self {
            path,
            state: RwLock::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the configured pairs, in insertion order. The monitor takes
    /// one of these per cycle so edits land on the next cycle.
    pub async fn pairs(&self) -> Vec<PairConfig> {
        self.state.read().await.pairs.clone()
    }

    pub async fn thresholds(&self, pair: &Pair) -> Option<Thresholds> {
        self.state.read().await.find(pair).map(PairConfig::thresholds)
    }

    pub async fn ntfy(&self) -> NtfyConfig {
        self.state.read().await.ntfy.clone()
    }

    pub async fn validate(&self) -> Vec<ConfigIssue> {
        self.state.read().await.validate()
    }

    /// Add a pair, or replace the thresholds of one already present.
    pub async fn add_pair(&self, pair: Pair, thresholds: Thresholds) -> Result<()> {
        check_thresholds(&pair, &thresholds)?;
        self.mutate(|file| {
            match file.pairs.iter_mut().find(|p| p.pair == pair) {
                Some(existing) => *existing = PairConfig::new(pair.clone(), thresholds),
                None => file.pairs.push(PairConfig::new(pair.clone(), thresholds)),
            }
            Ok(())
        })
        .await?;
        info!(pair = %pair, upper = thresholds.upper, lower = thresholds.lower, "Monitoring pair added");
        Ok(())
    }

    /// Replace the thresholds of an existing pair.
    pub async fn update_pair(&self, pair: &Pair, thresholds: Thresholds) -> Result<()> {
        check_thresholds(pair, &thresholds)?;
        self.mutate(|file| {
            let entry = file
                .pairs
                .iter_mut()
                .find(|p| &p.pair == pair)
                .ok_or_else(|| Error::PairNotFound(pair.to_string()))?;
            *entry = PairConfig::new(pair.clone(), thresholds);
            Ok(())
        })
        .await?;
        info!(pair = %pair, upper = thresholds.upper, lower = thresholds.lower, "Monitoring pair updated");
        Ok(())
    }

    /// Remove a pair. Fails with `PairNotFound` when it is not configured.
    pub async fn delete_pair(&self, pair: &Pair) -> Result<()> {
        self.mutate(|file| {
            let before = file.pairs.len();
            file.pairs.retain(|p| &p.pair != pair);
            if file.pairs.len() == before {
                return Err(Error::PairNotFound(pair.to_string()));
            }
            Ok(())
        })
        .await?;
        info!(pair = %pair, "Monitoring pair deleted");
        Ok(())
    }

    pub async fn set_ntfy(&self, ntfy: NtfyConfig) -> Result<()> {
        let issues: Vec<ConfigIssue> = ntfy
            .issues()
            .into_iter()
            .map(|m| ConfigIssue::new(ConfigSection::Ntfy, m))
            .collect();
        if !issues.is_empty() {
            return Err(Error::ConfigInvalid(issues));
        }
        let url = ntfy.url();
        self.mutate(|file| {
            file.ntfy = ntfy;
            Ok(())
        })
        .await?;
        info!(%url, "NTFY endpoint updated");
        Ok(())
    }

    async fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut MonitorFile) -> Result<()>,
    {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        f(&mut next)?;
        next.write(&self.path).await?;
        *state = next;
        Ok(())
    }
}

fn check_thresholds(pair: &Pair, thresholds: &Thresholds) -> Result<()> {
    let issues: Vec<ConfigIssue> = thresholds
        .issues(pair)
        .into_iter()
        .map(|m| ConfigIssue::new(ConfigSection::Monitoring, m))
        .collect();
    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::ConfigInvalid(issues))
    }
}
