use std::path::Path;

use serde::{Deserialize, Serialize};

use common::{ConfigIssue, ConfigSection, NtfyConfig, Pair, PairConfig, Result};

/// On-disk configuration file (TOML).
///
/// Example `config/monitor.toml`:
/// ```toml
/// [ntfy]
/// server = "https://ntfy.sh"
/// topic = "crypto_alerts"
///
/// [[pair]]
/// pair = "BTC/USDT"
/// upper = 70000.0
/// lower = 60000.0
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitorFile {
    pub ntfy: NtfyConfig,
    #[serde(rename = "pair", default)]
    pub pairs: Vec<PairConfig>,
}

impl MonitorFile {
    pub fn new(ntfy: NtfyConfig) -> Self {
        Self {
            ntfy,
            pairs: Vec::new(),
        }
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(toml::from_str(&content)?)
    }

    /// Rewrite the whole file. The write goes to a sibling temp file first and
    /// is renamed into place, so readers never see a half-written file.
    pub async fn write(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("toml.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    pub fn find(&self, pair: &Pair) -> Option<&PairConfig> {
        self.pairs.iter().find(|p| &p.pair == pair)
    }

    /// Full validation pass. An empty list means the file is usable.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues: Vec<ConfigIssue> = self
            .ntfy
            .issues()
            .into_iter()
            .map(|m| ConfigIssue::new(ConfigSection::Ntfy, m))
            .collect();

        for (i, entry) in self.pairs.iter().enumerate() {
            if self.pairs[..i].iter().any(|p| p.pair == entry.pair) {
                issues.push(ConfigIssue::new(
                    ConfigSection::Monitoring,
                    format!("Pair {} is listed more than once", entry.pair),
                ));
            }
            issues.extend(
                entry
                    .thresholds()
                    .issues(&entry.pair)
                    .into_iter()
                    .map(|m| ConfigIssue::new(ConfigSection::Monitoring, m)),
            );
        }
        issues
    }
}
