use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Upstream price lookup failed. Always recoverable: the caller treats
    /// the pair as having no price this cycle.
    #[error("Price unavailable: {0}")]
    Unavailable(String),

    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Invalid configuration: {}", summarize(.0))]
    ConfigInvalid(Vec<ConfigIssue>),

    #[error("Pair not found: {0}")]
    PairNotFound(String),

    #[error("Monitoring is already running")]
    AlreadyRunning,

    #[error("Monitoring cycle failed: {0}")]
    LoopFault(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Shorthand for a single-issue validation failure.
    pub fn invalid(section: ConfigSection, message: impl Into<String>) -> Self {
        Error::ConfigInvalid(vec![ConfigIssue::new(section, message)])
    }
}

/// Which part of the configuration a validation issue belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSection {
    Ntfy,
    Monitoring,
}

/// One problem found by a validation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigIssue {
    pub section: ConfigSection,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(section: ConfigSection, message: impl Into<String>) -> Self {
        Self {
            section,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let section = match self.section {
            ConfigSection::Ntfy => "ntfy",
            ConfigSection::Monitoring => "monitoring",
        };
        write!(f, "[{section}] {}", self.message)
    }
}

fn summarize(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
