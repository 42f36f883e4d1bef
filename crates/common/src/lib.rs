pub mod config;
pub mod error;
pub mod sink;
pub mod source;
pub mod types;

pub use config::Settings;
pub use error::{ConfigIssue, ConfigSection, Error, Result};
pub use sink::AlertSink;
pub use source::TickerSource;
pub use types::*;
