pub mod config_store;
pub mod file;

pub use config_store::ConfigStore;
pub use file::MonitorFile;
