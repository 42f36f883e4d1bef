pub mod cache;
pub mod fetcher;
pub mod lifecycle;
pub mod no_derivative;
pub mod okx;

pub use cache::PriceCache;
pub use fetcher::PriceFetcher;
pub use lifecycle::{Monitor, MonitorConfig};
pub use no_derivative::NoDerivativeSet;
pub use okx::OkxClient;
