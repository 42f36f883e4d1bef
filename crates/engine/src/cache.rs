use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// How long a fetched price may be served without re-asking the exchange.
pub const PRICE_TTL: Duration = Duration::from_secs(2);

/// Short-lived price store keyed by spot instrument id.
///
/// Entries expire on read once older than the TTL; nothing sweeps them.
/// The fetcher clears the whole cache when the market mode flips because
/// spot and derivative prices are not interchangeable.
#[derive(Debug)]
pub struct PriceCache {
    ttl: Duration,
    entries: HashMap<String, (f64, Instant)>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, inst_id: &str) -> Option<f64> {
        self.entries
            .get(inst_id)
            .filter(|(_, fetched_at)| fetched_at.elapsed() < self.ttl)
            .map(|(price, _)| *price)
    }

    pub fn put(&mut self, inst_id: impl Into<String>, price: f64) {
        self.entries.insert(inst_id.into(), (price, Instant::now()));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new(PRICE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl_then_expire() {
        let mut cache = PriceCache::default();
        cache.put("BTC-USDT", 50_000.0);
        assert_eq!(cache.get("BTC-USDT"), Some(50_000.0));

        tokio::time::advance(Duration::from_millis(1_999)).await;
        assert_eq!(cache.get("BTC-USDT"), Some(50_000.0));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("BTC-USDT"), None);
        // Expired entries are not swept, only ignored
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn put_refreshes_timestamp() {
        let mut cache = PriceCache::default();
        cache.put("ETH-USDT", 3_000.0);
        tokio::time::advance(Duration::from_millis(1_500)).await;
        cache.put("ETH-USDT", 3_001.0);
        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(cache.get("ETH-USDT"), Some(3_001.0));
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = PriceCache::default();
        cache.put("BTC-USDT", 1.0);
        cache.put("ETH-USDT", 2.0);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("BTC-USDT"), None);
    }
}
