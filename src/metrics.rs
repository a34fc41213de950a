//! Prometheus exposition of cache statistics.
//!
//! Statistics reset on `clear()`, so they are exported as gauges refreshed
//! from a [`StatsSnapshot`] at scrape time rather than as counters.

use prometheus::{Encoder, Gauge, IntGauge, Opts, Registry, TextEncoder};

use crate::cache::StatsSnapshot;

pub struct CacheMetrics {
    registry: Registry,
    hits: IntGauge,
    misses: IntGauge,
    evictions: IntGauge,
    writes: IntGauge,
    entries: IntGauge,
    memory_bytes: IntGauge,
    hit_rate: Gauge,
}

impl CacheMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("tiered_cache".to_string()), None)?;

        let int_gauge = |name: &str, help: &str| -> Result<IntGauge, prometheus::Error> {
            let gauge = IntGauge::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        let hits = int_gauge("hits", "Reads served from the cache")?;
        let misses = int_gauge("misses", "Reads that found nothing usable")?;
        let evictions = int_gauge("evictions", "Entries removed by capacity pressure or expiry")?;
        let writes = int_gauge("writes", "Successful writes")?;
        let entries = int_gauge("entries", "Live entries in the memory tier")?;
        let memory_bytes = int_gauge("memory_bytes", "Estimated bytes held by live entries")?;

        let hit_rate = Gauge::with_opts(Opts::new("hit_rate", "hits / (hits + misses)"))?;
        registry.register(Box::new(hit_rate.clone()))?;

        Ok(Self {
            registry,
            hits,
            misses,
            evictions,
            writes,
            entries,
            memory_bytes,
            hit_rate,
        })
    }

    pub fn observe(&self, stats: &StatsSnapshot) {
        self.hits.set(stats.hits as i64);
        self.misses.set(stats.misses as i64);
        self.evictions.set(stats.evictions as i64);
        self.writes.set(stats.writes as i64);
        self.entries.set(stats.entry_count as i64);
        self.memory_bytes.set(stats.approx_memory_bytes as i64);
        self.hit_rate.set(stats.hit_rate);
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
