use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    pub searches_started: IntCounter,
    pub searches_completed: IntCounter,
    pub searches_cancelled: IntCounter,
    pub files_scanned: IntCounter,
    pub files_skipped: IntCounter,
    pub matches_found: IntCounter,
    pub files_deleted: IntCounter,
    registry: Arc<Registry>,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        Ok(Metrics {
            searches_started: counter(&registry, "searches_started", "Searches accepted")?,
            searches_completed: counter(
                &registry,
                "searches_completed",
                "Searches that ran to completion",
            )?,
            searches_cancelled: counter(
                &registry,
                "searches_cancelled",
                "Searches stopped by the client",
            )?,
            files_scanned: counter(&registry, "files_scanned", "Number of files scanned")?,
            files_skipped: counter(
                &registry,
                "files_skipped",
                "Files skipped for size or readability",
            )?,
            matches_found: counter(&registry, "matches_found", "Number of matches found")?,
            files_deleted: counter(&registry, "files_deleted", "Files deleted with backup")?,
            registry: Arc::new(registry),
        })
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            log::warn!("Failed to encode metrics: {e}");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gathers_registered_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.matches_found.inc_by(3);
        let text = metrics.gather();
        assert!(text.contains("matches_found 3"));
        assert!(text.contains("searches_started 0"));
    }
}
