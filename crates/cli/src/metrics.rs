//! Prometheus exposition for a finished run.

use once_cell::sync::Lazy;
use prometheus::{Encoder, Registry, TextEncoder};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for collector in mortem_core::metrics::all_metrics() {
        registry.register(collector).unwrap();
    }
    registry
});

/// Encode all metrics in Prometheus text format.
pub fn encode_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_core_metrics() {
        mortem_core::metrics::DECISIONS
            .with_label_values(&["matched"])
            .inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("mortem_decisions_total"));
    }
}
