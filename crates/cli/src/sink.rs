//! JSON-lines decision output.

use std::io::Write;

use async_trait::async_trait;
use tokio::sync::Mutex;

use mortem_core::{DecisionSink, EnrichmentDecision};

/// Writes one JSON object per decision, flushing after each line.
pub struct JsonLinesSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

#[async_trait]
impl DecisionSink for JsonLinesSink {
    async fn write(&self, decision: &EnrichmentDecision) -> anyhow::Result<()> {
        let line = serde_json::to_string(decision)?;
        let mut out = self.out.lock().await;
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }
}
