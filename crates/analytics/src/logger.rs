//! Asynchronous delivery-event logger that batches events and writes them as
//! JSON lines. Uses a channel-based architecture for non-blocking submission
//! from the serving path.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use dco_core::config::AnalyticsConfig;
use dco_core::event_bus::EventSink;
use dco_core::types::DeliveryEvent;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Analytics logger with background batch writer.
pub struct AnalyticsLogger {
    sender: mpsc::Sender<DeliveryEvent>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl AnalyticsLogger {
    /// Create a new analytics logger and spawn the background writer.
    /// Must be called inside a tokio runtime.
    pub async fn new(config: &AnalyticsConfig, node_id: String) -> anyhow::Result<Self> {
        let (sender, receiver) = mpsc::channel::<DeliveryEvent>(config.channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let output = match &config.output_path {
            Some(path) => Some(BatchWriter::prepare_output(PathBuf::from(path)).await?),
            None => None,
        };
        let writer = BatchWriter { node_id, output };
        let batch_size = config.batch_size.max(1);
        let flush_interval = Duration::from_millis(config.flush_interval_ms.max(1));

        // Spawn background batch writer
        let handle = tokio::spawn(async move {
            writer.run(receiver, shutdown_rx, batch_size, flush_interval).await;
        });

        match &config.output_path {
            Some(path) => info!(path = %path, "Analytics logger initialized with JSONL file output"),
            None => info!("Analytics logger initialized with log output"),
        }

        Ok(Self {
            sender,
            shutdown: Mutex::new(Some(shutdown_tx)),
            writer: Mutex::new(Some(handle)),
        })
    }

    /// Flush everything still queued and stop the writer. Events emitted
    /// afterwards are dropped.
    pub async fn shutdown(&self) {
        let signal = self.shutdown.lock().ok().and_then(|mut s| s.take());
        if let Some(signal) = signal {
            let _ = signal.send(());
        }
        let handle = self.writer.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Analytics writer task failed");
            }
        }
    }
}

impl EventSink for AnalyticsLogger {
    fn emit(&self, event: DeliveryEvent) {
        if let Err(e) = self.sender.try_send(event) {
            metrics::counter!("analytics.dropped").increment(1);
            warn!("Analytics event dropped: {}", e);
        } else {
            metrics::counter!("analytics.queued").increment(1);
        }
    }
}

#[derive(Serialize)]
struct LogLine<'a> {
    node_id: &'a str,
    #[serde(flatten)]
    event: &'a DeliveryEvent,
}

/// Background writer that batches events and appends them as JSON lines.
struct BatchWriter {
    node_id: String,
    output: Option<PathBuf>,
}

impl BatchWriter {
    async fn prepare_output(path: PathBuf) -> anyhow::Result<PathBuf> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Fail at startup rather than on the first flush.
        OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(path)
    }

    async fn run(
        self,
        mut receiver: mpsc::Receiver<DeliveryEvent>,
        mut shutdown: oneshot::Receiver<()>,
        batch_size: usize,
        flush_interval: Duration,
    ) {
        let mut buffer: Vec<DeliveryEvent> = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(flush_interval);

        loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Some(event) => {
                        buffer.push(event);
                        if buffer.len() >= batch_size {
                            self.flush(&mut buffer).await;
                        }
                    }
                    None => break,
                },
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
                _ = &mut shutdown => {
                    receiver.close();
                    while let Some(event) = receiver.recv().await {
                        buffer.push(event);
                    }
                    break;
                }
            }
        }

        if !buffer.is_empty() {
            self.flush(&mut buffer).await;
        }
        debug!("Analytics writer stopped");
    }

    async fn flush(&self, buffer: &mut Vec<DeliveryEvent>) {
        let count = buffer.len();
        debug!(count = count, "Flushing analytics batch");

        let mut lines = String::new();
        for event in buffer.iter() {
            let line = LogLine {
                node_id: &self.node_id,
                event,
            };
            match serde_json::to_string(&line) {
                Ok(json) => {
                    lines.push_str(&json);
                    lines.push('\n');
                }
                Err(e) => warn!(error = %e, "Skipping unserializable analytics event"),
            }
        }
        buffer.clear();

        if lines.is_empty() {
            return;
        }

        let Some(path) = &self.output else {
            for line in lines.lines() {
                info!(target: "dco_analytics::events", event = %line, "delivery event");
            }
            metrics::counter!("analytics.flushed").increment(count as u64);
            return;
        };

        match Self::append(path, lines.as_bytes()).await {
            Ok(()) => {
                metrics::counter!("analytics.flushed").increment(count as u64);
                debug!(count = count, "Analytics batch flushed successfully");
            }
            Err(e) => {
                metrics::counter!("analytics.flush_errors").increment(1);
                error!(error = %e, count = count, "Failed to flush analytics batch");
            }
        }
    }

    async fn append(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(bytes).await?;
        file.flush().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dco_core::signals::SignalContext;
    use dco_core::types::{ClickRecord, SelectionRecord};
    use uuid::Uuid;

    fn impression(campaign_id: Uuid) -> DeliveryEvent {
        DeliveryEvent::Impression(SelectionRecord {
            event_id: Uuid::new_v4(),
            campaign_id,
            variant_id: Uuid::new_v4(),
            matched_rule_id: None,
            timestamp: Utc::now(),
            signals: SignalContext::new().with("daypart", "morning"),
        })
    }

    fn config(output: Option<String>) -> AnalyticsConfig {
        AnalyticsConfig {
            channel_capacity: 16,
            batch_size: 2,
            flush_interval_ms: 60_000,
            output_path: output,
        }
    }

    #[tokio::test]
    async fn test_writes_json_lines_and_flushes_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events").join("delivery.jsonl");
        let logger = AnalyticsLogger::new(&config(Some(path.display().to_string())), "node-07".into())
            .await
            .unwrap();

        let campaign = Uuid::new_v4();
        logger.emit(impression(campaign));
        logger.emit(impression(campaign));
        logger.emit(DeliveryEvent::Click(ClickRecord {
            event_id: Uuid::new_v4(),
            campaign_id: campaign,
            variant_id: Uuid::new_v4(),
            url: Some("https://shop.example".into()),
            timestamp: Utc::now(),
        }));
        logger.shutdown().await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["event_type"], "impression");
        assert_eq!(lines[0]["node_id"], "node-07");
        assert_eq!(lines[0]["signals"]["daypart"], "morning");
        assert_eq!(lines[2]["event_type"], "click");
        assert_eq!(lines[2]["campaign_id"], campaign.to_string());
    }

    #[tokio::test]
    async fn test_emit_after_shutdown_is_dropped() {
        let logger = AnalyticsLogger::new(&config(None), "node-01".into()).await.unwrap();
        logger.shutdown().await;
        // Should not panic
        logger.emit(impression(Uuid::new_v4()));
        logger.shutdown().await;
    }
}
