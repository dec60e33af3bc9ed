use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tokio::runtime::{Handle, Runtime};

/// Builder configuring telemetry for mission control.
pub struct MissionTelemetryBuilder {
    component: String,
    log_path: Option<PathBuf>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl MissionTelemetryBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            log_path: None,
            event_publisher: None,
        }
    }

    /// Sets the JSON log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Assigns the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Finalizes the builder.
    pub fn build(self) -> Result<MissionTelemetry> {
        MissionTelemetry::new(self.component, self.log_path, self.event_publisher)
    }
}

/// Telemetry handle shared by mission control and its reports.
#[derive(Clone)]
pub struct MissionTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for MissionTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MissionTelemetry")
            .field("component", &self.inner.component)
            .finish()
    }
}

struct TelemetryInner {
    component: String,
    logger: Option<JsonLogger>,
    event: Option<EventHandle>,
}

struct EventHandle {
    publisher: Arc<dyn EventPublisher>,
    // Built on the first publish outside a runtime; stays empty in
    // pure-async use so there is nothing to tear down on drop.
    fallback: Mutex<Option<Runtime>>,
}

impl EventHandle {
    fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            publisher,
            fallback: Mutex::new(None),
        }
    }

    fn publish(&self, record: EventRecord) -> Result<()> {
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(&self.publisher);
            handle.spawn(async move {
                if let Err(err) = publisher.publish(record).await {
                    eprintln!("telemetry event publish failed: {err:?}");
                }
            });
            return Ok(());
        }
        let mut slot = self.fallback.lock();
        if slot.is_none() {
            *slot = Some(Runtime::new()?);
        }
        slot.as_ref().map_or(Ok(()), |runtime| {
            runtime.block_on(self.publisher.publish(record))
        })
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        // An owned runtime must not be dropped from async context.
        if let Some(runtime) = self.fallback.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

impl MissionTelemetry {
    fn new(
        component: impl Into<String>,
        log_path: Option<PathBuf>,
        event_publisher: Option<Arc<dyn EventPublisher>>,
    ) -> Result<Self> {
        let logger = if let Some(path) = log_path {
            Some(JsonLogger::new(path)?)
        } else {
            None
        };
        let event = event_publisher.map(EventHandle::new);
        Ok(Self {
            inner: Arc::new(TelemetryInner {
                component: component.into(),
                logger,
                event,
            }),
        })
    }

    /// Returns a builder for this telemetry helper.
    #[must_use]
    pub fn builder(component: impl Into<String>) -> MissionTelemetryBuilder {
        MissionTelemetryBuilder::new(component)
    }

    /// Logs a structured record.
    pub fn log(&self, level: LogLevel, message: &str, fields: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let mut record = LogRecord::new(&self.inner.component, level, message);
            if let Some(obj) = fields.as_object() {
                record.fields = obj.clone();
            }
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Emits an event entry via the configured publisher.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.inner.event {
            let record =
                EventRecord::new(&self.inner.component, event_type).with_payload(payload);
            handle.publish(record)?;
        }
        Ok(())
    }

    /// Writes one record to the JSONL log and the event stream together.
    /// Sink failures are swallowed; the control plane must never fail on
    /// telemetry.
    pub fn emit(&self, level: LogLevel, event_type: &str, payload: Value) {
        let _ = self.log(level, event_type, payload.clone());
        let _ = self.event(event_type, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;

    #[test]
    fn telemetry_logs_and_emits() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("mission.log");
        let publisher = Arc::new(MemoryEventBus::new(8));
        let telemetry = MissionTelemetry::builder("mission-control")
            .log_path(&log_path)
            .event_publisher(publisher.clone())
            .build()
            .unwrap();
        telemetry
            .log(
                LogLevel::Info,
                "mission.created",
                json!({ "title": "Q3 revenue push" }),
            )
            .unwrap();
        telemetry
            .event("mission.created", json!({ "title": "Q3 revenue push" }))
            .unwrap();
        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("mission.created"));
        assert_eq!(publisher.snapshot().len(), 1);
    }

    #[test]
    fn emit_hits_both_sinks() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("mission.log");
        let publisher = Arc::new(MemoryEventBus::new(8));
        let telemetry = MissionTelemetry::builder("mission-control")
            .log_path(&log_path)
            .event_publisher(publisher.clone())
            .build()
            .unwrap();
        telemetry.emit(
            LogLevel::Warn,
            "control.escalation.raised",
            json!({ "area": "revenue" }),
        );
        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("control.escalation.raised"));
        assert_eq!(publisher.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn telemetry_drops_cleanly_inside_a_runtime() {
        let publisher = Arc::new(MemoryEventBus::new(8));
        let telemetry = MissionTelemetry::builder("mission-control")
            .event_publisher(publisher.clone())
            .build()
            .unwrap();
        telemetry
            .event("mission.created", json!({ "title": "Q3 revenue push" }))
            .unwrap();
        tokio::task::yield_now().await;
        assert_eq!(publisher.snapshot().len(), 1);
        drop(telemetry);
    }
}
