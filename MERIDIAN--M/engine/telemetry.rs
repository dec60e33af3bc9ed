use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tokio::runtime::{Handle, Runtime};

use crate::engine::EngineReport;

/// Builder configuring telemetry for engine runs.
pub struct EngineTelemetryBuilder {
    component: String,
    log_path: Option<PathBuf>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl EngineTelemetryBuilder {
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
    pub fn build(self) -> Result<EngineTelemetry> {
        EngineTelemetry::new(self.component, self.log_path, self.event_publisher)
    }
}

/// Telemetry handle shared by an engine and its queue.
#[derive(Clone)]
pub struct EngineTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for EngineTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineTelemetry")
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

impl EngineTelemetry {
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
    pub fn builder(component: impl Into<String>) -> EngineTelemetryBuilder {
        EngineTelemetryBuilder::new(component)
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

    /// Logs and publishes the end-of-run summary in one call. Sink
    /// failures are swallowed; a run must never fail on telemetry.
    pub fn run_completed(&self, report: &EngineReport, status: &str) {
        let payload = json!({
            "engine": report.engine,
            "run_id": report.run_id,
            "processed": report.processed,
            "succeeded": report.succeeded,
            "failed": report.failed,
            "revenue": report.revenue,
            "status": status,
        });
        let _ = self.log(LogLevel::Info, "engine.run.completed", payload.clone());
        let _ = self.event("engine.run.completed", payload);
    }
}
