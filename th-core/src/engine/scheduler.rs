//! Acquisition cycle driver
//!
//! One cycle: locate sensors, reconcile the store, start one worker thread
//! per sensor, wait until every worker is done or the shared deadline
//! passes, trip the cancellation flag, join, publish the snapshot.
//!
//! A failing or panicking worker only degrades its own sensor. The only
//! cycle-level failures are an enumeration error and finding no sensors.

use std::any::Any;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::constants::timing;
use crate::data::{now_millis, AcquisitionConfig, Capability, SensorDevice, SensorId, SensorSnapshot, SensorStatus};
use crate::decode::{BinaryDecoder, LineParser};
use crate::engine::{
    BinaryReadWorker, CancelToken, CaptureSummary, Deadline, ReadSummary, SensorEvent,
    SensorStateStore, TextCaptureWorker,
};
use crate::error::{AcquisitionError, Result};
use crate::hw::{Activator, DeviceIo, DeviceLocator};
use crate::sink::ReadingSink;

/// Result of one worker
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerSummary {
    Text(CaptureSummary),
    Binary(ReadSummary),
    Panicked { sensor: SensorId, message: String },
}

impl WorkerSummary {
    pub fn sensor(&self) -> &SensorId {
        match self {
            Self::Text(summary) => &summary.sensor,
            Self::Binary(summary) => &summary.sensor,
            Self::Panicked { sensor, .. } => sensor,
        }
    }
}

/// Everything one cycle produced
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Start time in milliseconds since Unix epoch
    pub started_at: u64,
    pub elapsed: Duration,
    pub devices: Vec<SensorDevice>,
    pub summaries: Vec<WorkerSummary>,
    pub snapshot: SensorSnapshot,
}

impl CycleReport {
    /// Number of sensors currently in `status`
    pub fn count_status(&self, status: SensorStatus) -> usize {
        self.snapshot.values().filter(|s| s.status == status).count()
    }

    pub fn summary_for(&self, id: &SensorId) -> Option<&WorkerSummary> {
        self.summaries.iter().find(|s| s.sensor() == id)
    }
}

/// Drives acquisition cycles over one device backend
pub struct AcquisitionScheduler<D: DeviceIo> {
    io: D,
    config: AcquisitionConfig,
    locator: DeviceLocator,
    parser: LineParser,
    decoder: BinaryDecoder,
    activator: Activator,
    store: Arc<SensorStateStore>,
    sink: Option<Box<dyn ReadingSink + Send>>,
    cancel: CancelToken,
}

impl<D: DeviceIo> AcquisitionScheduler<D> {
    /// Build a scheduler; rejects an invalid configuration
    pub fn new(io: D, config: AcquisitionConfig) -> Result<Self> {
        config.validate()?;
        let parser = LineParser::new(&config.banner_patterns)?;
        Ok(Self {
            locator: DeviceLocator::from_config(&config),
            decoder: BinaryDecoder::new(config.candidates.clone()),
            activator: Activator::new(config.activation_key),
            parser,
            io,
            config,
            store: Arc::new(SensorStateStore::new()),
            sink: None,
            cancel: CancelToken::new(),
        })
    }

    /// Publish every cycle's snapshot to `sink`
    pub fn with_sink(mut self, sink: impl ReadingSink + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn io(&self) -> &D {
        &self.io
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Shared state store, readable while a cycle runs
    pub fn store(&self) -> Arc<SensorStateStore> {
        Arc::clone(&self.store)
    }

    /// Handle that stops the running cycle early
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run one acquisition cycle
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let started_at = now_millis();
        let start = Instant::now();
        self.cancel.reset();
        let deadline = Deadline::after(self.config.cycle_deadline);

        let devices = self.locator.locate(&self.io)?;
        self.store.begin_cycle(&devices);

        if devices.is_empty() {
            info!("No sensors attached");
            return Err(AcquisitionError::DeviceNotFound);
        }

        info!(
            sensors = devices.len(),
            deadline_ms = self.config.cycle_deadline.as_millis() as u64,
            "Starting acquisition cycle"
        );
        let summaries = self.run_workers(&devices, deadline);

        let snapshot = self.store.snapshot_all();
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.publish(&snapshot) {
                warn!("Failed to publish snapshot: {}", e);
            }
        }

        let report = CycleReport {
            started_at,
            elapsed: start.elapsed(),
            devices,
            summaries,
            snapshot,
        };
        info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            on = report.count_status(SensorStatus::On),
            error = report.count_status(SensorStatus::Error),
            off = report.count_status(SensorStatus::Off),
            "Acquisition cycle finished"
        );
        Ok(report)
    }

    fn run_workers(&self, devices: &[SensorDevice], deadline: Deadline) -> Vec<WorkerSummary> {
        let ctx = WorkerContext {
            io: &self.io,
            config: &self.config,
            parser: &self.parser,
            decoder: &self.decoder,
            store: &self.store,
            activator: self.activator,
            cancel: &self.cancel,
        };

        thread::scope(|scope| {
            let handles: Vec<_> = devices
                .iter()
                .map(|device| (device, scope.spawn(move || ctx.run(device, deadline))))
                .collect();

            while !handles.iter().all(|(_, h)| h.is_finished()) {
                if deadline.is_expired() || ctx.cancel.is_cancelled() {
                    debug!("Cycle deadline reached, stopping workers");
                    break;
                }
                thread::sleep(deadline.bounded(timing::SCHEDULER_TICK));
            }
            ctx.cancel.cancel();

            handles
                .into_iter()
                .map(|(device, handle)| match handle.join() {
                    Ok(summary) => summary,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        let err = AcquisitionError::WorkerPanicked(device.name.clone());
                        error!(sensor = %device.id, %message, "{}", err);
                        ctx.store
                            .update(&device.id, SensorEvent::Error(format!("{}: {}", err, message)));
                        WorkerSummary::Panicked {
                            sensor: device.id.clone(),
                            message,
                        }
                    }
                })
                .collect()
        })
    }
}

/// Shared, read-only view handed to every worker thread
#[derive(Clone, Copy)]
struct WorkerContext<'s> {
    io: &'s dyn DeviceIo,
    config: &'s AcquisitionConfig,
    parser: &'s LineParser,
    decoder: &'s BinaryDecoder,
    store: &'s SensorStateStore,
    activator: Activator,
    cancel: &'s CancelToken,
}

impl WorkerContext<'_> {
    fn run(&self, device: &SensorDevice, deadline: Deadline) -> WorkerSummary {
        let config = self.config;
        match device.capability {
            Capability::Text => {
                let mut worker = TextCaptureWorker::new(device, self.parser, self.store)
                    .with_poll_interval(config.read_poll_interval);
                if config.activate_text_devices {
                    worker = worker.with_activation(self.activator, config.activation_hold);
                }
                WorkerSummary::Text(worker.run(self.io, deadline, self.cancel))
            }
            Capability::Binary => WorkerSummary::Binary(
                BinaryReadWorker::new(device, self.decoder, self.store, config.report_size)
                    .with_query(config.report_query.as_deref())
                    .with_poll_interval(config.read_poll_interval)
                    .run(self.io, deadline, self.cancel),
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
