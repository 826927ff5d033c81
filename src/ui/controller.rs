//! Experiment controller.
//!
//! Owns the lifetime of one worker at a time and folds its events into the
//! running `ExperimentResult` that the panels display.

use crate::config::AppConfig;
use crate::error::AppError;
use crate::log_collector::LogCollector;
use crate::models::{Dataset, ExperimentResult, ImageResult, Model, Program};
use crate::system::{global_registry, ProcessRegistry};
use crate::ui::{WorkerBridge, WorkerEvent};
use crate::worker::{ClassificationWorker, RunOutcome, WorkerTimings};
use chrono::Local;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// What the front end needs to react to
#[derive(Clone, Debug, PartialEq)]
pub enum ExperimentEvent {
    /// A new image was classified; `result` already includes it
    ResultReady {
        image: ImageResult,
        result: ExperimentResult,
    },
    Error(String),
    Finished {
        outcome: RunOutcome,
        elapsed: Duration,
    },
}

pub struct ExperimentContext {
    config: AppConfig,
    result: ExperimentResult,
    bridge: Option<WorkerBridge>,
    worker: Option<JoinHandle<RunOutcome>>,
    started_at: Option<Instant>,
    log_collector: Option<Arc<LogCollector>>,
    registry: Arc<ProcessRegistry>,
    timings: WorkerTimings,
}

impl ExperimentContext {
    pub fn new(config: AppConfig) -> Self {
        ExperimentContext {
            config,
            result: ExperimentResult::default(),
            bridge: None,
            worker: None,
            started_at: None,
            log_collector: None,
            registry: global_registry(),
            timings: WorkerTimings::default(),
        }
    }

    /// Give every experiment its own log session file.
    pub fn with_log_collector(mut self, collector: Arc<LogCollector>) -> Self {
        self.log_collector = Some(collector);
        self
    }

    pub fn with_registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_timings(mut self, timings: WorkerTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn experiment_result(&self) -> &ExperimentResult {
        &self.result
    }

    pub fn is_running(&self) -> bool {
        self.bridge.is_some()
    }

    /// Start a worker for the given selection. Events must be fed back
    /// through `handle_event` in the order they are received.
    pub fn start(
        &mut self,
        program: Program,
        model: Model,
        dataset: Dataset,
        batch_size: u32,
    ) -> Result<mpsc::Receiver<WorkerEvent>, AppError> {
        if self.is_running() {
            return Err(AppError::Experiment(
                "An experiment is already running".to_string(),
            ));
        }

        if let Some(collector) = &self.log_collector {
            let name = format!("experiment_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
            if let Err(e) = collector.start_new_session(&name) {
                log::warn!("Could not start log session: {}", e);
            }
        }

        log::info!(
            "Starting experiment: program={} model={} dataset={} batch={}",
            program.uoa,
            model.uoa,
            dataset.val_uoa,
            batch_size
        );

        let worker = ClassificationWorker::new(&self.config, program, model, dataset, batch_size)
            .with_registry(Arc::clone(&self.registry))
            .with_timings(self.timings);

        let (bridge, rx) = WorkerBridge::new();
        let handle = worker.spawn(bridge.event_tx.clone(), bridge.interruption())?;

        self.result.reset();
        self.started_at = Some(Instant::now());
        self.bridge = Some(bridge);
        self.worker = Some(handle);
        Ok(rx)
    }

    /// Request a cooperative stop. The worker confirms with `Stopped`.
    pub fn stop(&self) {
        if let Some(bridge) = &self.bridge {
            log::info!("Stopping experiment");
            bridge.request_interruption();
        }
    }

    pub fn handle_event(&mut self, event: WorkerEvent) -> ExperimentEvent {
        match event {
            WorkerEvent::ImageResult(image) => {
                self.result.accumulate(&image);
                ExperimentEvent::ResultReady {
                    image,
                    result: self.result.clone(),
                }
            }
            WorkerEvent::Error { message, .. } => ExperimentEvent::Error(message),
            WorkerEvent::Stopped(outcome) => {
                self.bridge = None;
                if let Some(handle) = self.worker.take() {
                    // Stopped is the worker's last action, so this is short
                    if handle.join().is_err() {
                        log::error!("Classification worker panicked");
                    }
                }
                let elapsed = self
                    .started_at
                    .take()
                    .map(|t| t.elapsed())
                    .unwrap_or_default();
                log::info!(
                    "Experiment finished after {:.1} s: {:?}",
                    elapsed.as_secs_f64(),
                    outcome
                );
                ExperimentEvent::Finished { outcome, elapsed }
            }
        }
    }
}
