//! Front-end side of the worker: result delivery, experiment control and
//! the text panels.

pub mod controller;
pub mod results_panel;
pub mod threading;

use crate::error::{WorkerError, WorkerErrorKind};
use crate::models::ImageResult;
use crate::worker::RunOutcome;
use tokio::sync::mpsc;

pub use controller::{ExperimentContext, ExperimentEvent};
pub use results_panel::ResultsPanel;
pub use threading::WorkerBridge;

/// Discrete events emitted from the classification worker
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerEvent {
    ImageResult(ImageResult),
    Error {
        kind: WorkerErrorKind,
        message: String,
    },
    Stopped(RunOutcome),
}

/// Receiver of everything a worker produces.
///
/// Records arrive in file order and are never empty. `stopped` is called
/// exactly once, last.
pub trait ResultSink {
    fn image_result(&mut self, result: ImageResult);

    fn error(&mut self, error: WorkerError);

    fn stopped(&mut self, _outcome: RunOutcome) {}
}

/// Collects events in memory.
impl ResultSink for Vec<WorkerEvent> {
    fn image_result(&mut self, result: ImageResult) {
        self.push(WorkerEvent::ImageResult(result));
    }

    fn error(&mut self, error: WorkerError) {
        self.push(WorkerEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    fn stopped(&mut self, outcome: RunOutcome) {
        self.push(WorkerEvent::Stopped(outcome));
    }
}

/// Hands events to an async consumer. Must be used from a plain thread,
/// never from inside the runtime.
impl ResultSink for mpsc::Sender<WorkerEvent> {
    fn image_result(&mut self, result: ImageResult) {
        if self.blocking_send(WorkerEvent::ImageResult(result)).is_err() {
            log::debug!("Result receiver dropped, discarding image result");
        }
    }

    fn error(&mut self, error: WorkerError) {
        let event = WorkerEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        };
        if self.blocking_send(event).is_err() {
            log::debug!("Result receiver dropped, discarding error");
        }
    }

    fn stopped(&mut self, outcome: RunOutcome) {
        let _ = self.blocking_send(WorkerEvent::Stopped(outcome));
    }
}
