//! Folding build observations into the report matrix.
//!
//! The matrix has a single owner. Concurrent producers hand their
//! observations to [`spawn_aggregator`] through a channel instead of
//! touching the matrix themselves.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::model::{BuildObservation, ReportMatrix};

/// Channel capacity between fetch tasks and the aggregator task.
const OBSERVATION_BUFFER: usize = 64;

#[derive(Debug, Default)]
pub struct ResultAggregator {
    matrix: ReportMatrix,
    observations: usize,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation: one counter bump and one occurrence per case.
    pub fn fold(&mut self, observation: BuildObservation) {
        debug!(
            lane = %observation.lane,
            build = observation.build_number,
            pr = observation.pr_number,
            cases = observation.cases.len(),
            "folding build observation"
        );
        for case in &observation.cases {
            self.matrix.cell_mut(&case.name, &observation.lane).record(
                case.outcome,
                observation.build_number,
                observation.pr_number,
                &observation.lane,
            );
        }
        self.observations += 1;
    }

    pub fn fold_all(&mut self, observations: impl IntoIterator<Item = BuildObservation>) {
        for observation in observations {
            self.fold(observation);
        }
    }

    /// Number of observations folded so far.
    pub fn observations(&self) -> usize {
        self.observations
    }

    /// Freeze the matrix. Occurrences are put in canonical order so the
    /// result does not depend on the order observations arrived in.
    pub fn finish(mut self) -> ReportMatrix {
        for cell in self.matrix.cells_mut() {
            cell.canonicalize_occurrences();
        }
        self.matrix
    }
}

/// Fold a whole batch in one call.
pub fn aggregate(observations: impl IntoIterator<Item = BuildObservation>) -> ReportMatrix {
    let mut aggregator = ResultAggregator::new();
    aggregator.fold_all(observations);
    aggregator.finish()
}

/// Sending side handed to producers.
pub type ObservationSender = mpsc::Sender<BuildObservation>;

/// Start the single consumer that owns the matrix.
///
/// The task finishes once every sender has been dropped.
pub fn spawn_aggregator() -> (ObservationSender, JoinHandle<ReportMatrix>) {
    let (tx, mut rx) = mpsc::channel::<BuildObservation>(OBSERVATION_BUFFER);
    let handle = tokio::spawn(async move {
        let mut aggregator = ResultAggregator::new();
        while let Some(observation) = rx.recv().await {
            aggregator.fold(observation);
        }
        debug!(
            observations = aggregator.observations(),
            "aggregator drained"
        );
        aggregator.finish()
    });
    (tx, handle)
}
