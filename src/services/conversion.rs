use super::codec::Codec;
use crate::metrics::Metrics;
use crate::models::{ConversionSettings, ConvertedImage, RecordId, Transition};
use crate::state::StateManager;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// How a conversion task ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Result committed; record is `Converted`
    Converted,
    /// Failure committed; record is `Failed`
    Failed,
    /// A newer `start` superseded this task; its result was discarded
    Superseded,
    /// The record was removed while the task ran
    Removed,
}

/// Handle to one in-flight conversion, tagged with the generation it belongs to.
///
/// Dropping the handle does not cancel the conversion.
#[derive(Debug)]
pub struct ConversionTask {
    pub id: RecordId,
    pub generation: u64,
    handle: JoinHandle<ConversionOutcome>,
}

impl ConversionTask {
    /// Wait for the task to finish
    pub async fn join(self) -> ConversionOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Conversion task for {} aborted: {}", self.id, e);
                ConversionOutcome::Failed
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Runs conversions of single records and writes results back into the store.
///
/// Each `start` bumps the record's generation and captures the profile by
/// value. Codec work runs on tokio's blocking pool. There is no
/// cancellation: a superseded task runs to completion and its result is
/// dropped by the generation check in [`StateManager`].
#[derive(Clone)]
pub struct ConversionRunner {
    state: StateManager,
    codec: Arc<dyn Codec>,
    metrics: Arc<Metrics>,
    runtime: Handle,
}

impl ConversionRunner {
    pub fn new(
        state: StateManager,
        codec: Arc<dyn Codec>,
        metrics: Arc<Metrics>,
        runtime: Handle,
    ) -> Self {
        Self {
            state,
            codec,
            metrics,
            runtime,
        }
    }

    /// Start (or restart) conversion of `id` under `profile`.
    ///
    /// Returns `None` if the record does not exist.
    pub fn start(&self, id: RecordId, profile: ConversionSettings) -> Option<ConversionTask> {
        let ticket = self.state.begin_conversion(id)?;
        let generation = ticket.generation;
        self.metrics.record_conversion_started();

        tracing::debug!(
            "Starting conversion of {} ({}) generation {} as {} q{}",
            ticket.original_name,
            id,
            generation,
            profile.format,
            profile.quality
        );

        let state = self.state.clone();
        let codec = Arc::clone(&self.codec);
        let metrics = Arc::clone(&self.metrics);

        let handle = self.runtime.spawn(async move {
            let started = Instant::now();
            let progress_state = state.clone();
            let bytes = ticket.original_bytes;

            let result = tokio::task::spawn_blocking(move || {
                let sink = move |value: u8| {
                    progress_state.apply_progress(id, generation, value);
                };
                codec.convert(&bytes, &profile, &sink)
            })
            .await;

            let outcome = match result {
                Ok(Ok(output)) => {
                    let output = ConvertedImage {
                        format: profile.format,
                        bytes: Arc::from(output),
                    };
                    settle(
                        state.complete_conversion(id, generation, output),
                        ConversionOutcome::Converted,
                    )
                }
                Ok(Err(e)) => settle(
                    state.fail_conversion(id, generation, e.to_string()),
                    ConversionOutcome::Failed,
                ),
                Err(e) => settle(
                    state.fail_conversion(id, generation, format!("Codec worker failed: {}", e)),
                    ConversionOutcome::Failed,
                ),
            };

            match outcome {
                ConversionOutcome::Converted => metrics.record_conversion_completed(started.elapsed()),
                ConversionOutcome::Failed => metrics.record_conversion_failed(),
                ConversionOutcome::Superseded => {
                    metrics.record_stale_result();
                    tracing::debug!("Discarded stale result for {} generation {}", id, generation);
                }
                ConversionOutcome::Removed => {
                    tracing::debug!("Record {} removed before its conversion finished", id);
                }
            }

            outcome
        });

        Some(ConversionTask {
            id,
            generation,
            handle,
        })
    }

    /// Start conversion for several records with the same profile
    pub fn start_all(&self, ids: &[RecordId], profile: ConversionSettings) -> Vec<ConversionTask> {
        ids.iter()
            .filter_map(|id| self.start(*id, profile))
            .collect()
    }
}

/// Map the store's answer to a commit onto the task outcome
fn settle(committed: Option<Transition>, applied: ConversionOutcome) -> ConversionOutcome {
    match committed {
        None => ConversionOutcome::Removed,
        Some(Transition::Applied) => applied,
        Some(Transition::Stale | Transition::Ignored) => ConversionOutcome::Superseded,
    }
}
