// Batch Controller - Coordinates the store, conversion runner, and exporter
//
// This module contains the BatchController which coordinates between:
// - StateManager (image collection store)
// - ConversionRunner (per-record conversion tasks)
// - ExportCoordinator (bulk zip export)
//
// It handles:
// - Adding images and starting their conversion
// - Propagating settings changes to every record
// - Running exports off the async workers
// - Relaying user-facing notifications to the log

use crate::metrics::Metrics;
use crate::models::{RecordId, SettingsError, SettingsPatch};
use crate::services::codec::Codec;
use crate::services::conversion::{ConversionRunner, ConversionTask};
use crate::services::export::{ArchiveBlob, Download, ExportCoordinator, ExportError, SaveSink};
use crate::services::intake::SourceImage;
use crate::state::{StateChange, StateManager};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Entry point for driving a conversion batch
///
/// Every caller-facing operation goes through here. The controller owns no
/// record state of its own; it sequences calls into the store and services.
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let controller = BatchController::new(
///     StateManager::new(),
///     Arc::new(ImageCodec::new()),
///     Arc::new(ExportCoordinator::default()),
///     runtime.handle().clone(),
/// );
///
/// controller.add_images(sources);
/// controller.wait_until_idle().await;
/// let blob = controller.export_all().await?;
/// ```
#[derive(Clone)]
pub struct BatchController {
    state: StateManager,
    runner: ConversionRunner,
    exporter: Arc<ExportCoordinator>,
    metrics: Arc<Metrics>,
}

impl BatchController {
    /// Create a new controller
    ///
    /// # Arguments
    /// * `state` - Shared image collection store
    /// * `codec` - Codec used for every conversion
    /// * `exporter` - Archive builder (name and compression)
    /// * `runtime` - Handle to the tokio runtime conversion tasks are spawned on
    pub fn new(
        state: StateManager,
        codec: Arc<dyn Codec>,
        exporter: Arc<ExportCoordinator>,
        runtime: Handle,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let runner = ConversionRunner::new(state.clone(), codec, Arc::clone(&metrics), runtime);
        Self {
            state,
            runner,
            exporter,
            metrics,
        }
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Add images and immediately start converting each with the current settings.
    ///
    /// Returns one task per new record, in the order given.
    pub fn add_images(&self, files: Vec<SourceImage>) -> Vec<ConversionTask> {
        let ids = self.state.add_images(files);
        let profile = self.state.settings();
        self.runner.start_all(&ids, profile)
    }

    /// Remove a record. An in-flight conversion for it finishes and is dropped.
    pub fn remove_image(&self, id: RecordId) -> bool {
        self.state.remove_image(id)
    }

    pub fn select(&self, id: RecordId) -> bool {
        self.state.select(id)
    }

    /// Apply a settings change and re-convert every record with the new profile.
    ///
    /// Every record restarts, whatever its status and whether or not the
    /// values actually changed. Results of conversions already running under
    /// the old profile are discarded when they arrive.
    pub fn update_settings(
        &self,
        patch: SettingsPatch,
    ) -> Result<Vec<ConversionTask>, SettingsError> {
        let (profile, ids) = self.state.apply_settings_patch(&patch)?;
        tracing::info!("Re-converting {} image(s) with new settings", ids.len());
        Ok(self.runner.start_all(&ids, profile))
    }

    /// Build a zip archive of every converted record.
    ///
    /// Records that are not converted when the export starts are left out.
    /// Progress is published through the store; exactly one of
    /// `ExportFinished` or `ExportFailed` is emitted once the export has started.
    pub async fn export_all(&self) -> Result<ArchiveBlob, ExportError> {
        let entries = match self.state.begin_export() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Export not started: {}", e);
                return Err(e);
            }
        };

        tracing::info!("Exporting {} converted image(s)", entries.len());

        let exporter = Arc::clone(&self.exporter);
        let progress_state = self.state.clone();
        let result = tokio::task::spawn_blocking(move || {
            let sink = move |value: u8| progress_state.set_export_progress(value);
            exporter.build_archive(entries, &sink)
        })
        .await
        .unwrap_or_else(|e| Err(ExportError::Worker(e.to_string())));

        match &result {
            Ok(_) => self.metrics.record_export_completed(),
            Err(_) => self.metrics.record_export_failed(),
        }
        self.state.finish_export(&result);
        result
    }

    /// Export and hand the archive to `sink`
    pub async fn save_archive(&self, sink: &dyn SaveSink) -> Result<Utf8PathBuf> {
        let blob = self.export_all().await.context("Failed to build archive")?;
        sink.save(&blob.file_name, &blob.bytes)
    }

    /// Converted output of a single record, if it has one
    pub fn download(&self, id: RecordId) -> Option<Download> {
        self.state.download(id)
    }

    /// Save one record's converted output through `sink`.
    ///
    /// Returns `Ok(None)` when the record is missing or not converted.
    pub fn save_download(&self, id: RecordId, sink: &dyn SaveSink) -> Result<Option<Utf8PathBuf>> {
        match self.download(id) {
            Some(download) => sink.save(&download.file_name, &download.bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Wait until no record is converting.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.state.subscribe();
        loop {
            if self.state.converting_count() == 0 {
                return;
            }
            match rx.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return,
            }
        }
    }

    /// Relay user-facing notifications from the store to the log.
    ///
    /// Runs until the store is dropped.
    pub fn spawn_notifier(&self) -> JoinHandle<()> {
        let mut rx = self.state.subscribe();
        tokio::spawn(async move {
            tracing::debug!("Notification listener started");
            loop {
                match rx.recv().await {
                    Ok(StateChange::ConversionFailed {
                        file_name, message, ..
                    }) => {
                        tracing::error!("Failed to convert {}: {}", file_name, message);
                    }
                    Ok(StateChange::ExportFinished { file_name, entries }) => {
                        tracing::info!("Created {} with {} image(s)", file_name, entries);
                    }
                    Ok(StateChange::ExportFailed { message }) => {
                        tracing::error!("Failed to create ZIP file: {}", message);
                    }
                    Ok(change) => tracing::trace!("State change received: {:?}", change),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Notification listener skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
