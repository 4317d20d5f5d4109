// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events for UI updates. It is the image
// collection store: the only place records are created, transitioned, or removed.

use crate::models::{
    AppState, ConversionSettings, ConvertedImage, ImageRecord, ProgressView, RecordId,
    SettingsError, SettingsPatch, Transition,
};
use crate::services::export::{ArchiveBlob, Download, ExportEntry, ExportError, download_name};
use crate::services::intake::SourceImage;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Capacity of the change-event channel. Progress ticks are frequent, so
/// this is sized well above the number of records in a typical batch.
const EVENT_BUFFER: usize = 256;

/// Change events emitted when state is modified
///
/// These events are emitted to notify interested parties (primarily the UI)
/// about state changes without requiring them to poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// New records were appended to the collection
    ImagesAdded { ids: Vec<RecordId> },

    /// A record was removed and its preview released
    ImageRemoved { id: RecordId },

    /// The selected record changed
    SelectionChanged { selected: Option<RecordId> },

    /// A record entered `Converting`
    ConversionStarted { id: RecordId, generation: u64 },

    /// Progress of a single record changed
    ConversionProgress { id: RecordId, progress: u8 },

    /// Aggregate progress or the number of converting records changed
    ProgressUpdated { aggregate: u8, converting: usize },

    /// A record finished converting
    ImageConverted { id: RecordId, size: usize },

    /// A record failed to convert; user-facing notification
    ConversionFailed {
        id: RecordId,
        file_name: String,
        message: String,
    },

    /// Shared settings were replaced
    SettingsChanged {
        settings: ConversionSettings,
        version: u64,
    },

    /// A bulk export started
    ExportStarted { entries: usize },

    /// Bulk export progress changed
    ExportProgress { progress: u8 },

    /// A bulk export produced an archive
    ExportFinished { file_name: String, entries: usize },

    /// A bulk export failed; user-facing notification
    ExportFailed { message: String },
}

/// What a conversion task needs, captured when the conversion starts
#[derive(Clone, Debug)]
pub struct ConversionTicket {
    pub generation: u64,
    pub original_name: String,
    pub original_bytes: Arc<[u8]>,
}

/// Fields compared before and after an update to derive change events
#[derive(Clone, Copy, PartialEq)]
struct Summary {
    selected: Option<RecordId>,
    aggregate: u8,
    converting: usize,
    settings: ConversionSettings,
    settings_version: u64,
    is_exporting: bool,
    export_progress: u8,
}

impl Summary {
    fn of(state: &AppState) -> Self {
        Self {
            selected: state.selected,
            aggregate: state.aggregate_progress(),
            converting: state.converting_count(),
            settings: state.settings,
            settings_version: state.settings_version,
            is_exporting: state.is_exporting,
            export_progress: state.export_progress,
        }
    }
}

/// Thread-safe image collection store with event emission
///
/// This is the central state management component that:
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Applies record transitions, guarded by generation tokens
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// Generation tokens, not the lock, decide which async result wins; the lock
/// only makes each individual transition atomic.
///
/// # Related Types
///
/// - [`crate::models::AppState`]: The underlying state structure
/// - [`crate::services::ConversionRunner`]: Drives record transitions
/// - [`crate::controller::BatchController`]: Primary entry point for callers
pub struct StateManager {
    /// The application state protected by RwLock for thread-safe access
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default settings
    pub fn new() -> Self {
        Self::with_settings(ConversionSettings::default())
    }

    /// Create a new StateManager starting from the given settings
    pub fn with_settings(settings: ConversionSettings) -> Self {
        let (state_tx, _) = broadcast::channel(EVENT_BUFFER);
        let state = AppState {
            settings,
            ..AppState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            state_tx,
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, AppState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a read-only snapshot of the current state
    ///
    /// This clones the entire state (image bytes are shared, not copied).
    /// For checking individual fields, prefer `read()` with a closure.
    pub fn snapshot(&self) -> AppState {
        self.read_guard().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let converting = state_manager.read(|state| state.converting_count());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.read_guard();
        f(&state)
    }

    /// Update the state and emit derived change events
    ///
    /// Selection, aggregate progress, settings, and export progress changes
    /// are detected automatically. Record-level events are emitted by the
    /// dedicated methods below.
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.write_guard();
        let before = Summary::of(&state);

        update_fn(&mut state);

        let changes = Self::detect_changes(&before, &Summary::of(&state));
        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn emit(&self, change: StateChange, changes: &mut Vec<StateChange>) {
        let _ = self.state_tx.send(change.clone());
        changes.push(change);
    }

    fn detect_changes(old: &Summary, new: &Summary) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.selected != new.selected {
            changes.push(StateChange::SelectionChanged {
                selected: new.selected,
            });
        }

        if old.aggregate != new.aggregate || old.converting != new.converting {
            changes.push(StateChange::ProgressUpdated {
                aggregate: new.aggregate,
                converting: new.converting,
            });
        }

        if old.settings != new.settings || old.settings_version != new.settings_version {
            changes.push(StateChange::SettingsChanged {
                settings: new.settings,
                version: new.settings_version,
            });
        }

        if new.is_exporting && old.export_progress != new.export_progress {
            changes.push(StateChange::ExportProgress {
                progress: new.export_progress,
            });
        }

        changes
    }

    // Collection operations

    /// Append one `Pending` record per source, in order.
    ///
    /// Selects the first new record when nothing is selected. Conversion is
    /// not started here; see [`crate::controller::BatchController::add_images`].
    pub fn add_images(&self, sources: Vec<SourceImage>) -> Vec<RecordId> {
        if sources.is_empty() {
            return Vec::new();
        }

        let mut ids = Vec::with_capacity(sources.len());
        let mut changes = self.update(|state| {
            for source in sources {
                let id = state.allocate_id();
                let preview = state.previews.allocate(Arc::clone(&source.bytes));
                state
                    .records
                    .insert(id, ImageRecord::new(id, source.name, source.bytes, preview));
                ids.push(id);
            }
            if state.selected.is_none() {
                state.selected = ids.first().copied();
            }
        });

        tracing::info!("Added {} image(s)", ids.len());
        self.emit(StateChange::ImagesAdded { ids: ids.clone() }, &mut changes);
        ids
    }

    /// Remove a record and revoke its preview.
    ///
    /// If it was selected, selection moves to the first remaining record
    /// (or clears). Returns false if the id is unknown.
    pub fn remove_image(&self, id: RecordId) -> bool {
        let mut removed = false;
        let mut changes = self.update(|state| {
            let Some(record) = state.records.shift_remove(&id) else {
                return;
            };
            state.previews.revoke(record.preview());
            if state.selected == Some(id) {
                state.selected = state.records.keys().next().copied();
            }
            removed = true;
        });

        if removed {
            tracing::debug!("Removed {}", id);
            self.emit(StateChange::ImageRemoved { id }, &mut changes);
        }
        removed
    }

    /// Select a record. No-op (returns false) if the id does not exist.
    pub fn select(&self, id: RecordId) -> bool {
        let mut found = false;
        self.update(|state| {
            if state.records.contains_key(&id) {
                state.selected = Some(id);
                found = true;
            }
        });
        found
    }

    pub fn selected(&self) -> Option<RecordId> {
        self.read(|s| s.selected)
    }

    pub fn count(&self) -> usize {
        self.read(|s| s.count())
    }

    pub fn aggregate_progress(&self) -> u8 {
        self.read(|s| s.aggregate_progress())
    }

    pub fn converting_count(&self) -> usize {
        self.read(|s| s.converting_count())
    }

    pub fn progress_view(&self) -> ProgressView {
        self.read(|s| s.progress_view())
    }

    /// Resolve a record's preview handle to the original bytes
    pub fn preview_bytes(&self, id: RecordId) -> Option<Arc<[u8]>> {
        self.read(|s| {
            s.record(id)
                .and_then(|record| s.previews.resolve(record.preview()))
        })
    }

    // Record transitions

    /// Move a record to `Converting` under a new generation
    pub fn begin_conversion(&self, id: RecordId) -> Option<ConversionTicket> {
        let mut ticket = None;
        let mut changes = self.update(|state| {
            if let Some(record) = state.record_mut(id) {
                let generation = record.start();
                ticket = Some(ConversionTicket {
                    generation,
                    original_name: record.original_name().to_string(),
                    original_bytes: Arc::clone(record.original_bytes()),
                });
            }
        });

        if let Some(ticket) = &ticket {
            self.emit(
                StateChange::ConversionStarted {
                    id,
                    generation: ticket.generation,
                },
                &mut changes,
            );
        }
        ticket
    }

    /// Apply a progress report. `None` if the record no longer exists.
    pub fn apply_progress(&self, id: RecordId, generation: u64, value: u8) -> Option<Transition> {
        let mut result = None;
        let mut moved = None;
        let mut changes = self.update(|state| {
            if let Some(record) = state.record_mut(id) {
                let before = record.progress();
                result = Some(record.record_progress(generation, value));
                if record.progress() != before {
                    moved = Some(record.progress());
                }
            }
        });

        if let Some(progress) = moved {
            self.emit(StateChange::ConversionProgress { id, progress }, &mut changes);
        }
        result
    }

    /// Commit a successful conversion. `None` if the record no longer exists.
    pub fn complete_conversion(
        &self,
        id: RecordId,
        generation: u64,
        output: ConvertedImage,
    ) -> Option<Transition> {
        let size = output.bytes.len();
        let mut result = None;
        let mut changes = self.update(|state| {
            if let Some(record) = state.record_mut(id) {
                result = Some(record.complete(generation, output));
            }
        });

        if result == Some(Transition::Applied) {
            tracing::debug!("Converted {} ({} bytes)", id, size);
            self.emit(StateChange::ImageConverted { id, size }, &mut changes);
        }
        result
    }

    /// Commit a failed conversion and notify the user, naming the file.
    /// `None` if the record no longer exists.
    pub fn fail_conversion(
        &self,
        id: RecordId,
        generation: u64,
        message: String,
    ) -> Option<Transition> {
        let mut result = None;
        let mut file_name = String::new();
        let mut changes = self.update(|state| {
            if let Some(record) = state.record_mut(id) {
                file_name = record.original_name().to_string();
                result = Some(record.fail(generation, message.clone()));
            }
        });

        if result == Some(Transition::Applied) {
            tracing::debug!("Conversion of {} ({}) failed: {}", file_name, id, message);
            self.emit(
                StateChange::ConversionFailed {
                    id,
                    file_name,
                    message,
                },
                &mut changes,
            );
        }
        result
    }

    // Settings

    pub fn settings(&self) -> ConversionSettings {
        self.read(|s| s.settings)
    }

    /// Merge a patch into the shared settings.
    ///
    /// Returns the new settings and every record id at the moment of the
    /// change, in display order. Invalid patches leave state untouched.
    pub fn apply_settings_patch(
        &self,
        patch: &SettingsPatch,
    ) -> Result<(ConversionSettings, Vec<RecordId>), SettingsError> {
        // Merge under the write lock so concurrent patches compose
        let mut outcome = None;
        let mut ids = Vec::new();
        self.update(|state| {
            let result = state.settings.merged(patch);
            if let Ok(settings) = &result {
                state.settings = *settings;
                state.settings_version += 1;
                ids = state.ids();
            }
            outcome = Some(result);
        });
        let merged = outcome.unwrap_or_else(|| Ok(self.settings()))?;

        tracing::info!(
            "Settings updated: {} q{} max {}x{}",
            merged.format,
            merged.quality,
            merged.max_width,
            merged.max_height
        );
        Ok((merged, ids))
    }

    // Export

    /// Snapshot converted records and mark an export as running
    pub fn begin_export(&self) -> Result<Vec<ExportEntry>, ExportError> {
        let mut outcome = Ok(Vec::new());
        let mut changes = self.update(|state| {
            if state.is_exporting {
                outcome = Err(ExportError::AlreadyRunning);
                return;
            }
            let entries: Vec<ExportEntry> = state
                .records
                .values()
                .filter_map(|record| {
                    record.converted().map(|output| ExportEntry {
                        id: record.id(),
                        original_name: record.original_name().to_string(),
                        format: output.format,
                        bytes: Arc::clone(&output.bytes),
                    })
                })
                .collect();
            if entries.is_empty() {
                outcome = Err(ExportError::NothingToExport);
                return;
            }
            state.is_exporting = true;
            state.export_progress = 0;
            outcome = Ok(entries);
        });

        let event = match &outcome {
            Ok(entries) => StateChange::ExportStarted {
                entries: entries.len(),
            },
            Err(e) => StateChange::ExportFailed {
                message: e.to_string(),
            },
        };
        self.emit(event, &mut changes);
        outcome
    }

    /// Record export progress; values never go backwards
    pub fn set_export_progress(&self, progress: u8) {
        self.update(|state| {
            if state.is_exporting {
                state.export_progress = state.export_progress.max(progress.min(100));
            }
        });
    }

    /// Mark the running export as done and emit exactly one outcome event
    pub fn finish_export(&self, result: &Result<ArchiveBlob, ExportError>) {
        let mut changes = self.update(|state| {
            state.is_exporting = false;
            state.export_progress = 0;
        });

        let event = match result {
            Ok(blob) => StateChange::ExportFinished {
                file_name: blob.file_name.clone(),
                entries: blob.entries,
            },
            Err(e) => {
                StateChange::ExportFailed {
                    message: e.to_string(),
                }
            }
        };
        self.emit(event, &mut changes);
    }

    /// Converted output of one record, named for a single download
    pub fn download(&self, id: RecordId) -> Option<Download> {
        self.read(|s| {
            let record = s.record(id)?;
            let output = record.converted()?;
            Some(Download {
                file_name: download_name(record.original_name(), output.format),
                bytes: Arc::clone(&output.bytes),
            })
        })
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across tasks
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
