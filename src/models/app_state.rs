use super::record::{ConversionStatus, ImageRecord, PreviewHandle, RecordId};
use super::settings::ConversionSettings;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Live preview handles, keyed by handle.
///
/// A handle stays resolvable until it is revoked, which happens when its
/// record is removed from the collection.
#[derive(Clone, Debug, Default)]
pub struct PreviewRegistry {
    next: u64,
    live: HashMap<PreviewHandle, Arc<[u8]>>,
}

impl PreviewRegistry {
    pub fn allocate(&mut self, bytes: Arc<[u8]>) -> PreviewHandle {
        self.next += 1;
        let handle = PreviewHandle(format!("preview://{}", self.next));
        self.live.insert(handle.clone(), bytes);
        handle
    }

    pub fn resolve(&self, handle: &PreviewHandle) -> Option<Arc<[u8]>> {
        self.live.get(handle).cloned()
    }

    /// Release a handle. Returns false if it was already revoked.
    pub fn revoke(&mut self, handle: &PreviewHandle) -> bool {
        self.live.remove(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// One progress bar as the UI would show it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressBar {
    pub label: String,
    pub percent: u8,
}

/// Conversion and export progress, merged for display.
///
/// The conversion bar is present while any record is converting; the
/// export bar while an export runs. Both can be present at once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressView {
    pub conversion: Option<ProgressBar>,
    pub export: Option<ProgressBar>,
}

impl ProgressView {
    pub fn is_idle(&self) -> bool {
        self.conversion.is_none() && self.export.is_none()
    }
}

/// Single source of truth for the converter.
///
/// Owns every [`ImageRecord`] (in display order), the selection, and the
/// shared conversion settings. Wrapped in `Arc<RwLock<AppState>>` by
/// [`crate::state::StateManager`]; mutate it only through the manager so
/// change events are emitted.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Collection, in insertion order
    pub records: IndexMap<RecordId, ImageRecord>,
    pub selected: Option<RecordId>,
    pub previews: PreviewRegistry,
    pub(crate) next_id: u64,

    // Settings
    pub settings: ConversionSettings,
    pub settings_version: u64,

    // Export
    pub is_exporting: bool,
    pub export_progress: u8,
}

impl AppState {
    /// Allocate the next record id. Ids are never handed out twice.
    pub fn allocate_id(&mut self) -> RecordId {
        self.next_id += 1;
        RecordId(self.next_id)
    }

    pub fn record(&self, id: RecordId) -> Option<&ImageRecord> {
        self.records.get(&id)
    }

    pub fn record_mut(&mut self, id: RecordId) -> Option<&mut ImageRecord> {
        self.records.get_mut(&id)
    }

    pub fn selected_record(&self) -> Option<&ImageRecord> {
        self.selected.and_then(|id| self.records.get(&id))
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Mean progress over all records, 0 when the collection is empty.
    ///
    /// Failed records count as 0, converted records as 100.
    pub fn aggregate_progress(&self) -> u8 {
        if self.records.is_empty() {
            return 0;
        }
        let total: usize = self.records.values().map(|r| r.progress() as usize).sum();
        (total / self.records.len()) as u8
    }

    pub fn converting_count(&self) -> usize {
        self.count_with_status(ConversionStatus::Converting)
    }

    pub fn converted_count(&self) -> usize {
        self.count_with_status(ConversionStatus::Converted)
    }

    pub fn failed_count(&self) -> usize {
        self.count_with_status(ConversionStatus::Failed)
    }

    fn count_with_status(&self, status: ConversionStatus) -> usize {
        self.records.values().filter(|r| r.status() == status).count()
    }

    pub fn progress_view(&self) -> ProgressView {
        let converting = self.converting_count();
        let conversion = (converting > 0).then(|| ProgressBar {
            label: format!(
                "Converting {} {}...",
                converting,
                if converting == 1 { "image" } else { "images" }
            ),
            percent: self.aggregate_progress(),
        });
        let export = self.is_exporting.then(|| ProgressBar {
            label: "Creating ZIP file...".to_string(),
            percent: self.export_progress,
        });
        ProgressView { conversion, export }
    }

    /// Ids in display order
    pub fn ids(&self) -> Vec<RecordId> {
        self.records.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::ConvertedImage;
    use crate::models::settings::OutputFormat;

    fn push_record(state: &mut AppState, name: &str) -> RecordId {
        let id = state.allocate_id();
        let bytes: Arc<[u8]> = Arc::from(name.as_bytes().to_vec());
        let preview = state.previews.allocate(bytes.clone());
        state
            .records
            .insert(id, ImageRecord::new(id, name.to_string(), bytes, preview));
        id
    }

    #[test]
    fn test_default_state() {
        let state = AppState::default();
        assert!(state.is_empty());
        assert!(state.selected.is_none());
        assert_eq!(state.aggregate_progress(), 0);
        assert_eq!(state.converting_count(), 0);
        assert!(!state.is_exporting);
    }

    #[test]
    fn test_ids_are_unique() {
        let mut state = AppState::default();
        let a = state.allocate_id();
        let b = state.allocate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_aggregate_progress() {
        let mut state = AppState::default();
        let a = push_record(&mut state, "a.png");
        let b = push_record(&mut state, "b.png");
        let c = push_record(&mut state, "c.png");

        let ga = state.record_mut(a).unwrap().start();
        state.record_mut(a).unwrap().complete(
            ga,
            ConvertedImage {
                format: OutputFormat::Jpeg,
                bytes: Arc::from(vec![0u8]),
            },
        );
        let gb = state.record_mut(b).unwrap().start();
        state.record_mut(b).unwrap().record_progress(gb, 50);
        let gc = state.record_mut(c).unwrap().start();
        state.record_mut(c).unwrap().fail(gc, "bad".to_string());

        // (100 + 50 + 0) / 3
        assert_eq!(state.aggregate_progress(), 50);
        assert_eq!(state.converting_count(), 1);
        assert_eq!(state.converted_count(), 1);
        assert_eq!(state.failed_count(), 1);
    }

    #[test]
    fn test_progress_view() {
        let mut state = AppState::default();
        assert!(state.progress_view().is_idle());

        let a = push_record(&mut state, "a.png");
        let generation = state.record_mut(a).unwrap().start();
        state.record_mut(a).unwrap().record_progress(generation, 40);
        state.is_exporting = true;
        state.export_progress = 10;

        let view = state.progress_view();
        let conversion = view.conversion.unwrap();
        assert_eq!(conversion.label, "Converting 1 image...");
        assert_eq!(conversion.percent, 40);
        let export = view.export.unwrap();
        assert_eq!(export.label, "Creating ZIP file...");
        assert_eq!(export.percent, 10);

        push_record(&mut state, "b.png");
        let b = state.ids()[1];
        state.record_mut(b).unwrap().start();
        assert_eq!(
            state.progress_view().conversion.unwrap().label,
            "Converting 2 images..."
        );
    }

    #[test]
    fn test_preview_registry() {
        let mut registry = PreviewRegistry::default();
        let handle = registry.allocate(Arc::from(vec![9u8]));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve(&handle).unwrap().as_ref(), &[9]);
        assert!(registry.revoke(&handle));
        assert!(!registry.revoke(&handle));
        assert!(registry.resolve(&handle).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_display_order() {
        let mut state = AppState::default();
        let a = push_record(&mut state, "a.png");
        let b = push_record(&mut state, "b.png");
        assert_eq!(state.ids(), vec![a, b]);
    }
}
