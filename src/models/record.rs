use super::settings::OutputFormat;
use std::fmt;
use std::sync::Arc;

/// Opaque identifier for a tracked image. Ids are allocated from a
/// monotonically increasing counter and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub(crate) u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "img-{}", self.0)
    }
}

/// Display-only reference to a record's original bytes.
///
/// Handles are allocated by the store when a record is created and revoked
/// when it is removed; see [`crate::models::PreviewRegistry`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PreviewHandle(pub(crate) String);

impl PreviewHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lifecycle of a record. There is no terminal state: any status can go
/// back to `Converting` when settings change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionStatus {
    Pending,
    Converting,
    Converted,
    Failed,
}

impl ConversionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversionStatus::Pending => "pending",
            ConversionStatus::Converting => "converting",
            ConversionStatus::Converted => "converted",
            ConversionStatus::Failed => "failed",
        }
    }
}

/// Bytes produced by a successful conversion
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertedImage {
    pub format: OutputFormat,
    pub bytes: Arc<[u8]>,
}

/// Result of applying an async callback to a record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The record was updated
    Applied,
    /// The callback belongs to an older generation and was dropped
    Stale,
    /// Current generation, but the record is not in a state that accepts it
    Ignored,
}

/// Tracked state for one user-supplied image.
///
/// Status, progress, and converted output only change through the
/// transition methods below, which keep `converted` present exactly when
/// the status is `Converted`.
#[derive(Clone, Debug)]
pub struct ImageRecord {
    id: RecordId,
    original_name: String,
    original_bytes: Arc<[u8]>,
    preview: PreviewHandle,
    status: ConversionStatus,
    progress: u8,
    converted: Option<ConvertedImage>,
    generation: u64,
    last_error: Option<String>,
}

impl ImageRecord {
    pub fn new(
        id: RecordId,
        original_name: String,
        original_bytes: Arc<[u8]>,
        preview: PreviewHandle,
    ) -> Self {
        Self {
            id,
            original_name,
            original_bytes,
            preview,
            status: ConversionStatus::Pending,
            progress: 0,
            converted: None,
            generation: 0,
            last_error: None,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn original_bytes(&self) -> &Arc<[u8]> {
        &self.original_bytes
    }

    pub fn original_size(&self) -> usize {
        self.original_bytes.len()
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }

    pub fn status(&self) -> ConversionStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn converted(&self) -> Option<&ConvertedImage> {
        self.converted.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_converting(&self) -> bool {
        self.status == ConversionStatus::Converting
    }

    /// Begin a new conversion attempt. Allowed from any state.
    ///
    /// Returns the new generation; results tagged with an older generation
    /// are rejected from now on.
    pub fn start(&mut self) -> u64 {
        self.generation += 1;
        self.status = ConversionStatus::Converting;
        self.progress = 0;
        self.converted = None;
        self.last_error = None;
        self.generation
    }

    pub fn record_progress(&mut self, generation: u64, value: u8) -> Transition {
        if generation != self.generation {
            return Transition::Stale;
        }
        if self.status != ConversionStatus::Converting {
            return Transition::Ignored;
        }
        // Non-decreasing within one generation, success alone reaches 100
        self.progress = self.progress.max(value.min(100));
        Transition::Applied
    }

    pub fn complete(&mut self, generation: u64, output: ConvertedImage) -> Transition {
        if generation != self.generation {
            return Transition::Stale;
        }
        if self.status != ConversionStatus::Converting {
            return Transition::Ignored;
        }
        self.status = ConversionStatus::Converted;
        self.progress = 100;
        self.converted = Some(output);
        Transition::Applied
    }

    pub fn fail(&mut self, generation: u64, message: String) -> Transition {
        if generation != self.generation {
            return Transition::Stale;
        }
        if self.status != ConversionStatus::Converting {
            return Transition::Ignored;
        }
        self.status = ConversionStatus::Failed;
        self.progress = 0;
        self.converted = None;
        self.last_error = Some(message);
        Transition::Applied
    }
}

/// Name stem used for download and archive entry names: the text before the
/// first `.` of the original file name.
pub fn file_stem(original_name: &str) -> &str {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    match base.split('.').next() {
        Some(stem) if !stem.is_empty() => stem,
        _ => "image",
    }
}
