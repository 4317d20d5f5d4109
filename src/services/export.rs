use crate::models::{DEFAULT_ARCHIVE_NAME, OutputFormat, RecordId, file_stem};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;
use std::io::{Cursor, Write};
use std::sync::Arc;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Share of the combined progress bar given to entry assembly; the
/// remainder covers archive serialization.
const ASSEMBLY_SHARE: u32 = 50;

/// Errors that abort an export attempt
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No converted images to export")]
    NothingToExport,

    #[error("An export is already in progress")]
    AlreadyRunning,

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error while writing archive: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export worker failed: {0}")]
    Worker(String),
}

/// A converted record captured at export start
#[derive(Clone, Debug)]
pub struct ExportEntry {
    pub id: RecordId,
    pub original_name: String,
    pub format: OutputFormat,
    pub bytes: Arc<[u8]>,
}

impl ExportEntry {
    pub fn entry_name(&self) -> String {
        entry_name(&self.original_name, self.format)
    }
}

/// Finished archive plus the file name to save it under
#[derive(Clone, Debug)]
pub struct ArchiveBlob {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub entries: usize,
}

/// A single converted image ready to save
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub bytes: Arc<[u8]>,
}

/// Archive entry name: `<stem>.<ext>`
pub fn entry_name(original_name: &str, format: OutputFormat) -> String {
    format!("{}.{}", file_stem(original_name), format.extension())
}

/// Single-download name: `converted-<stem>.<ext>`
pub fn download_name(original_name: &str, format: OutputFormat) -> String {
    format!("converted-{}", entry_name(original_name, format))
}

/// Progress tracker for one export.
///
/// Maps the two phases onto one non-decreasing 0-100 value: entry assembly
/// covers `0..=50`, archive serialization `50..=100`.
#[derive(Debug)]
pub struct ExportJob {
    snapshot: Vec<RecordId>,
    progress: u8,
}

impl ExportJob {
    pub fn new(snapshot: Vec<RecordId>) -> Self {
        Self {
            snapshot,
            progress: 0,
        }
    }

    pub fn snapshot(&self) -> &[RecordId] {
        &self.snapshot
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Record that `added` of `total` entries have been assembled
    pub fn assembled(&mut self, added: usize, total: usize) -> u8 {
        let fraction = if total == 0 {
            100
        } else {
            (added.min(total) * 100 / total) as u32
        };
        self.advance(fraction * ASSEMBLY_SHARE / 100)
    }

    /// Record serialization progress (`percent` in 0-100)
    pub fn serialized(&mut self, percent: u8) -> u8 {
        let percent = percent.min(100) as u32;
        self.advance(ASSEMBLY_SHARE + percent * (100 - ASSEMBLY_SHARE) / 100)
    }

    fn advance(&mut self, value: u32) -> u8 {
        self.progress = self.progress.max(value.min(100) as u8);
        self.progress
    }
}

/// Builds the bulk-download archive from a snapshot of converted records.
///
/// Entries are named `<stem>.<ext>`. Two originals with the same stem map to
/// the same entry name; the later one overwrites the earlier one.
#[derive(Debug, Clone)]
pub struct ExportCoordinator {
    archive_name: String,
    compression: CompressionMethod,
}

impl Default for ExportCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_NAME, false)
    }
}

impl ExportCoordinator {
    /// # Arguments
    /// * `archive_name` - Suggested file name for the archive
    /// * `compress` - Deflate entries instead of storing them
    pub fn new(archive_name: impl Into<String>, compress: bool) -> Self {
        Self {
            archive_name: archive_name.into(),
            compression: if compress {
                CompressionMethod::Deflated
            } else {
                CompressionMethod::Stored
            },
        }
    }

    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    /// Build the archive synchronously, reporting combined progress.
    ///
    /// Nothing is returned on failure; a partially written archive is dropped.
    pub fn build_archive(
        &self,
        entries: Vec<ExportEntry>,
        progress: &dyn Fn(u8),
    ) -> Result<ArchiveBlob, ExportError> {
        if entries.is_empty() {
            return Err(ExportError::NothingToExport);
        }

        let mut job = ExportJob::new(entries.iter().map(|e| e.id).collect());
        let total = entries.len();

        // Phase 1: assemble entries (last write wins on name collisions)
        let mut assembled: IndexMap<String, Arc<[u8]>> = IndexMap::with_capacity(total);
        for (index, entry) in entries.into_iter().enumerate() {
            let name = entry.entry_name();
            if assembled.insert(name.clone(), entry.bytes).is_some() {
                tracing::warn!("Archive entry {} overwritten by {}", name, entry.id);
            }
            progress(job.assembled(index + 1, total));
        }

        // Phase 2: serialize
        let options = SimpleFileOptions::default().compression_method(self.compression);
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let entry_count = assembled.len();

        for (index, (name, bytes)) in assembled.into_iter().enumerate() {
            writer.start_file(name, options)?;
            writer.write_all(&bytes)?;
            let percent = ((index + 1) * 100 / (entry_count + 1)) as u8;
            progress(job.serialized(percent));
        }

        let bytes = writer.finish()?.into_inner();
        progress(job.serialized(100));

        tracing::info!(
            "Built archive {} with {} entries ({} bytes) from {} converted images",
            self.archive_name,
            entry_count,
            bytes.len(),
            job.snapshot().len()
        );

        Ok(ArchiveBlob {
            file_name: self.archive_name.clone(),
            bytes,
            entries: entry_count,
        })
    }
}

/// Destination for finished downloads; the environment decides what saving means.
#[cfg_attr(test, mockall::automock)]
pub trait SaveSink: Send + Sync {
    /// Persist `payload` under `file_name`, returning where it ended up
    fn save(&self, file_name: &str, payload: &[u8]) -> Result<Utf8PathBuf>;
}

/// [`SaveSink`] that writes files into a directory
#[derive(Debug, Clone)]
pub struct DirectorySaveSink {
    dir: Utf8PathBuf,
}

impl DirectorySaveSink {
    pub fn new<P: AsRef<Utf8Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create output directory: {}", dir))?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }
}

impl SaveSink for DirectorySaveSink {
    fn save(&self, file_name: &str, payload: &[u8]) -> Result<Utf8PathBuf> {
        let path = self.dir.join(file_name);
        fs::write(&path, payload).with_context(|| format!("Failed to write {}", path))?;
        tracing::info!("Saved {} ({} bytes)", path, payload.len());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::Mutex;
    use zip::ZipArchive;

    fn entry(id: u64, name: &str, bytes: &[u8]) -> ExportEntry {
        ExportEntry {
            id: RecordId(id),
            original_name: name.to_string(),
            format: OutputFormat::Webp,
            bytes: Arc::from(bytes.to_vec()),
        }
    }

    fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Vec<u8> {
        let mut file = archive.by_name(name).unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_names() {
        assert_eq!(entry_name("cat.png", OutputFormat::Jpeg), "cat.jpeg");
        assert_eq!(download_name("cat.png", OutputFormat::Avif), "converted-cat.avif");
    }

    #[test]
    fn test_build_archive_round_trip() {
        let coordinator = ExportCoordinator::default();
        let blob = coordinator
            .build_archive(
                vec![entry(1, "a.png", b"first"), entry(2, "b.jpg", b"second")],
                &|_| {},
            )
            .unwrap();

        assert_eq!(blob.file_name, "converted-images.zip");
        assert_eq!(blob.entries, 2);

        let mut archive = ZipArchive::new(Cursor::new(blob.bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(read_entry(&mut archive, "a.webp"), b"first");
        assert_eq!(read_entry(&mut archive, "b.webp"), b"second");
    }

    #[test]
    fn test_stem_collision_last_write_wins() {
        let coordinator = ExportCoordinator::new("out.zip", true);
        let blob = coordinator
            .build_archive(
                vec![entry(1, "dup.png", b"old"), entry(2, "dup.jpg", b"new")],
                &|_| {},
            )
            .unwrap();

        assert_eq!(blob.entries, 1);
        let mut archive = ZipArchive::new(Cursor::new(blob.bytes)).unwrap();
        assert_eq!(read_entry(&mut archive, "dup.webp"), b"new");
    }

    #[test]
    fn test_empty_snapshot_fails() {
        let coordinator = ExportCoordinator::default();
        let result = coordinator.build_archive(Vec::new(), &|_| {});
        assert!(matches!(result, Err(ExportError::NothingToExport)));
    }

    #[test]
    fn test_progress_is_monotonic_and_completes() {
        let coordinator = ExportCoordinator::default();
        let seen = Mutex::new(Vec::new());
        let entries = (1..=5)
            .map(|i| entry(i, &format!("img{}.png", i), b"data"))
            .collect();

        coordinator
            .build_archive(entries, &|p| seen.lock().unwrap().push(p))
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last(), Some(&100));
        // Assembly phase tops out at the halfway mark
        assert_eq!(seen[4], 50);
    }

    #[test]
    fn test_export_job_phases() {
        let mut job = ExportJob::new(vec![RecordId(1), RecordId(2)]);
        assert_eq!(job.assembled(1, 2), 25);
        assert_eq!(job.assembled(2, 2), 50);
        assert_eq!(job.serialized(0), 50);
        assert_eq!(job.serialized(50), 75);
        // Never goes backwards
        assert_eq!(job.assembled(1, 2), 75);
        assert_eq!(job.serialized(100), 100);
        assert_eq!(job.snapshot().len(), 2);
    }

    #[test]
    fn test_mock_save_sink_receives_archive() {
        let mut sink = MockSaveSink::new();
        sink.expect_save()
            .withf(|name, payload| name == "converted-images.zip" && !payload.is_empty())
            .times(1)
            .returning(|name, _| Ok(Utf8PathBuf::from(name)));

        let blob = ExportCoordinator::default()
            .build_archive(vec![entry(1, "a.png", b"x")], &|_| {})
            .unwrap();
        let saved = sink.save(&blob.file_name, &blob.bytes).unwrap();
        assert_eq!(saved, Utf8PathBuf::from("converted-images.zip"));
    }

    #[test]
    fn test_directory_save_sink() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().join("out")).unwrap();
        let sink = DirectorySaveSink::new(&dir).unwrap();

        let path = sink.save("converted-a.jpeg", b"jpeg bytes").unwrap();
        assert_eq!(path, dir.join("converted-a.jpeg"));
        assert_eq!(fs::read(&path).unwrap(), b"jpeg bytes");
    }
}
