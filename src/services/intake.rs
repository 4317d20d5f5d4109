use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;

/// File extensions accepted as conversion input (compared case-insensitively)
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "avif"];

/// One user-supplied image file, as handed to the store.
#[derive(Clone, Debug)]
pub struct SourceImage {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl SourceImage {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// A path that was not loaded, with the reason
#[derive(Clone, Debug)]
pub struct Rejected {
    pub path: Utf8PathBuf,
    pub reason: String,
}

/// Check whether a path has one of the recognized image extensions
pub fn is_supported(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Read image files from disk, skipping unsupported or unreadable ones.
///
/// Files are returned in the order given.
pub async fn load_sources(paths: &[Utf8PathBuf]) -> (Vec<SourceImage>, Vec<Rejected>) {
    let mut sources = Vec::with_capacity(paths.len());
    let mut rejected = Vec::new();

    for path in paths {
        if !is_supported(path) {
            tracing::warn!("Skipping unsupported file type: {}", path);
            rejected.push(Rejected {
                path: path.clone(),
                reason: "unsupported file type".to_string(),
            });
            continue;
        }

        match read_source(path).await {
            Ok(source) => sources.push(source),
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", path, e);
                rejected.push(Rejected {
                    path: path.clone(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    tracing::info!(
        "Loaded {} image(s), skipped {}",
        sources.len(),
        rejected.len()
    );

    (sources, rejected)
}

async fn read_source(path: &Utf8Path) -> Result<SourceImage> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image: {}", path))?;
    let name = path.file_name().unwrap_or(path.as_str()).to_string();
    Ok(SourceImage::new(name, bytes))
}
