//! Local engine backed by a memory-mapped GGUF model file.
//!

use crate::core::error::EngineError;
use crate::core::state::InitProgressReport;
use crate::core::traits::{EngineFactory, EngineHandle, EngineInfo, ProgressCallback};
use anyhow::{Context, bail};
use async_trait::async_trait;
use log::info;
use memmap2::Mmap;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::time::Instant;

pub const GGUF_MAGIC: &[u8; 4] = b"GGUF";
pub const GGUF_EXTENSION: &str = "gguf";

const DEFAULT_CHUNK_BYTES: usize = 64 * 1024 * 1024;
const PAGE_BYTES: usize = 4096;
const MB: usize = 1024 * 1024;

/// Loads models from `<models_dir>/<model id>` or `<models_dir>/<model id>.gguf`.
pub struct MmapEngineFactory {
    models_dir: PathBuf,
    chunk_bytes: usize,
}

impl MmapEngineFactory {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }

    /// Granularity of progress reports while paging weights in.
    pub fn with_chunk_size(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Finds the model file for `model_id`.
    ///
    /// Identifiers are file names, never paths: separators, `..` and leading
    /// dots are rejected.
    pub async fn resolve(&self, model_id: &str) -> anyhow::Result<PathBuf> {
        let name = model_id.trim();
        if name.is_empty() {
            bail!("model id must not be empty");
        }
        if name.contains(['/', '\\']) || name.contains("..") || name.starts_with('.') {
            bail!("invalid model id `{model_id}`");
        }

        let exact = self.models_dir.join(name);
        if is_file(&exact).await {
            return Ok(exact);
        }

        let with_extension = self.models_dir.join(format!("{name}.{GGUF_EXTENSION}"));
        if is_file(&with_extension).await {
            return Ok(with_extension);
        }

        bail!(
            "model `{model_id}` not found in {}",
            self.models_dir.display()
        )
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_file())
}

#[async_trait]
impl EngineFactory for MmapEngineFactory {
    type Engine = MappedModel;

    async fn create_engine(
        &self,
        model_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<MappedModel, EngineError> {
        let path = self.resolve(model_id).await?;
        on_progress(InitProgressReport::new(
            0.0,
            format!("Opening model file {}", path.display()),
        ));

        let start_time = Instant::now();
        let file = File::open(&path)
            .await
            .with_context(|| format!("failed to open model file {}", path.display()))?;
        let len = file
            .metadata()
            .await
            .with_context(|| format!("failed to stat model file {}", path.display()))?
            .len();
        if len < GGUF_MAGIC.len() as u64 {
            return Err(EngineError::msg(format!(
                "model file {} is too small to be a GGUF model",
                path.display()
            )));
        }

        // SAFETY: the mapping is read-only and model files are not modified while served.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to map model file {}", path.display()))?;
        if !mmap.starts_with(GGUF_MAGIC) {
            return Err(EngineError::msg(format!(
                "{} is not a GGUF model file",
                path.display()
            )));
        }

        let chunk_bytes = self.chunk_bytes;
        let mmap = tokio::task::spawn_blocking(move || {
            page_in(&mmap, chunk_bytes, &*on_progress);
            mmap
        })
        .await
        .context("weight loading task failed")?;

        info!(
            "Model {} ({} MB) loaded in {:.2} seconds.",
            model_id,
            mmap.len() / MB,
            start_time.elapsed().as_secs_f32()
        );

        Ok(MappedModel {
            model_id: model_id.to_owned(),
            path,
            mmap,
        })
    }
}

/// Touches every page of the mapping, reporting once per chunk.
fn page_in(bytes: &[u8], chunk_bytes: usize, on_progress: &dyn Fn(InitProgressReport)) -> u64 {
    let total = bytes.len();
    let mut checksum = 0u64;

    for (index, chunk) in bytes.chunks(chunk_bytes).enumerate() {
        for byte in chunk.iter().step_by(PAGE_BYTES) {
            checksum = checksum.wrapping_add(u64::from(*byte));
        }

        let loaded = index * chunk_bytes + chunk.len();
        on_progress(InitProgressReport::new(
            loaded as f64 / total as f64,
            format!("Loading model weights [{}/{} MB]", loaded / MB, total / MB),
        ));
    }

    on_progress(InitProgressReport::new(1.0, "Finished loading model weights"));
    std::hint::black_box(checksum)
}

/// A model file mapped into memory, ready for inference.
pub struct MappedModel {
    model_id: String,
    path: PathBuf,
    mmap: Mmap,
}

impl MappedModel {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl EngineHandle for MappedModel {
    fn info(&self) -> EngineInfo {
        EngineInfo {
            model_id: self.model_id.clone(),
            summary: format!("{} bytes mapped from {}", self.len(), self.path.display()),
        }
    }
}

impl std::fmt::Debug for MappedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedModel")
            .field("model_id", &self.model_id)
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}
