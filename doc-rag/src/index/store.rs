//! Metadata store, in-memory snapshots and the on-disk layout of a domain corpus.
//!
//! ```text
//! <data_root>/domains/<domain>/vectorstore/
//!     CURRENT               name of the active generation
//!     gen-<stamp>/index.json
//!     gen-<stamp>/index.vec
//!     .build.lock
//! ```
//!
//! A generation directory is written completely before `CURRENT` is swapped
//! (temp file + rename), so readers only ever see finished pairs.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::RagError;
use crate::index::flat::FlatL2Index;
use crate::record::Chunk;

pub const INDEX_FILE: &str = "index.vec";
pub const METADATA_FILE: &str = "index.json";
pub const CURRENT_FILE: &str = "CURRENT";
pub const LOCK_FILE: &str = ".build.lock";
pub const METADATA_FORMAT_VERSION: u32 = 1;

const GENERATION_PREFIX: &str = "gen-";

/// Persisted companion of a [`FlatL2Index`]; `chunks[i]` describes row `i`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataStore {
    pub format_version: u32,
    pub embedder_name: String,
    pub dimension: usize,
    /// RFC 3339 build timestamp.
    pub built_at: String,
    pub chunks: Vec<Chunk>,
}

impl MetadataStore {
    pub fn new(chunks: Vec<Chunk>, embedder_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            format_version: METADATA_FORMAT_VERSION,
            embedder_name: embedder_name.into(),
            dimension,
            built_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            chunks,
        }
    }
}

/// Index plus position-aligned metadata, immutable once constructed.
#[derive(Clone, Debug)]
pub struct IndexSnapshot {
    index: FlatL2Index,
    metadata: MetadataStore,
}

impl IndexSnapshot {
    /// Pairs an index with its metadata after checking alignment.
    ///
    /// # Errors
    /// [`RagError::CorruptIndex`] if dimensions or row counts disagree.
    pub fn new(index: FlatL2Index, metadata: MetadataStore) -> Result<Self, RagError> {
        if index.dim() != metadata.dimension {
            return Err(RagError::CorruptIndex(format!(
                "index dimension {} != metadata dimension {}",
                index.dim(),
                metadata.dimension
            )));
        }
        if index.len() != metadata.chunks.len() {
            return Err(RagError::CorruptIndex(format!(
                "index holds {} vectors but metadata holds {} chunks",
                index.len(),
                metadata.chunks.len()
            )));
        }
        Ok(Self { index, metadata })
    }

    /// Reads `index.json` + `index.vec` from a generation directory.
    ///
    /// # Errors
    /// - [`RagError::IndexNotFound`] if either file is missing.
    /// - [`RagError::CorruptIndex`] if either file is malformed or they disagree.
    pub fn read_from(dir: &Path) -> Result<Self, RagError> {
        let meta_path = dir.join(METADATA_FILE);
        let index_path = dir.join(INDEX_FILE);
        for p in [&meta_path, &index_path] {
            if !p.is_file() {
                return Err(RagError::IndexNotFound(p.clone()));
            }
        }

        let metadata: MetadataStore = serde_json::from_slice(&fs::read(&meta_path)?)
            .map_err(|e| RagError::CorruptIndex(format!("{}: {e}", meta_path.display())))?;
        if metadata.format_version != METADATA_FORMAT_VERSION {
            return Err(RagError::CorruptIndex(format!(
                "unsupported metadata format version {}",
                metadata.format_version
            )));
        }
        let index = FlatL2Index::from_bytes(&fs::read(&index_path)?)?;

        Self::new(index, metadata)
    }

    /// Writes both files into `dir`: metadata first, then the index.
    pub fn write_to(&self, dir: &Path) -> Result<(), RagError> {
        let meta = serde_json::to_vec(&self.metadata)?;
        write_atomic(&dir.join(METADATA_FILE), &meta)?;
        write_atomic(&dir.join(INDEX_FILE), &self.index.to_bytes())?;
        sync_dir(dir);
        Ok(())
    }

    pub fn index(&self) -> &FlatL2Index {
        &self.index
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.metadata.chunks
    }

    pub fn dimension(&self) -> usize {
        self.metadata.dimension
    }

    pub fn embedder_name(&self) -> &str {
        &self.metadata.embedder_name
    }

    pub fn summary(&self, domain: &str, location: PathBuf) -> StoreSummary {
        StoreSummary {
            domain: domain.to_string(),
            location,
            vectors: self.index.len(),
            chunks: self.metadata.chunks.len(),
            documents: self
                .metadata
                .chunks
                .iter()
                .map(|c| c.meta.page.source_filename.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
            dimension: self.metadata.dimension,
            embedder_name: self.metadata.embedder_name.clone(),
            built_at: self.metadata.built_at.clone(),
        }
    }
}

/// What a verified corpus holds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoreSummary {
    pub domain: String,
    pub location: PathBuf,
    pub vectors: usize,
    pub chunks: usize,
    /// Distinct source files.
    pub documents: usize,
    pub dimension: usize,
    pub embedder_name: String,
    pub built_at: String,
}

/// Paths of one domain's corpus.
#[derive(Clone, Debug)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    /// `<data_root>/domains/<domain>/vectorstore`
    pub fn for_domain(data_root: &Path, domain: &str) -> Self {
        Self {
            root: data_root.join("domains").join(domain).join("vectorstore"),
        }
    }

    /// Layout rooted at an explicit `vectorstore` directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Directory of the active generation, if one has been promoted.
    pub fn current_generation(&self) -> Result<Option<PathBuf>, RagError> {
        let pointer = self.root.join(CURRENT_FILE);
        if !pointer.is_file() {
            return Ok(None);
        }
        let name = fs::read_to_string(&pointer)?;
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(RagError::CorruptIndex(format!(
                "invalid generation pointer '{name}' in {}",
                pointer.display()
            )));
        }
        Ok(Some(self.root.join(name)))
    }

    /// Active generation or [`RagError::IndexNotFound`].
    pub fn active_dir(&self) -> Result<PathBuf, RagError> {
        self.current_generation()?
            .ok_or_else(|| RagError::IndexNotFound(self.root.join(CURRENT_FILE)))
    }

    /// Creates a fresh, empty generation directory.
    pub fn create_generation(&self) -> Result<PathBuf, RagError> {
        fs::create_dir_all(&self.root)?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        for seq in 0..1000u32 {
            let dir = self.root.join(format!("{GENERATION_PREFIX}{stamp}-{seq:03}"));
            match fs::create_dir(&dir) {
                Ok(()) => return Ok(dir),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(RagError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("no free generation name under {}", self.root.display()),
        )))
    }

    /// Makes `generation` the active one by atomically replacing `CURRENT`.
    pub fn promote(&self, generation: &Path) -> Result<(), RagError> {
        let name = generation
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| RagError::Config(format!("bad generation path {generation:?}")))?;
        write_atomic(&self.root.join(CURRENT_FILE), name.as_bytes())?;
        sync_dir(&self.root);
        info!(target: "doc_rag::index", root = %self.root.display(), generation = %name, "promoted generation");
        Ok(())
    }

    /// Removes generations other than the active one and its newest predecessor.
    ///
    /// The predecessor stays because a reader may have resolved `CURRENT`
    /// just before the swap. Failures are logged, never returned.
    pub fn prune(&self) {
        let active = match self.current_generation() {
            Ok(Some(dir)) => dir,
            _ => return,
        };
        let Ok(entries) = fs::read_dir(&self.root) else {
            return;
        };

        let mut older: Vec<PathBuf> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_gen = path.is_dir()
                && entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(GENERATION_PREFIX);
            if !is_gen || path == active {
                continue;
            }
            if path.file_name() < active.file_name() {
                older.push(path);
            } else {
                // Newer than the active one: leftover of an aborted build.
                remove_generation(&path);
            }
        }

        older.sort();
        older.pop();
        for path in older {
            remove_generation(&path);
        }
    }
}

/// Best-effort removal of a generation directory.
pub(crate) fn remove_generation(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => debug!(target: "doc_rag::index", path = %path.display(), "removed generation"),
        Err(e) => warn!(
            target: "doc_rag::index",
            path = %path.display(),
            error = %e,
            "failed to remove generation"
        ),
    }
}

/// Writes `bytes` to a sibling temp file, fsyncs it and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RagError> {
    let tmp = staging_path(path);
    {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// `index.json` -> `index.json.tmp`; each target gets its own staging file.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn sync_dir(dir: &Path) {
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
}
