//! Artifact store adapter. Model files are persisted under an opaque path and
//! handed back as an [`ArtifactRef`]; the coordinator never reads them again.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::model::ArtifactRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind { CentralModel, ClientModel }

impl ArtifactKind {
    pub fn prefix(&self) -> &'static str {
        match self { ArtifactKind::CentralModel => "central_models", ArtifactKind::ClientModel => "client_models" }
    }
}

/// An uploaded file as received from the transport layer.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { file_name: file_name.into(), bytes: bytes.into() }
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn store(&self, kind: ArtifactKind, bytes: &[u8], suggested_name: &str) -> CoordinatorResult<ArtifactRef>;
    fn url_of(&self, artifact: &ArtifactRef) -> String;
    /// Best-effort removal used to roll back an upload whose record failed to commit.
    async fn remove(&self, artifact: &ArtifactRef) -> CoordinatorResult<()>;
}

/// Keeps only `[A-Za-z0-9._-]`, drops any directory part, caps the length.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let mut clean: String = base.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    clean = clean.trim_start_matches('.').to_string();
    if clean.len() > 100 { clean = clean[clean.len() - 100..].to_string(); }
    if clean.is_empty() { "model.bin".into() } else { clean }
}

fn describe(kind: ArtifactKind, bytes: &[u8], suggested_name: &str) -> CoordinatorResult<ArtifactRef> {
    if bytes.is_empty() { return Err(CoordinatorError::validation("model_file is empty")); }
    let path = format!("{}/{}-{}", kind.prefix(), uuid::Uuid::new_v4().simple(), sanitize_file_name(suggested_name));
    Ok(ArtifactRef { path, sha256: hex::encode(Sha256::digest(bytes)), size_bytes: bytes.len() as u64 })
}

/// Files under `root`, served elsewhere at `base_url`.
pub struct FsArtifactStore {
    root: PathBuf,
    base_url: String,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') { base_url.push('/'); }
        Self { root: root.into(), base_url }
    }

    fn resolve(&self, artifact: &ArtifactRef) -> CoordinatorResult<PathBuf> {
        let rel = Path::new(&artifact.path);
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(CoordinatorError::Storage(format!("refusing artifact path '{}'", artifact.path)));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn store(&self, kind: ArtifactKind, bytes: &[u8], suggested_name: &str) -> CoordinatorResult<ArtifactRef> {
        let artifact = describe(kind, bytes, suggested_name)?;
        let target = self.resolve(&artifact)?;
        if let Some(parent) = target.parent() { tokio::fs::create_dir_all(parent).await?; }
        tokio::fs::write(&target, bytes).await?;
        debug!(path=%artifact.path, size=artifact.size_bytes, "artifact_stored");
        Ok(artifact)
    }

    fn url_of(&self, artifact: &ArtifactRef) -> String { format!("{}{}", self.base_url, artifact.path) }

    async fn remove(&self, artifact: &ArtifactRef) -> CoordinatorResult<()> {
        let target = self.resolve(artifact)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => { warn!(error=?e, path=%artifact.path, "artifact_remove_failed"); Err(e.into()) }
        }
    }
}

#[derive(Default)]
pub struct MemoryArtifactStore { files: RwLock<HashMap<String, Vec<u8>>> }

impl MemoryArtifactStore {
    pub fn new() -> Self { Self::default() }
    pub fn contains(&self, artifact: &ArtifactRef) -> bool { self.files.read().contains_key(&artifact.path) }
    pub fn len(&self) -> usize { self.files.read().len() }
    pub fn is_empty(&self) -> bool { self.files.read().is_empty() }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn store(&self, kind: ArtifactKind, bytes: &[u8], suggested_name: &str) -> CoordinatorResult<ArtifactRef> {
        let artifact = describe(kind, bytes, suggested_name)?;
        self.files.write().insert(artifact.path.clone(), bytes.to_vec());
        Ok(artifact)
    }

    fn url_of(&self, artifact: &ArtifactRef) -> String { format!("mem://{}", artifact.path) }

    async fn remove(&self, artifact: &ArtifactRef) -> CoordinatorResult<()> {
        self.files.write().remove(&artifact.path);
        Ok(())
    }
}
