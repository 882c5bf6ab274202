//! Artifact storage for generated files.
//!
//! The plot tool hands its PNG to an [`ArtifactStore`] under a fixed name;
//! the calling agent retrieves it from there later.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Errors raised while saving an artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("invalid artifact name '{0}'")]
    InvalidName(String),
    #[error("failed to write artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A saved artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// 0 for the first save under a name, incremented on each overwrite.
    pub version: u32,
}

/// Receives files produced by tools.
pub trait ArtifactStore: Send + Sync {
    /// Save `bytes` under `name`, replacing any earlier version. Returns
    /// the version number assigned.
    fn save_artifact(&self, name: &str, bytes: &[u8], mime_type: &str)
    -> Result<u32, ArtifactError>;
}

/// Names are flat file names; no separators, no parent references.
fn validate_name(name: &str) -> Result<(), ArtifactError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if bad {
        return Err(ArtifactError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// Writes artifacts as files in one directory, created on first save.
#[derive(Debug)]
pub struct FsArtifactStore {
    dir: PathBuf,
    versions: Mutex<BTreeMap<String, u32>>,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            versions: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save_artifact(
        &self,
        name: &str,
        bytes: &[u8],
        _mime_type: &str,
    ) -> Result<u32, ArtifactError> {
        validate_name(name)?;
        let path = self.path_for(name);
        let io_err = |source| ArtifactError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        std::fs::write(&path, bytes).map_err(io_err)?;

        let mut versions = self.versions.lock().unwrap_or_else(|e| e.into_inner());
        let version = match versions.get(name) {
            Some(v) => v + 1,
            None => 0,
        };
        versions.insert(name.to_string(), version);

        tracing::info!(path = %path.display(), version, "saved artifact");
        Ok(version)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Keeps the latest version of each artifact in memory.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<BTreeMap<String, Artifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Artifact> {
        self.artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn save_artifact(
        &self,
        name: &str,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<u32, ArtifactError> {
        validate_name(name)?;
        let mut artifacts = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
        let version = artifacts.get(name).map(|a| a.version + 1).unwrap_or(0);
        artifacts.insert(
            name.to_string(),
            Artifact {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                bytes: bytes.to_vec(),
                version,
            },
        );
        Ok(version)
    }
}
