//! Artifact storage rooted at the workspace directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// Keyed text storage for generated sources and tests.
///
/// Locations are workspace-relative. Writes replace any previous contents.
pub trait ArtifactStore: Send + Sync {
    fn write(&self, location: &Path, contents: &str) -> Result<()>;

    /// Stored contents, or `None` if nothing was written at `location`.
    fn read(&self, location: &Path) -> Result<Option<String>>;

    /// Absolute path for `location`, for handing to external tools.
    fn resolve(&self, location: &Path) -> Result<PathBuf>;
}

/// Filesystem store writing under a single root directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn write(&self, location: &Path, contents: &str) -> Result<()> {
        let path = self.resolve(location)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write artifact {}", path.display()))?;
        debug!(path = %path.display(), bytes = contents.len(), "artifact written");
        Ok(())
    }

    fn read(&self, location: &Path) -> Result<Option<String>> {
        let path = self.resolve(location)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read artifact {}", path.display())),
        }
    }

    fn resolve(&self, location: &Path) -> Result<PathBuf> {
        ensure_relative(location)?;
        let joined = self.root.join(location);
        std::path::absolute(&joined).with_context(|| format!("resolve {}", joined.display()))
    }
}

/// Reject empty, absolute, or parent-escaping locations.
fn ensure_relative(location: &Path) -> Result<()> {
    if location.as_os_str().is_empty() {
        return Err(anyhow!("artifact location is empty"));
    }
    for component in location.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(anyhow!(
                    "artifact location must stay inside the workspace: {}",
                    location.display()
                ));
            }
        }
    }
    Ok(())
}
