use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::errors::{Result, SandboxError};
use crate::path;

#[derive(Clone, Debug)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    pub max_source_bytes: u64,
}

impl WorkspaceConfig {
    pub fn new(root: impl AsRef<Path>, max_source_bytes: u64) -> Result<Self> {
        let root = path::ensure_absolute_root(root.as_ref())?;
        if max_source_bytes == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_source_bytes must be greater than zero".to_string(),
            ));
        }
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            max_source_bytes,
        })
    }
}

/// Hands out one scratch directory per program run.
#[derive(Clone, Debug)]
pub struct Workspaces {
    config: WorkspaceConfig,
}

impl Workspaces {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    #[instrument(skip(self))]
    pub fn create(&self) -> Result<RunWorkspace> {
        let name = Uuid::new_v4().simple().to_string();
        let dir = path::resolve(&self.config.root, &name)?;
        fs::create_dir_all(&dir)?;
        debug!(workspace = %name, "workspace created");
        Ok(RunWorkspace {
            name,
            dir,
            max_source_bytes: self.config.max_source_bytes,
            sources: Vec::new(),
            removed: false,
        })
    }
}

/// Directory holding the sources of a single run. Removed on [`RunWorkspace::remove`]
/// or, failing that, when dropped.
#[derive(Debug)]
pub struct RunWorkspace {
    name: String,
    dir: PathBuf,
    max_source_bytes: u64,
    sources: Vec<String>,
    removed: bool,
}

impl RunWorkspace {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    #[instrument(skip(self, content), fields(workspace = %self.name, size = content.len()))]
    pub fn write_source(&mut self, name: &str, content: &str) -> Result<PathBuf> {
        let target = path::resolve(&self.dir, name)?;
        let size = content.len() as u64;
        if size > self.max_source_bytes {
            return Err(SandboxError::SourceTooLarge {
                name: name.to_string(),
                size,
                limit: self.max_source_bytes,
            });
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content)?;
        if !self.sources.iter().any(|existing| existing == name) {
            self.sources.push(name.to_string());
        }
        Ok(target)
    }

    #[instrument(skip(self), fields(workspace = %self.name))]
    pub fn remove(mut self) -> Result<()> {
        self.removed = true;
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        if self.removed || !self.dir.exists() {
            return;
        }
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            warn!(workspace = %self.name, error = %err, "failed to remove workspace");
        }
    }
}
