//! Per-job workspace directories.
//!
//! Each job gets a fresh directory named after its id under a shared root.
//! The directory is bind-mounted into the sandbox and removed when the
//! [`Workspace`] handle is dropped.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::WorkspaceError;

/// File that receives the request's standard input text.
pub const INPUT_FILE_NAME: &str = "input.txt";

/// Creates workspaces under a shared root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
    host_root: Option<PathBuf>,
}

impl WorkspaceManager {
    /// Workspaces live under `root`, which is also the bind-mount source.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            host_root: None,
        }
    }

    /// Sets the engine-side path of `root`.
    ///
    /// Needed when this process runs in a container and sees the shared
    /// storage at a different path than the engine host does.
    pub fn with_host_root(mut self, host_root: impl Into<PathBuf>) -> Self {
        self.host_root = Some(host_root.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a fresh directory for `job_id`.
    ///
    /// Fails if the directory already exists.
    pub fn create(&self, job_id: &Uuid) -> Result<Workspace, WorkspaceError> {
        let name = job_id.to_string();
        let path = self.root.join(&name);
        let create_err = |source| WorkspaceError::Create {
            path: path.display().to_string(),
            source,
        };

        std::fs::create_dir_all(&self.root).map_err(create_err)?;
        std::fs::create_dir(&path).map_err(create_err)?;

        let host_path = match &self.host_root {
            Some(host_root) => host_root.join(&name),
            None => path.clone(),
        };

        debug!(path = %path.display(), "Workspace created");
        Ok(Workspace {
            path,
            host_path,
            released: false,
        })
    }
}

/// A job's workspace directory, deleted on drop.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    host_path: PathBuf,
    released: bool,
}

impl Workspace {
    /// Local path of the directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the directory as seen by the container engine.
    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    /// Writes `content` to `filename` inside the workspace.
    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, WorkspaceError> {
        if filename.is_empty()
            || filename == "."
            || filename == ".."
            || filename.contains('/')
            || filename.contains('\\')
        {
            return Err(WorkspaceError::InvalidFileName(filename.to_string()));
        }

        let file = self.path.join(filename);
        std::fs::write(&file, content).map_err(|source| WorkspaceError::Write {
            file: filename.to_string(),
            source,
        })?;
        Ok(file)
    }

    /// Removes the directory now instead of at drop.
    pub fn destroy(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match destroy(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Workspace removed"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove workspace"),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release();
    }
}

/// Recursively removes `path`. A missing path is not an error.
pub fn destroy(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
