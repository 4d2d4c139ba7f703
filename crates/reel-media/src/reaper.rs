//! Resource reaper.
//!
//! Every decoder-backed clip holds a [`HandleGuard`] registered in the task's
//! [`HandleRegistry`]; scratch artifacts a clip owns (subtitle text files) are
//! held as [`ScratchFile`]s. [`Release::release`] tears both down recursively
//! and is idempotent; `Drop` runs the same teardown for anything not released
//! explicitly.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Identifier of one open decoder handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

#[derive(Debug, Default)]
struct RegistryState {
    open: HashSet<u64>,
    peak: usize,
    opened_total: u64,
}

/// Per-task bookkeeping of open decoder handles.
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    next_id: Arc<AtomicU64>,
    state: Arc<Mutex<RegistryState>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened handle for `path`.
    pub fn open(&self, path: &Path) -> HandleGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut state) = self.state.lock() {
            state.open.insert(id);
            state.opened_total += 1;
            state.peak = state.peak.max(state.open.len());
        }
        debug!(handle = id, path = %path.display(), "Opened decoder handle");
        HandleGuard {
            registry: self.clone(),
            id: HandleId(id),
            closed: false,
        }
    }

    fn close(&self, id: HandleId) -> bool {
        match self.state.lock() {
            Ok(mut state) => state.open.remove(&id.0),
            Err(_) => false,
        }
    }

    /// Handles currently open.
    pub fn open_count(&self) -> usize {
        self.state.lock().map(|s| s.open.len()).unwrap_or(0)
    }

    /// Highest number of simultaneously open handles since creation or the
    /// last [`Self::reset_peak`].
    pub fn peak(&self) -> usize {
        self.state.lock().map(|s| s.peak).unwrap_or(0)
    }

    pub fn opened_total(&self) -> u64 {
        self.state.lock().map(|s| s.opened_total).unwrap_or(0)
    }

    pub fn reset_peak(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.peak = state.open.len();
        }
    }
}

/// An open decoder handle. Closed on [`HandleGuard::close`] or drop.
#[derive(Debug)]
pub struct HandleGuard {
    registry: HandleRegistry,
    id: HandleId,
    closed: bool,
}

impl HandleGuard {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the handle. Returns `true` the first time only.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.registry.close(self.id)
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// A scratch file owned by a clip, removed on release.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    removed: bool,
}

impl ScratchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file. Returns `true` if a file was deleted by this call.
    pub fn remove(&mut self) -> bool {
        if self.removed {
            return false;
        }
        self.removed = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file");
                false
            }
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// What one release pass tore down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub handles_closed: usize,
    pub files_removed: usize,
}

impl ReleaseReport {
    pub fn merge(&mut self, other: ReleaseReport) {
        self.handles_closed += other.handles_closed;
        self.files_removed += other.files_removed;
    }

    pub fn is_empty(&self) -> bool {
        self.handles_closed == 0 && self.files_removed == 0
    }
}

/// Deterministic teardown of held resources.
pub trait Release {
    /// Release everything this object and its children hold. Calling it
    /// again is a no-op returning an empty report.
    fn release(&mut self) -> ReleaseReport;
}

/// Release a batch of objects, accumulating the report.
pub fn release_all<'a, R, I>(items: I) -> ReleaseReport
where
    R: Release + 'a,
    I: IntoIterator<Item = &'a mut R>,
{
    let mut report = ReleaseReport::default();
    for item in items {
        report.merge(item.release());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_registry_counts_and_peak() {
        let registry = HandleRegistry::new();
        let mut a = registry.open(Path::new("a.mp4"));
        let b = registry.open(Path::new("b.mp4"));
        assert_eq!(registry.open_count(), 2);
        assert!(a.close());
        assert!(!a.close());
        drop(b);
        assert_eq!(registry.open_count(), 0);
        assert_eq!(registry.peak(), 2);
        assert_eq!(registry.opened_total(), 2);

        registry.reset_peak();
        assert_eq!(registry.peak(), 0);
    }

    #[test]
    fn test_scratch_file_removed_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub-1.txt");
        std::fs::write(&path, "hello").unwrap();

        let mut file = ScratchFile::new(&path);
        assert!(file.remove());
        assert!(!path.exists());
        assert!(!file.remove());
    }

    #[test]
    fn test_scratch_file_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub-2.txt");
        std::fs::write(&path, "hello").unwrap();
        drop(ScratchFile::new(&path));
        assert!(!path.exists());
    }
}
