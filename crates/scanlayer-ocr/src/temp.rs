// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-job temporary file ownership.
//
// Every intermediate file a job creates is registered here.  Cleanup removes
// all tracked files that were not explicitly retained and runs on drop, so
// it happens on success, failure, and cancellation alike.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use scanlayer_core::error::Result;
use scanlayer_core::types::JobId;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct TempState {
    tracked: BTreeSet<PathBuf>,
    retained: HashSet<PathBuf>,
}

/// Owner of one job's working directory and the files inside it.
#[derive(Debug)]
pub struct TempRegistry {
    root: PathBuf,
    state: Mutex<TempState>,
}

impl TempRegistry {
    /// Create `<temp_root>/scanlayer-<job id>`.
    pub fn create(temp_root: &Path, job_id: JobId) -> Result<Self> {
        let root = temp_root.join(format!("scanlayer-{job_id}"));
        std::fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "job working directory created");
        Ok(Self {
            root,
            state: Mutex::new(TempState::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for `name` inside the job directory, tracked for cleanup.
    pub fn file(&self, name: &str) -> PathBuf {
        let path = self.root.join(name);
        self.track(&path);
        path
    }

    pub fn track(&self, path: &Path) {
        self.lock().tracked.insert(path.to_path_buf());
    }

    /// Exclude `path` from cleanup; it outlives the job.
    pub fn retain(&self, path: &Path) {
        self.lock().retained.insert(path.to_path_buf());
    }

    pub fn is_retained(&self, path: &Path) -> bool {
        self.lock().retained.contains(path)
    }

    /// Remove every tracked, non-retained file, then the job directory if it
    /// ended up empty.  Safe to call repeatedly; returns the number of files
    /// removed by this call.
    pub fn cleanup(&self) -> usize {
        let mut state = self.lock();
        let tracked = std::mem::take(&mut state.tracked);
        let mut removed = 0;

        for path in tracked {
            if state.retained.contains(&path) {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), %err, "failed to remove temp file"),
            }
        }

        // Only succeeds when nothing (e.g. a retained result) is left inside.
        if std::fs::remove_dir(&self.root).is_ok() {
            debug!(root = %self.root.display(), "job working directory removed");
        }
        removed
    }

    fn lock(&self) -> MutexGuard<'_, TempState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for TempRegistry {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_removes_tracked_files_and_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let temp = TempRegistry::create(dir.path(), JobId::new()).expect("create");
        let a = temp.file("p0001_r300.png");
        let b = temp.file("p0001_ocr.tsv");
        std::fs::write(&a, b"png").expect("write");
        std::fs::write(&b, b"tsv").expect("write");

        assert_eq!(temp.cleanup(), 2);
        assert!(!a.exists());
        assert!(!temp.root().exists());
    }

    #[test]
    fn retained_files_survive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let temp = TempRegistry::create(dir.path(), JobId::new()).expect("create");
        let out = temp.file("searchable.pdf");
        let scratch = temp.file("overlay.pdf");
        std::fs::write(&out, b"%PDF").expect("write");
        std::fs::write(&scratch, b"%PDF").expect("write");
        temp.retain(&out);

        assert_eq!(temp.cleanup(), 1);
        assert!(out.exists());
        assert!(!scratch.exists());
        assert!(temp.is_retained(&out));
    }

    #[test]
    fn cleanup_is_idempotent_and_tolerates_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let temp = TempRegistry::create(dir.path(), JobId::new()).expect("create");
        temp.file("never-written.pdf");
        assert_eq!(temp.cleanup(), 0);
        assert_eq!(temp.cleanup(), 0);
    }

    #[test]
    fn drop_runs_cleanup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = {
            let temp = TempRegistry::create(dir.path(), JobId::new()).expect("create");
            let path = temp.file("p0002_ocr.pdf");
            std::fs::write(&path, b"%PDF").expect("write");
            path
        };
        assert!(!path.exists());
    }
}
