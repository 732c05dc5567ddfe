//! Keyed store of per-project verification state.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;
use tracing::{debug, info};

use super::canonical::fingerprint;
use super::Project;
use crate::error::{PipelineError, PipelineResult};

#[derive(Debug)]
struct StoredProject {
    project: Project,
    /// Fingerprint of the canonical serialization of `project`.
    fingerprint: String,
}

impl StoredProject {
    fn new(project: Project) -> Self {
        let fingerprint = fingerprint(&project).unwrap_or_default();
        Self {
            project,
            fingerprint,
        }
    }
}

/// Thread-safe project registry.
///
/// Every committed write bumps a revision number that observers can watch.
/// Projects are never removed, only replaced by id.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    inner: Arc<RwLock<BTreeMap<String, StoredProject>>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectRegistry {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(BTreeMap::new())),
            revision: Arc::new(revision),
        }
    }

    /// Insert or replace a project by id. Always commits.
    pub fn upsert(&self, project: Project) {
        if let Ok(mut projects) = self.inner.write() {
            info!(project_id = %project.id, "Committing project");
            projects.insert(project.id.clone(), StoredProject::new(project));
            self.bump();
        }
    }

    /// Look a project up by id.
    pub fn get(&self, project_id: &str) -> PipelineResult<Project> {
        self.inner
            .read()
            .ok()
            .and_then(|projects| projects.get(project_id).map(|s| s.project.clone()))
            .ok_or_else(|| PipelineError::ProjectNotFound(project_id.to_string()))
    }

    /// Whether a project with this id is registered.
    pub fn contains(&self, project_id: &str) -> bool {
        self.inner
            .read()
            .map(|projects| projects.contains_key(project_id))
            .unwrap_or(false)
    }

    /// Ids of every registered project, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.inner
            .read()
            .map(|projects| projects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<Project> {
        self.inner
            .read()
            .map(|projects| projects.values().map(|s| s.project.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|projects| projects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `update` to a copy of the stored project and commit the copy
    /// only if its canonical serialization differs from the stored one.
    ///
    /// Returns the committed project, or `None` when nothing changed. The
    /// comparison and the write happen under one lock.
    pub fn commit_if_changed<F>(&self, project_id: &str, update: F) -> PipelineResult<Option<Project>>
    where
        F: FnOnce(&mut Project),
    {
        self.commit_if_changed_when(project_id, || true, update)
    }

    /// Like [`ProjectRegistry::commit_if_changed`], but only while `current`
    /// holds. `current` is evaluated under the write lock.
    ///
    /// Returns [`PipelineError::Interrupted`] when `current` is false.
    pub fn commit_if_changed_when<C, F>(
        &self,
        project_id: &str,
        current: C,
        update: F,
    ) -> PipelineResult<Option<Project>>
    where
        C: FnOnce() -> bool,
        F: FnOnce(&mut Project),
    {
        let mut projects = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !current() {
            debug!(project_id, "Dropping stale project update");
            return Err(PipelineError::Interrupted(project_id.to_string()));
        }
        let stored = projects
            .get_mut(project_id)
            .ok_or_else(|| PipelineError::ProjectNotFound(project_id.to_string()))?;

        let mut candidate = stored.project.clone();
        update(&mut candidate);
        let candidate = StoredProject::new(candidate);

        if !candidate.fingerprint.is_empty() && candidate.fingerprint == stored.fingerprint {
            debug!(project_id, "Skipping commit, project unchanged");
            return Ok(None);
        }

        let committed = candidate.project.clone();
        *stored = candidate;
        drop(projects);

        debug!(project_id, "Committed project update");
        self.bump();
        Ok(Some(committed))
    }

    /// Apply `update` to every project, committing each one as a whole.
    pub fn update_all<F>(&self, mut update: F) -> usize
    where
        F: FnMut(&mut Project),
    {
        let Ok(mut projects) = self.inner.write() else {
            return 0;
        };
        let mut count = 0;
        for stored in projects.values_mut() {
            let mut project = stored.project.clone();
            update(&mut project);
            *stored = StoredProject::new(project);
            count += 1;
        }
        drop(projects);

        if count > 0 {
            self.bump();
        }
        count
    }

    /// Number of committed writes so far.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Observe committed writes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}
