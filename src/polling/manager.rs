//! Cancellable repeating tasks, one per (project, polling target).
//!
//! Each loop runs on its own tokio task and awaits every tick before sleeping
//! again, so a key never has two requests in flight. Cancellation is
//! cooperative: the loop checks its token before every tick, and the tick
//! itself is handed the token so it can drop a response that arrives after
//! cancellation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::PollingConfig;
use crate::error::PipelineResult;
use crate::pipeline::stage::PollingTarget;
use crate::reporting::ErrorReporter;

/// What a loop does after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Poll again after the next period.
    Continue,
    /// Terminal state reached, stop the loop.
    Stop,
}

/// Identifies a polling loop: at most one runs per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoopKey {
    pub project_id: String,
    pub target: PollingTarget,
}

impl LoopKey {
    pub fn new(project_id: impl Into<String>, target: PollingTarget) -> Self {
        Self {
            project_id: project_id.into(),
            target,
        }
    }
}

#[derive(Debug)]
struct LoopEntry {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns every active polling loop.
///
/// Starting a loop for a key that already has one cancels the older loop:
/// the last starter owns cancellation of the key.
#[derive(Debug, Clone)]
pub struct PollingLoopManager {
    config: PollingConfig,
    loops: Arc<Mutex<HashMap<LoopKey, LoopEntry>>>,
    generation: Arc<AtomicU64>,
    reporter: ErrorReporter,
}

impl PollingLoopManager {
    pub fn new(config: PollingConfig, reporter: ErrorReporter) -> Self {
        Self {
            config,
            loops: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            reporter,
        }
    }

    /// Start a loop that calls `tick` once per period until it stops.
    ///
    /// - `Ok(Tick::Stop)` ends the loop.
    /// - An expected error (project not found, interrupted by a reset) skips
    ///   the tick.
    /// - Any other error cancels the loop and goes to the error reporter.
    ///
    /// Must be called from within a tokio runtime. Returns the loop's token.
    pub fn start<F, Fut>(&self, key: LoopKey, mut tick: F) -> CancellationToken
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = PipelineResult<Tick>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let interval = self.config.interval();

        let task_token = token.clone();
        let task_key = key.clone();
        let loops = Arc::clone(&self.loops);
        let reporter = self.reporter.clone();

        // Held across the spawn so the task cannot deregister before it is registered.
        let mut entries = self.entries();
        if let Some(previous) = entries.remove(&key) {
            debug!(project_id = %key.project_id, target = %key.target, "Replacing polling loop");
            previous.token.cancel();
        }

        let handle = tokio::spawn(async move {
            let project_id = task_key.project_id.clone();
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                match tick(task_token.clone()).await {
                    Ok(Tick::Continue) => {}
                    Ok(Tick::Stop) => {
                        debug!(project_id = %project_id, target = %task_key.target, "Polling loop reached terminal state");
                        break;
                    }
                    Err(err) if err.is_expected() => {
                        debug!(project_id = %project_id, target = %task_key.target, error = %err, "Skipping tick");
                    }
                    Err(err) => {
                        if !task_token.is_cancelled() {
                            task_token.cancel();
                            reporter.report(&err, Some(&project_id));
                        }
                        break;
                    }
                }

                if task_token.is_cancelled() {
                    break;
                }
            }

            task_token.cancel();
            if let Ok(mut entries) = loops.lock() {
                if entries.get(&task_key).is_some_and(|e| e.generation == generation) {
                    entries.remove(&task_key);
                }
            }
        });

        info!(project_id = %key.project_id, target = %key.target, "Started polling loop");
        entries.insert(
            key,
            LoopEntry {
                generation,
                token: token.clone(),
                handle,
            },
        );

        token
    }

    /// Cancel the loop for `key`. No-op if there is none.
    pub fn cancel(&self, key: &LoopKey) -> bool {
        match self.entries().remove(key) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every loop of a project, all stages and targets.
    pub fn cancel_project(&self, project_id: &str) -> usize {
        let mut entries = self.entries();
        let keys: Vec<LoopKey> = entries
            .keys()
            .filter(|k| k.project_id == project_id)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(entry) = entries.remove(key) {
                entry.token.cancel();
            }
        }
        keys.len()
    }

    /// Cancel every loop.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<LoopEntry> = self.entries().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.token.cancel();
        }
        drained.len()
    }

    /// Cancel every loop and wait for their tasks to finish.
    pub async fn shutdown(&self) {
        let drained: Vec<LoopEntry> = self.entries().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.token.cancel();
        }
        futures::future::join_all(drained.into_iter().map(|e| e.handle)).await;
    }

    pub fn is_active(&self, key: &LoopKey) -> bool {
        self.entries()
            .get(key)
            .is_some_and(|e| !e.token.is_cancelled() && !e.handle.is_finished())
    }

    /// Keys of every loop that is still running.
    pub fn active_keys(&self) -> Vec<LoopKey> {
        self.entries()
            .iter()
            .filter(|(_, e)| !e.token.is_cancelled() && !e.handle.is_finished())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active_keys().len()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<LoopKey, LoopEntry>> {
        self.loops.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClientError, PipelineError};
    use crate::pipeline::session::ResetLock;
    use crate::pipeline::stage::JobStage;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn manager() -> PollingLoopManager {
        let config = PollingConfig::new().with_interval(Duration::from_millis(10));
        PollingLoopManager::new(config, ErrorReporter::new(ResetLock::new()))
    }

    fn key() -> LoopKey {
        LoopKey::new("p1", PollingTarget::BitcodeGenerationProgress)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_loop_ticks_until_stop() {
        let manager = manager();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        manager.start(key(), move |_| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(if n >= 3 { Tick::Stop } else { Tick::Continue })
            }
        });

        assert!(wait_until(|| !manager.is_active(&key())).await);
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_project_not_found_skips_tick() {
        let manager = manager();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        manager.start(key(), move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::ProjectNotFound("p1".to_string()))
            }
        });

        assert!(wait_until(|| ticks.load(Ordering::SeqCst) >= 3).await);
        assert!(manager.is_active(&key()));
        assert!(manager.reporter.log().is_empty());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_fault_cancels_loop_and_is_reported() {
        let manager = manager();

        let token = manager.start(key(), |_| async {
            Err(PipelineError::Client(ClientError::Unreachable(
                "connection refused".to_string(),
            )))
        });

        assert!(wait_until(|| token.is_cancelled()).await);
        assert!(wait_until(|| !manager.is_active(&key())).await);
        assert_eq!(manager.reporter.log().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let manager = manager();
        let token = manager.start(key(), |_| async { Ok(Tick::Continue) });

        assert!(manager.cancel(&key()));
        assert!(!manager.cancel(&key()));
        assert!(token.is_cancelled());
        assert!(!manager.cancel(&LoopKey::new("never", PollingTarget::SymbolicExecutionReport)));
    }

    #[tokio::test]
    async fn test_restarting_a_key_cancels_previous_loop() {
        let manager = manager();
        let first = manager.start(key(), |_| async { Ok(Tick::Continue) });
        let second = manager.start(key(), |_| async { Ok(Tick::Continue) });

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(manager.active_count(), 1);

        // The replaced loop must not deregister its successor when it exits.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(manager.is_active(&key()));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_project_leaves_other_projects() {
        let manager = manager();
        for target in JobStage::BitcodeGeneration.targets() {
            manager.start(LoopKey::new("p1", target), |_| async { Ok(Tick::Continue) });
        }
        manager.start(
            LoopKey::new("p2", PollingTarget::BitcodeGenerationProgress),
            |_| async { Ok(Tick::Continue) },
        );

        assert_eq!(manager.cancel_project("p1"), 2);
        assert_eq!(manager.active_keys(), vec![LoopKey::new(
            "p2",
            PollingTarget::BitcodeGenerationProgress
        )]);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_error_after_cancellation_is_discarded() {
        let manager = manager();

        manager.start(key(), |token: CancellationToken| async move {
            token.cancel();
            Err(PipelineError::Client(ClientError::Unreachable("late".to_string())))
        });

        assert!(wait_until(|| !manager.is_active(&key())).await);
        assert!(manager.reporter.log().is_empty());
    }
}
