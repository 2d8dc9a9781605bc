//! Run/checkpoint manager (C11): allocates run ids, tracks per-step status
//! transitions, and resolves where an interrupted run should resume from
//! (spec §4.11).

use chrono::{DateTime, Duration, Utc};
use newsgate_common::types::{PipelineStepState, StepName, StepStatus};
use newsgate_common::{CancellationToken, Result};
use newsgate_store::Store;
use tracing::{info, warn};
use uuid::Uuid;

/// Rows older than this are purgeable unless still `running`/`paused`.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub retention_days: i64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { retention_days: DEFAULT_RETENTION_DAYS }
    }
}

pub struct RunManager<'a> {
    store: &'a dyn Store,
    run_id: String,
    options: RunOptions,
}

impl<'a> RunManager<'a> {
    /// Start a brand new run: allocates a run id and seeds all five
    /// canonical steps at `pending`.
    pub async fn start(store: &'a dyn Store, options: RunOptions) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        for step in StepName::ORDER {
            store
                .upsert_step_state(PipelineStepState {
                    run_id: run_id.clone(),
                    step_name: step,
                    status: StepStatus::Pending,
                    started_at: None,
                    completed_at: None,
                    metadata: serde_json::Value::Null,
                    article_count: 0,
                    match_count: 0,
                    error_message: None,
                    can_resume: true,
                })
                .await?;
        }
        info!(run_id, "run started");
        Ok(Self { store, run_id, options })
    }

    /// Resume an existing run id, trusting its already-seeded step rows.
    pub fn resume(store: &'a dyn Store, run_id: String, options: RunOptions) -> Self {
        Self { store, run_id, options }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn enter_step(&self, step: StepName) -> Result<()> {
        self.store
            .upsert_step_state(PipelineStepState {
                run_id: self.run_id.clone(),
                step_name: step,
                status: StepStatus::Running,
                started_at: Some(Utc::now()),
                completed_at: None,
                metadata: serde_json::Value::Null,
                article_count: 0,
                match_count: 0,
                error_message: None,
                can_resume: true,
            })
            .await
    }

    pub async fn complete_step(&self, step: StepName, article_count: i32, match_count: i32) -> Result<()> {
        self.store
            .upsert_step_state(PipelineStepState {
                run_id: self.run_id.clone(),
                step_name: step,
                status: StepStatus::Completed,
                started_at: None,
                completed_at: Some(Utc::now()),
                metadata: serde_json::Value::Null,
                article_count,
                match_count,
                error_message: None,
                can_resume: true,
            })
            .await
    }

    pub async fn fail_step(&self, step: StepName, error_message: &str) -> Result<()> {
        warn!(run_id = %self.run_id, step = %step, error_message, "step failed");
        self.store
            .upsert_step_state(PipelineStepState {
                run_id: self.run_id.clone(),
                step_name: step,
                status: StepStatus::Failed,
                started_at: None,
                completed_at: Some(Utc::now()),
                metadata: serde_json::Value::Null,
                article_count: 0,
                match_count: 0,
                error_message: Some(error_message.to_string()),
                can_resume: true,
            })
            .await
    }

    /// Pause every currently-running step for this run, attaching `reason`.
    /// Called from the signal handler when the cooperative cancellation
    /// token fires between suspension points.
    pub async fn pause_running_steps(&self, reason: &str) -> Result<()> {
        for state in self.store.steps_for_run(&self.run_id).await? {
            if state.status == StepStatus::Running {
                self.store
                    .upsert_step_state(PipelineStepState {
                        status: StepStatus::Paused,
                        error_message: Some(reason.to_string()),
                        ..state
                    })
                    .await?;
            }
        }
        Ok(())
    }

    /// The earliest step in {pending, failed, paused} by canonical order;
    /// `None` means every step already completed.
    pub async fn next_step_to_run(&self) -> Result<Option<StepName>> {
        for step in StepName::ORDER {
            match self.store.get_step_state(&self.run_id, step).await? {
                None => return Ok(Some(step)),
                Some(state) if matches!(state.status, StepStatus::Pending | StepStatus::Failed | StepStatus::Paused) => {
                    return Ok(Some(step))
                }
                Some(_) => continue,
            }
        }
        Ok(None)
    }

    pub async fn purge_old_steps(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - Duration::days(self.options.retention_days);
        self.store.purge_step_states_before(cutoff).await
    }
}

/// Runs `body` for `step`, transitioning the step state on entry and on
/// every exit path, observing `cancel` before the step even starts.
pub async fn run_step<F, Fut, T>(manager: &RunManager<'_>, cancel: &CancellationToken, step: StepName, body: F) -> Result<Option<T>>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(T, i32, i32)>>,
{
    if cancel.is_cancelled() {
        manager.pause_running_steps("cancelled before step start").await?;
        return Ok(None);
    }
    manager.enter_step(step).await?;
    match body().await {
        Ok((value, article_count, match_count)) => {
            manager.complete_step(step, article_count, match_count).await?;
            Ok(Some(value))
        }
        Err(e) => {
            manager.fail_step(step, &e.to_string()).await?;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsgate_store::InMemoryStore;

    #[tokio::test]
    async fn fresh_run_resumes_from_collection() {
        let store = InMemoryStore::new();
        let manager = RunManager::start(&store, RunOptions::default()).await.unwrap();
        assert_eq!(manager.next_step_to_run().await.unwrap(), Some(StepName::Collection));
    }

    #[tokio::test]
    async fn completed_step_advances_resume_point() {
        let store = InMemoryStore::new();
        let manager = RunManager::start(&store, RunOptions::default()).await.unwrap();
        manager.enter_step(StepName::Collection).await.unwrap();
        manager.complete_step(StepName::Collection, 10, 0).await.unwrap();
        assert_eq!(manager.next_step_to_run().await.unwrap(), Some(StepName::Filtering));
    }

    #[tokio::test]
    async fn paused_step_is_resumed_ahead_of_later_pending_steps() {
        let store = InMemoryStore::new();
        let manager = RunManager::start(&store, RunOptions::default()).await.unwrap();
        manager.complete_step(StepName::Collection, 10, 0).await.unwrap();
        manager.enter_step(StepName::Filtering).await.unwrap();
        manager.pause_running_steps("sigterm").await.unwrap();
        assert_eq!(manager.next_step_to_run().await.unwrap(), Some(StepName::Filtering));
    }

    #[tokio::test]
    async fn cooperative_cancellation_pauses_before_step_runs() {
        let store = InMemoryStore::new();
        let manager = RunManager::start(&store, RunOptions::default()).await.unwrap();
        manager.enter_step(StepName::Collection).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<Option<()>> = run_step(&manager, &cancel, StepName::Filtering, || async { Ok(((), 0, 0)) }).await;
        assert!(result.unwrap().is_none());
        let state = store.get_step_state(manager.run_id(), StepName::Collection).await.unwrap().unwrap();
        assert_eq!(state.status, StepStatus::Paused);
    }
}
