//! In-process engine with scripted behaviour.
//!
//! Used by tests and demos: it records what it is sent, answers after a
//! configurable latency and finishes jobs after a scripted number of status
//! polls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{EngineBackend, EngineError, JobState};
use crate::entities::{AnalysisConfig, EntityRef, ModelEntity};
use crate::results::{ResultQuery, ResultRecord};

#[derive(Debug, Clone)]
struct ScriptedJob {
    config: AnalysisConfig,
    polls_left: u32,
}

#[derive(Debug, Default)]
struct Script {
    polls_before_done: u32,
    failure: Option<String>,
    results: Vec<ResultRecord>,
    jobs: HashMap<String, ScriptedJob>,
    started: u64,
    resets: usize,
    upserts: Vec<ModelEntity>,
    removals: Vec<EntityRef>,
}

/// Engine whose answers are scripted by the caller
#[derive(Debug)]
pub struct ScriptedEngine {
    latency: Duration,
    reachable: AtomicBool,
    script: Mutex<Script>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        ScriptedEngine::new()
    }
}

impl ScriptedEngine {
    /// Reachable engine that completes every job on the first status poll
    pub fn new() -> Self {
        ScriptedEngine {
            latency: Duration::ZERO,
            reachable: AtomicBool::new(true),
            script: Mutex::new(Script::default()),
        }
    }

    /// Delay every call (builder pattern)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Report `Running` for this many status polls before finishing (builder pattern)
    pub fn with_polls(self, polls: u32) -> Self {
        self.script.lock().polls_before_done = polls;
        self
    }

    /// Fail every job with `reason` (builder pattern)
    pub fn failing(self, reason: &str) -> Self {
        self.script.lock().failure = Some(reason.to_string());
        self
    }

    /// Results returned for completed jobs (builder pattern)
    pub fn with_results(self, records: Vec<ResultRecord>) -> Self {
        self.script.lock().results = records;
        self
    }

    /// Start refusing (or accepting) connections
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Every entity sent since the last reset, in arrival order
    pub fn upserts(&self) -> Vec<ModelEntity> {
        self.script.lock().upserts.clone()
    }

    pub fn removals(&self) -> Vec<EntityRef> {
        self.script.lock().removals.clone()
    }

    pub fn resets(&self) -> usize {
        self.script.lock().resets
    }

    pub fn analyses_started(&self) -> u64 {
        self.script.lock().started
    }

    /// Configuration a job was started with
    pub fn job_config(&self, job: &str) -> Option<AnalysisConfig> {
        self.script.lock().jobs.get(job).map(|j| j.config.clone())
    }

    async fn answer(&self) -> Result<(), EngineError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::Unreachable("scripted engine is offline".to_string()))
        }
    }
}

#[async_trait]
impl EngineBackend for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn reset_model(&self, _model_name: &str) -> Result<(), EngineError> {
        self.answer().await?;
        let mut script = self.script.lock();
        script.resets += 1;
        script.upserts.clear();
        script.removals.clear();
        Ok(())
    }

    async fn upsert(&self, entity: &ModelEntity) -> Result<(), EngineError> {
        self.answer().await?;
        self.script.lock().upserts.push(entity.clone());
        Ok(())
    }

    async fn remove(&self, target: &EntityRef) -> Result<(), EngineError> {
        self.answer().await?;
        self.script.lock().removals.push(target.clone());
        Ok(())
    }

    async fn start_analysis(&self, config: &AnalysisConfig) -> Result<String, EngineError> {
        self.answer().await?;
        let mut script = self.script.lock();
        script.started += 1;
        let job = format!("job-{}", script.started);
        let polls_left = script.polls_before_done;
        script.jobs.insert(
            job.clone(),
            ScriptedJob {
                config: config.clone(),
                polls_left,
            },
        );
        Ok(job)
    }

    async fn job_status(&self, job: &str) -> Result<JobState, EngineError> {
        self.answer().await?;
        let mut script = self.script.lock();
        let failure = script.failure.clone();
        let entry = script
            .jobs
            .get_mut(job)
            .ok_or_else(|| EngineError::UnknownJob(job.to_string()))?;
        if entry.polls_left > 0 {
            entry.polls_left -= 1;
            return Ok(JobState::Running { progress: None });
        }
        Ok(match failure {
            Some(reason) => JobState::Failed { reason },
            None => JobState::Completed,
        })
    }

    async fn job_results(&self, job: &str, query: &ResultQuery) -> Result<Vec<ResultRecord>, EngineError> {
        self.answer().await?;
        let script = self.script.lock();
        let entry = script
            .jobs
            .get(job)
            .ok_or_else(|| EngineError::UnknownJob(job.to_string()))?;
        if entry.polls_left > 0 {
            return Err(EngineError::NotFinished(job.to_string()));
        }
        if let Some(reason) = &script.failure {
            return Err(EngineError::Rejected {
                code: "JOB_FAILED".to_string(),
                message: reason.clone(),
            });
        }
        Ok(script
            .results
            .iter()
            .filter(|r| query.ids.is_empty() || query.ids.contains(&r.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ResultKind;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_polls_then_completes() {
        let engine = ScriptedEngine::new().with_polls(2);
        let job = engine.start_analysis(&AnalysisConfig::default()).await.unwrap();
        assert_eq!(engine.job_status(&job).await.unwrap(), JobState::Running { progress: None });
        let query = ResultQuery::new(ResultKind::Deformation);
        assert!(matches!(engine.job_results(&job, &query).await, Err(EngineError::NotFinished(_))));
        engine.job_status(&job).await.unwrap();
        assert_eq!(engine.job_status(&job).await.unwrap(), JobState::Completed);
    }

    #[tokio::test]
    async fn test_results_filtered_by_id() {
        let record = |id| ResultRecord {
            id,
            components: BTreeMap::from([("dz".to_string(), -0.01)]),
        };
        let engine = ScriptedEngine::new().with_results(vec![record(1), record(2)]);
        let job = engine.start_analysis(&AnalysisConfig::default()).await.unwrap();
        let query = ResultQuery::new(ResultKind::Deformation).for_ids([2]);
        let records = engine.job_results(&job, &query).await.unwrap();
        assert_eq!(records, vec![record(2)]);
    }

    #[tokio::test]
    async fn test_unreachable_and_unknown_job() {
        let engine = ScriptedEngine::new();
        assert!(matches!(engine.job_status("job-9").await, Err(EngineError::UnknownJob(_))));
        engine.set_reachable(false);
        assert!(matches!(engine.reset_model("m").await, Err(EngineError::Unreachable(_))));
    }
}
