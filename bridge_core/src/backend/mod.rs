//! # Analysis Engine Backends
//!
//! The structural solver is an external program. This module defines the
//! narrow contract an engine integration implements ([`EngineBackend`]) and
//! the [`BackendAdapter`] every provider call goes through.
//!
//! The adapter bounds every engine call with a timeout and converts raw
//! [`EngineError`]s into the provider's [`BridgeError`] taxonomy, so callers
//! never see engine-specific failures.
//!
//! The adapter remembers what the engine holds after each successful
//! submission. Resubmitting the same model only removes the entities that
//! disappeared and upserts the ones that are new or changed; any failure, or
//! a different model, falls back to a full reset and transfer.
//!
//! ## Engines
//!
//! | Engine             | Use                                           |
//! |--------------------|-----------------------------------------------|
//! | [`OfflineEngine`]  | no engine configured; every call is refused   |
//! | [`TcpEngine`]      | JSON lines over TCP to an engine bridge       |
//! | [`ScriptedEngine`] | in-process engine with scripted outcomes      |

pub mod offline;
pub mod scripted;
pub mod tcp;

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::entities::{AnalysisConfig, EntityRef, ModelEntity};
use crate::errors::{BridgeError, BridgeResult};
use crate::registry::ModelSnapshot;
use crate::results::{ResultQuery, ResultRecord};

pub use offline::OfflineEngine;
pub use scripted::ScriptedEngine;
pub use tcp::TcpEngine;

/// Raw failure reported by an engine integration
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineError {
    #[error("engine unreachable: {0}")]
    Unreachable(String),

    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("engine rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("engine does not know job {0}")]
    UnknownJob(String),

    #[error("job {0} has not finished")]
    NotFinished(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Engine-side state of an analysis job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<f64>,
    },
    Completed,
    Failed {
        reason: String,
    },
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed { .. })
    }
}

/// Contract of one analysis engine integration.
///
/// A model is transferred by `reset_model` followed by one `upsert` per entity
/// in dependency order; `start_analysis` then runs it as a job.
#[async_trait]
pub trait EngineBackend: Send + Sync {
    /// Short name used in errors and logs
    fn name(&self) -> &str;

    /// Discard the engine's copy of the model
    async fn reset_model(&self, model_name: &str) -> Result<(), EngineError>;

    /// Create or replace one entity
    async fn upsert(&self, entity: &ModelEntity) -> Result<(), EngineError>;

    /// Remove one entity
    async fn remove(&self, target: &EntityRef) -> Result<(), EngineError>;

    /// Start an analysis of the transferred model; returns the engine job ID
    async fn start_analysis(&self, config: &AnalysisConfig) -> Result<String, EngineError>;

    async fn job_status(&self, job: &str) -> Result<JobState, EngineError>;

    /// Results of a completed job
    async fn job_results(&self, job: &str, query: &ResultQuery) -> Result<Vec<ResultRecord>, EngineError>;
}

/// The engine's copy of a model, as of the last successful transfer
#[derive(Debug, Clone)]
struct EngineCopy {
    created: DateTime<Utc>,
    name: String,
    entities: Vec<ModelEntity>,
}

/// Bounded, error-normalizing front of an [`EngineBackend`]
#[derive(Clone)]
pub struct BackendAdapter {
    engine: Arc<dyn EngineBackend>,
    timeout: Duration,
    engine_copy: Arc<Mutex<Option<EngineCopy>>>,
}

impl std::fmt::Debug for BackendAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendAdapter")
            .field("engine", &self.engine.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl BackendAdapter {
    pub fn new(engine: Arc<dyn EngineBackend>, timeout: Duration) -> Self {
        BackendAdapter {
            engine,
            timeout,
            engine_copy: Arc::new(Mutex::new(None)),
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Transfer a snapshot to the engine and start its analysis.
    ///
    /// Returns the engine job ID once the engine has accepted the job.
    pub async fn submit(&self, snapshot: &ModelSnapshot) -> BridgeResult<String> {
        let model = snapshot.model();
        let entities = model.entities();
        let mut copy = self.engine_copy.lock().await;
        let previous = copy
            .take()
            .filter(|c| c.created == model.meta.created && c.name == model.meta.name);

        let result: Result<String, EngineError> = async {
            match &previous {
                Some(previous) => self.sync(&previous.entities, &entities).await?,
                None => {
                    self.bounded("reset_model", self.engine.reset_model(&model.meta.name)).await?;
                    for entity in &entities {
                        self.bounded("upsert", self.engine.upsert(entity)).await?;
                    }
                }
            }
            self.bounded("start_analysis", self.engine.start_analysis(model.analysis_config()))
                .await
        }
        .await;

        match result {
            Ok(job) => {
                info!(
                    engine = self.engine.name(),
                    %job,
                    revision = snapshot.revision,
                    incremental = previous.is_some(),
                    "analysis submitted"
                );
                *copy = Some(EngineCopy {
                    created: model.meta.created,
                    name: model.meta.name.clone(),
                    entities,
                });
                Ok(job)
            }
            Err(e) => {
                warn!(engine = self.engine.name(), error = %e, "analysis submission failed");
                Err(self.normalize(e))
            }
        }
    }

    /// Bring the engine from `sent` to `current`: removals in reverse
    /// dependency order, then upserts of new or changed entities.
    async fn sync(&self, sent: &[ModelEntity], current: &[ModelEntity]) -> Result<(), EngineError> {
        let kept: BTreeSet<EntityRef> = current.iter().map(ModelEntity::entity_ref).collect();
        for stale in sent.iter().rev().map(ModelEntity::entity_ref).filter(|r| !kept.contains(r)) {
            self.bounded("remove", self.engine.remove(&stale)).await?;
        }

        let previous: BTreeMap<EntityRef, &ModelEntity> = sent.iter().map(|e| (e.entity_ref(), e)).collect();
        let mut changed = 0;
        for entity in current.iter().filter(|e| previous.get(&e.entity_ref()) != Some(e)) {
            self.bounded("upsert", self.engine.upsert(entity)).await?;
            changed += 1;
        }
        debug!(engine = self.engine.name(), changed, "engine copy synchronized");
        Ok(())
    }

    /// Remove one entity from the engine's copy of the model
    pub async fn remove(&self, target: &EntityRef) -> BridgeResult<()> {
        let mut copy = self.engine_copy.lock().await;
        match self.bounded("remove", self.engine.remove(target)).await {
            Ok(()) => {
                if let Some(copy) = copy.as_mut() {
                    copy.entities.retain(|e| &e.entity_ref() != target);
                }
                debug!(engine = self.engine.name(), %target, "entity removed from engine");
                Ok(())
            }
            Err(e) => {
                *copy = None;
                Err(self.normalize(e))
            }
        }
    }

    pub async fn status(&self, job: &str) -> BridgeResult<JobState> {
        self.bounded("job_status", self.engine.job_status(job))
            .await
            .map_err(|e| self.normalize(e))
    }

    pub async fn results(&self, job: &str, query: &ResultQuery) -> BridgeResult<Vec<ResultRecord>> {
        self.bounded("job_results", self.engine.job_results(job, query))
            .await
            .map_err(|e| self.normalize(e))
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(EngineError::Timeout {
                operation: operation.to_string(),
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Map a raw engine failure onto the provider taxonomy
    pub fn normalize(&self, error: EngineError) -> BridgeError {
        match error {
            EngineError::Unreachable(_) | EngineError::Timeout { .. } | EngineError::Protocol(_) => {
                BridgeError::backend_unavailable(self.engine.name(), error.to_string())
            }
            EngineError::UnknownJob(job) => BridgeError::unknown_handle(job),
            EngineError::NotFinished(job) => BridgeError::ResultsNotReady { handle: job },
            EngineError::Rejected { .. } => BridgeError::AnalysisFailed {
                reason: error.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(engine: ScriptedEngine) -> BackendAdapter {
        BackendAdapter::new(Arc::new(engine), Duration::from_millis(50))
    }

    #[test]
    fn test_error_normalization() {
        let adapter = adapter(ScriptedEngine::new());
        let err = adapter.normalize(EngineError::Unreachable("refused".into()));
        assert_eq!(err.error_code(), "BACKEND_UNAVAILABLE");
        assert!(err.is_recoverable());

        let err = adapter.normalize(EngineError::NotFinished("job-1".into()));
        assert_eq!(err.error_code(), "RESULTS_NOT_READY");

        let err = adapter.normalize(EngineError::Rejected {
            code: "E42".into(),
            message: "singular stiffness matrix".into(),
        });
        assert_eq!(err.error_code(), "ANALYSIS_FAILED");
        assert!(err.to_string().contains("singular"));
    }

    #[test]
    fn test_job_state_json() {
        let state: JobState = serde_json::from_str(r#"{"state":"running","progress":0.5}"#).unwrap();
        assert_eq!(state, JobState::Running { progress: Some(0.5) });
        assert!(!state.is_finished());
        assert!(JobState::Failed { reason: "x".into() }.is_finished());
    }

    #[tokio::test]
    async fn test_remove_is_bounded_and_normalized() {
        let engine = Arc::new(ScriptedEngine::new());
        let adapter = BackendAdapter::new(engine.clone(), Duration::from_millis(50));
        let target = EntityRef::new(crate::entities::EntityKind::Load, 4);
        adapter.remove(&target).await.unwrap();
        assert_eq!(engine.removals(), vec![target.clone()]);

        engine.set_reachable(false);
        let err = adapter.remove(&target).await.unwrap_err();
        assert_eq!(err.error_code(), "BACKEND_UNAVAILABLE");

        let offline = BackendAdapter::new(Arc::new(OfflineEngine), Duration::from_millis(50));
        assert_eq!(offline.remove(&target).await.unwrap_err().error_code(), "BACKEND_UNAVAILABLE");

        let slow = self::adapter(ScriptedEngine::new().with_latency(Duration::from_millis(500)));
        let err = slow.remove(&target).await.unwrap_err();
        assert!(err.to_string().contains("remove timed out"));
    }

    #[tokio::test]
    async fn test_slow_engine_times_out() {
        let adapter = adapter(ScriptedEngine::new().with_latency(Duration::from_millis(500)));
        let err = adapter.status("job-1").await.unwrap_err();
        assert_eq!(err.error_code(), "BACKEND_UNAVAILABLE");
        assert!(err.to_string().contains("timed out"));
    }
}
