//! Engine used when no analysis engine is configured.

use async_trait::async_trait;

use super::{EngineBackend, EngineError, JobState};
use crate::entities::{AnalysisConfig, EntityRef, ModelEntity};
use crate::results::{ResultQuery, ResultRecord};

/// Refuses every call as unreachable. Modelling and validation keep working.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineEngine;

impl OfflineEngine {
    fn refuse<T>(&self) -> Result<T, EngineError> {
        Err(EngineError::Unreachable(
            "no analysis engine configured (set engine.kind = \"tcp\" and engine.address)".to_string(),
        ))
    }
}

#[async_trait]
impl EngineBackend for OfflineEngine {
    fn name(&self) -> &str {
        "offline"
    }

    async fn reset_model(&self, _model_name: &str) -> Result<(), EngineError> {
        self.refuse()
    }

    async fn upsert(&self, _entity: &ModelEntity) -> Result<(), EngineError> {
        self.refuse()
    }

    async fn remove(&self, _target: &EntityRef) -> Result<(), EngineError> {
        self.refuse()
    }

    async fn start_analysis(&self, _config: &AnalysisConfig) -> Result<String, EngineError> {
        self.refuse()
    }

    async fn job_status(&self, _job: &str) -> Result<JobState, EngineError> {
        self.refuse()
    }

    async fn job_results(&self, _job: &str, _query: &ResultQuery) -> Result<Vec<ResultRecord>, EngineError> {
        self.refuse()
    }
}
