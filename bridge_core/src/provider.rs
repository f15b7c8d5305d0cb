//! # Provider Interface
//!
//! The operation set an assistant drives, split into capability traits:
//!
//! - [`ModelBuild`]: create, update and delete entities; configure the analysis
//! - [`ModelQuery`]: read entities, summarize and validate the model
//! - [`Analyze`]: submit analyses and fetch their results
//!
//! [`ModelSession`] implements all three over one [`ModelRegistry`] and one
//! [`BackendAdapter`]. Every operation is a function of the registry state and
//! its arguments; nothing is kept in globals.
//!
//! ## Concurrency
//!
//! The registry sits behind a read-write lock. `run_analysis` validates and
//! snapshots under the lock and releases it before talking to the engine, so
//! later edits never reach a submitted job. A configuration passed to
//! `run_analysis` is validated on a staged copy and only committed together
//! with a successful submission check.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::{BackendAdapter, JobState};
use crate::config::BridgeConfig;
use crate::entities::{AnalysisConfig, Entity, EntityKind, EntityRef, ModelEntity};
use crate::errors::{BridgeError, BridgeResult};
use crate::registry::{ModelRegistry, ModelSnapshot, ModelSummary, Stored};
use crate::results::{AnalysisHandle, ResultQuery, ResultSet};
use crate::units::UnitSystem;
use crate::validation::{ValidationEngine, ValidationReport, ValidationSettings};

/// Model construction operations
pub trait ModelBuild {
    /// Add an entity whose references all resolve
    fn create<E: Stored>(&self, entity: E) -> BridgeResult<E::Id>;

    /// Add several entities; if any is rejected none is added
    fn create_many<E: Stored>(&self, entities: Vec<E>) -> BridgeResult<Vec<E::Id>>;

    /// Add entities of mixed kinds in order; if any is rejected none is added
    fn build_batch(&self, entities: Vec<ModelEntity>) -> BridgeResult<Vec<EntityRef>>;

    /// Merge a JSON patch into an entity
    fn update<E: Stored>(&self, id: &E::Id, patch: &Value) -> BridgeResult<E>;

    /// Apply `change` to a copy of an entity and store it under the same checks as `update`
    fn modify<E: Stored>(&self, id: &E::Id, change: impl FnOnce(&mut E)) -> BridgeResult<E>;

    /// Remove an entity nothing references
    fn delete<E: Stored>(&self, id: &E::Id) -> BridgeResult<E>;

    /// Replace the analysis configuration
    fn configure_analysis(&self, config: AnalysisConfig) -> BridgeResult<()>;
}

/// Read-only model operations
pub trait ModelQuery {
    fn get<E: Stored>(&self, id: &E::Id) -> BridgeResult<E>;

    /// Entities of a kind matching `filter`, in ID order
    fn list<E: Stored>(&self, filter: impl Fn(&E) -> bool) -> Vec<E>;

    fn model_summary(&self) -> ModelSummary;

    fn validate_model(&self) -> ValidationReport;
}

/// Analysis operations
#[async_trait]
pub trait Analyze {
    /// Validate, snapshot and submit the model; `config` replaces the stored configuration first
    async fn run_analysis(&self, config: Option<AnalysisConfig>) -> BridgeResult<AnalysisHandle>;

    async fn analysis_status(&self, handle: AnalysisHandle) -> BridgeResult<AnalysisStatus>;

    async fn get_results(&self, handle: AnalysisHandle, query: &ResultQuery) -> BridgeResult<ResultSet>;
}

/// State of a submitted analysis, as reported to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStatus {
    pub handle: AnalysisHandle,
    pub engine: String,
    /// Registry revision that was submitted
    pub revision: u64,
    pub submitted: DateTime<Utc>,
    pub state: JobState,
}

#[derive(Debug, Clone)]
struct AnalysisJob {
    engine_job: String,
    snapshot: Arc<ModelSnapshot>,
    submitted: DateTime<Utc>,
    state: JobState,
}

/// One open model and the engine it is analysed with
#[derive(Debug)]
pub struct ModelSession {
    registry: RwLock<ModelRegistry>,
    validator: ValidationEngine,
    adapter: BackendAdapter,
    jobs: Mutex<HashMap<AnalysisHandle, AnalysisJob>>,
}

impl ModelSession {
    /// Open an empty model
    pub fn open(name: &str, units: UnitSystem, settings: ValidationSettings, adapter: BackendAdapter) -> Self {
        info!(model = name, engine = adapter.engine_name(), "model session opened");
        ModelSession {
            registry: RwLock::new(ModelRegistry::with_units(name, units)),
            validator: ValidationEngine::new(settings),
            adapter,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Open an empty model as configured
    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        Ok(ModelSession::open(
            &config.model_name,
            config.units,
            config.validation_settings(),
            config.build_adapter()?,
        ))
    }

    /// Discard the current model and every job, and start an empty one
    pub fn reopen(&self, name: &str) {
        let mut registry = self.registry.write();
        let units = registry.meta.units;
        *registry = ModelRegistry::with_units(name, units);
        self.jobs.lock().clear();
        self.validator.invalidate();
        info!(model = name, "model session reopened");
    }

    /// Close the session, discarding the model
    pub fn close(self) -> ModelSummary {
        let summary = self.registry.read().summary();
        info!(model = %summary.name, revision = summary.revision, "model session closed");
        summary
    }

    pub fn engine_name(&self) -> &str {
        self.adapter.engine_name()
    }

    /// Run `f` against the registry under the read lock
    pub fn read<R>(&self, f: impl FnOnce(&ModelRegistry) -> R) -> R {
        f(&self.registry.read())
    }

    /// Immutable copy of the current model
    pub fn snapshot(&self) -> ModelSnapshot {
        self.registry.read().snapshot()
    }

    fn job(&self, handle: AnalysisHandle) -> BridgeResult<AnalysisJob> {
        self.jobs
            .lock()
            .get(&handle)
            .cloned()
            .ok_or_else(|| BridgeError::unknown_handle(handle))
    }

    /// Current job state, asking the engine unless the job already finished
    async fn refresh(&self, handle: AnalysisHandle, job: &AnalysisJob) -> BridgeResult<JobState> {
        if job.state.is_finished() {
            return Ok(job.state.clone());
        }
        let state = self
            .adapter
            .status(&job.engine_job)
            .await
            .map_err(|e| for_handle(e, handle))?;
        if let Some(entry) = self.jobs.lock().get_mut(&handle) {
            entry.state = state.clone();
        }
        debug!(%handle, ?state, "analysis status refreshed");
        Ok(state)
    }
}

/// Report engine-side job errors under the caller's handle
fn for_handle(error: BridgeError, handle: AnalysisHandle) -> BridgeError {
    match error {
        BridgeError::NotFound { kind, .. } if kind == "analysis" => BridgeError::unknown_handle(handle),
        BridgeError::ResultsNotReady { .. } => BridgeError::ResultsNotReady {
            handle: handle.to_string(),
        },
        other => other,
    }
}

/// References that must resolve before an entity may enter the registry.
///
/// Stage-to-stage references are left to the registry's ordering check.
fn missing_references<E: Entity>(registry: &ModelRegistry, entity: &E) -> Vec<EntityRef> {
    registry
        .unresolved_references(entity)
        .into_iter()
        .filter(|r| r.kind != EntityKind::Stage)
        .collect()
}

/// Every reference resolves, and to something the entity fits with
fn check_closure<E: Stored>(registry: &ModelRegistry, entity: &E) -> BridgeResult<()> {
    let missing = missing_references(registry, entity);
    if !missing.is_empty() {
        let names = missing.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        return Err(BridgeError::referential(
            entity.entity_ref(),
            format!("references {names}, which do not exist; create them first"),
            missing,
        ));
    }
    match entity.conflicts(registry).into_iter().next() {
        Some(conflict) => Err(BridgeError::referential(entity.entity_ref(), conflict.reason, conflict.related)),
        None => Ok(()),
    }
}

fn insert<E: Stored>(registry: &mut ModelRegistry, entity: E) -> BridgeResult<EntityRef> {
    entity.validate()?;
    check_closure(registry, &entity)?;
    let entity_ref = entity.entity_ref();
    registry.create(entity)?;
    Ok(entity_ref)
}

fn insert_any(registry: &mut ModelRegistry, entity: ModelEntity) -> BridgeResult<EntityRef> {
    match entity {
        ModelEntity::Node(e) => insert(registry, e),
        ModelEntity::Element(e) => insert(registry, e),
        ModelEntity::Material(e) => insert(registry, e),
        ModelEntity::Section(e) => insert(registry, e),
        ModelEntity::Support(e) => insert(registry, e),
        ModelEntity::Load(e) => insert(registry, e),
        ModelEntity::Stage(e) => insert(registry, e),
        ModelEntity::Group(e) => insert(registry, e),
        ModelEntity::Link(e) => insert(registry, e),
        ModelEntity::TendonProperty(e) => insert(registry, e),
        ModelEntity::Tendon(e) => insert(registry, e),
        ModelEntity::Vehicle(e) => insert(registry, e),
        ModelEntity::Lane(e) => insert(registry, e),
        ModelEntity::LiveLoadCase(e) => insert(registry, e),
    }
}

impl ModelBuild for ModelSession {
    fn create<E: Stored>(&self, entity: E) -> BridgeResult<E::Id> {
        entity.validate()?;
        let mut registry = self.registry.write();
        check_closure(&registry, &entity)?;
        registry.create(entity)
    }

    fn create_many<E: Stored>(&self, entities: Vec<E>) -> BridgeResult<Vec<E::Id>> {
        for entity in &entities {
            entity.validate()?;
        }
        let mut registry = self.registry.write();
        let mut staged = registry.clone();
        let mut ids = Vec::with_capacity(entities.len());
        for entity in entities {
            let id = entity.id().clone();
            insert(&mut staged, entity)?;
            ids.push(id);
        }
        *registry = staged;
        Ok(ids)
    }

    fn build_batch(&self, entities: Vec<ModelEntity>) -> BridgeResult<Vec<EntityRef>> {
        let mut registry = self.registry.write();
        let mut staged = registry.clone();
        let refs = entities
            .into_iter()
            .map(|entity| insert_any(&mut staged, entity))
            .collect::<BridgeResult<Vec<_>>>()?;
        *registry = staged;
        debug!(count = refs.len(), revision = registry.revision(), "batch created");
        Ok(refs)
    }

    fn update<E: Stored>(&self, id: &E::Id, patch: &Value) -> BridgeResult<E> {
        let mut registry = self.registry.write();
        let updated = registry.patched::<E>(id, patch)?;
        check_closure(&registry, &updated)?;
        registry.replace(updated.clone())?;
        Ok(updated)
    }

    fn modify<E: Stored>(&self, id: &E::Id, change: impl FnOnce(&mut E)) -> BridgeResult<E> {
        let mut registry = self.registry.write();
        let mut updated = registry.get::<E>(id)?.clone();
        change(&mut updated);
        if updated.id() != id {
            return Err(BridgeError::schema(E::KIND.name(), "id", "cannot be changed by an update"));
        }
        check_closure(&registry, &updated)?;
        registry.replace(updated.clone())?;
        Ok(updated)
    }

    fn delete<E: Stored>(&self, id: &E::Id) -> BridgeResult<E> {
        self.registry.write().delete::<E>(id)
    }

    fn configure_analysis(&self, config: AnalysisConfig) -> BridgeResult<()> {
        self.registry.write().set_analysis_config(config)
    }
}

impl ModelQuery for ModelSession {
    fn get<E: Stored>(&self, id: &E::Id) -> BridgeResult<E> {
        self.registry.read().get::<E>(id).cloned()
    }

    fn list<E: Stored>(&self, filter: impl Fn(&E) -> bool) -> Vec<E> {
        self.registry.read().list(filter).into_iter().cloned().collect()
    }

    fn model_summary(&self) -> ModelSummary {
        self.registry.read().summary()
    }

    fn validate_model(&self) -> ValidationReport {
        self.validator.validate(&self.registry.read())
    }
}

#[async_trait]
impl Analyze for ModelSession {
    async fn run_analysis(&self, config: Option<AnalysisConfig>) -> BridgeResult<AnalysisHandle> {
        let snapshot = match config {
            None => {
                let registry = self.registry.read();
                let report = self.validator.validate(&registry);
                if !report.is_analysis_ready() {
                    return Err(BridgeError::NotAnalysisReady { report });
                }
                registry.snapshot()
            }
            Some(config) => {
                let mut registry = self.registry.write();
                let mut staged = registry.clone();
                staged.set_analysis_config(config)?;
                let report = self.validator.check(&staged);
                if !report.is_analysis_ready() {
                    return Err(BridgeError::NotAnalysisReady { report });
                }
                *registry = staged;
                registry.snapshot()
            }
        };

        let engine_job = self.adapter.submit(&snapshot).await?;
        let handle = AnalysisHandle::new();
        info!(%handle, %engine_job, revision = snapshot.revision, "analysis accepted");
        self.jobs.lock().insert(
            handle,
            AnalysisJob {
                engine_job,
                snapshot: Arc::new(snapshot),
                submitted: Utc::now(),
                state: JobState::Queued,
            },
        );
        Ok(handle)
    }

    async fn analysis_status(&self, handle: AnalysisHandle) -> BridgeResult<AnalysisStatus> {
        let job = self.job(handle)?;
        let state = self.refresh(handle, &job).await?;
        Ok(AnalysisStatus {
            handle,
            engine: self.adapter.engine_name().to_string(),
            revision: job.snapshot.revision,
            submitted: job.submitted,
            state,
        })
    }

    async fn get_results(&self, handle: AnalysisHandle, query: &ResultQuery) -> BridgeResult<ResultSet> {
        let job = self.job(handle)?;
        query.check_against(&job.snapshot)?;

        match self.refresh(handle, &job).await? {
            JobState::Queued | JobState::Running { .. } => Err(BridgeError::ResultsNotReady {
                handle: handle.to_string(),
            }),
            JobState::Failed { reason } => Err(BridgeError::AnalysisFailed { reason }),
            JobState::Completed => {
                let records = self
                    .adapter
                    .results(&job.engine_job, query)
                    .await
                    .map_err(|e| for_handle(e, handle))?;
                Ok(ResultSet {
                    handle,
                    kind: query.kind,
                    stage: query.stage,
                    case: query.case.clone(),
                    records,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedEngine;
    use crate::entities::{
        AnalysisKind, ConstructionStage, Element, ElementId, ElementKind, Group, GroupName, Load, LoadDirection, LoadId,
        Material, MaterialKind, Node, NodeId, Section, Support,
    };
    use crate::entities::Fixity;
    use serde_json::json;
    use std::time::Duration;

    fn session() -> ModelSession {
        let adapter = BackendAdapter::new(Arc::new(ScriptedEngine::new()), Duration::from_secs(1));
        ModelSession::open("Test", UnitSystem::default(), ValidationSettings::default(), adapter)
    }

    fn beam(session: &ModelSession) {
        session.create(Material::new("C40", MaterialKind::Concrete, 3.25e10, 2500.0)).unwrap();
        session.create(Section::rectangle("S1", 0.5, 1.0)).unwrap();
        session.create(Node::new(1, 0.0, 0.0, 0.0)).unwrap();
        session.create(Node::new(2, 10.0, 0.0, 0.0)).unwrap();
        session.create(Element::beam(1, 1, 2, "C40", "S1")).unwrap();
    }

    #[test]
    fn test_create_enforces_closure() {
        let session = session();
        beam(&session);
        let err = session.create(Element::beam(2, 2, 99, "C40", "S1")).unwrap_err();
        match err {
            BridgeError::ReferentialIntegrity { related, .. } => {
                assert_eq!(related, vec![EntityRef::new(EntityKind::Node, 99)]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.model_summary().element_count, 1);
    }

    #[test]
    fn test_schema_error_reported_before_closure() {
        let session = session();
        let err = session.create(Element::beam(1, 1, 1, "C40", "S1")).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }

    #[test]
    fn test_update_enforces_closure() {
        let session = session();
        beam(&session);
        let err = session
            .update::<Element>(&crate::entities::ElementId(1), &json!({"material": "Q345"}))
            .unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");
        let node = session.update::<Node>(&NodeId(2), &json!({"position": [12.0, 0.0, 0.0]})).unwrap();
        assert_eq!(node.position.x, 12.0);
    }

    #[test]
    fn test_create_many_is_atomic() {
        let session = session();
        let err = session
            .create_many(vec![Node::new(1, 0.0, 0.0, 0.0), Node::new(2, 5.0, 0.0, 0.0), Node::new(1, 9.0, 0.0, 0.0)])
            .unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_ID");
        assert_eq!(session.model_summary().node_count, 0);

        let ids = session
            .create_many(vec![Node::new(1, 0.0, 0.0, 0.0), Node::new(2, 5.0, 0.0, 0.0)])
            .unwrap();
        assert_eq!(ids, vec![NodeId(1), NodeId(2)]);
    }

    #[test]
    fn test_stage_gap_reports_order() {
        let session = session();
        let err = session.create(ConstructionStage::new(2, "Deck")).unwrap_err();
        assert_eq!(err.error_code(), "STAGE_ORDER");
    }

    #[test]
    fn test_reopen_discards_model() {
        let session = session();
        beam(&session);
        session.reopen("Fresh");
        let summary = session.model_summary();
        assert_eq!(summary.name, "Fresh");
        assert_eq!(summary.node_count, 0);
        assert_eq!(session.close().revision, 0);
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let session = session();
        let handle = AnalysisHandle::new();
        let err = session.analysis_status(handle).await.unwrap_err();
        assert_eq!(err, BridgeError::unknown_handle(handle));
    }

    fn with_plate(session: &ModelSession) {
        session.create(Section::plate("P1", 0.3)).unwrap();
        session.create(Node::new(3, 10.0, 5.0, 0.0)).unwrap();
        session
            .create(Element::beam(2, 1, 2, "C40", "P1").with_kind(ElementKind::Plate).with_nodes(&[1, 2, 3]))
            .unwrap();
    }

    #[test]
    fn test_distributed_load_rejected_on_plate() {
        let session = session();
        beam(&session);
        with_plate(&session);

        let err = session
            .create(Load::uniform(1, "Dead", 2, LoadDirection::GlobalZ, 0.0, 1.0, -5.0))
            .unwrap_err();
        match err {
            BridgeError::ReferentialIntegrity { related, reason, .. } => {
                assert_eq!(related, vec![EntityRef::new(EntityKind::Element, 2)]);
                assert!(reason.contains("plate"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.model_summary().load_count, 0);
    }

    #[test]
    fn test_distributed_load_cannot_move_onto_plate() {
        let session = session();
        beam(&session);
        with_plate(&session);
        session
            .create(Load::uniform(1, "Dead", 1, LoadDirection::GlobalZ, 0.0, 1.0, -5.0))
            .unwrap();

        let err = session
            .update::<Load>(
                &LoadId(1),
                &json!({"kind": {"type": "distributed", "element": 2, "direction": "global_z", "start": 0.0, "end": 1.0, "start_magnitude": -5.0, "end_magnitude": -5.0}}),
            )
            .unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");
        assert_eq!(session.get::<Load>(&LoadId(1)).unwrap().element(), Some(ElementId(1)));

        let err = session
            .update::<Element>(&ElementId(1), &json!({"kind": "plate", "nodes": [1, 2, 3], "section": "P1"}))
            .unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");
    }

    #[test]
    fn test_modify_and_batch() {
        let session = session();
        beam(&session);
        session.create(Group::structure("Deck")).unwrap();
        let group = session
            .modify::<Group>(&GroupName::from("Deck"), |g| {
                g.elements.insert(ElementId(1));
            })
            .unwrap();
        assert!(group.contains_element(ElementId(1)));

        let err = session
            .modify::<Group>(&GroupName::from("Deck"), |g| {
                g.elements.insert(ElementId(9));
            })
            .unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");

        let revision = session.model_summary().revision;
        let err = session
            .build_batch(vec![
                ModelEntity::Node(Node::new(3, 20.0, 0.0, 0.0)),
                ModelEntity::Element(Element::beam(2, 2, 3, "C40", "S1")),
                ModelEntity::Support(Support::new(1, 4, Fixity::fixed())),
            ])
            .unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");
        assert_eq!(session.model_summary().revision, revision);

        let refs = session
            .build_batch(vec![
                ModelEntity::Node(Node::new(3, 20.0, 0.0, 0.0)),
                ModelEntity::Element(Element::beam(2, 2, 3, "C40", "S1")),
            ])
            .unwrap();
        assert_eq!(refs, vec![EntityRef::new(EntityKind::Node, 3), EntityRef::new(EntityKind::Element, 2)]);
    }

    #[tokio::test]
    async fn test_rejected_config_is_not_committed() {
        let session = session();
        beam(&session);
        session.create(Support::new(1, 1, Fixity::fixed())).unwrap();
        let revision = session.model_summary().revision;

        let staged = AnalysisConfig::new(AnalysisKind::StagedConstruction);
        let err = session.run_analysis(Some(staged)).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_ANALYSIS_READY");
        assert_eq!(session.model_summary().revision, revision);
        assert_eq!(session.read(|m| m.analysis_config().clone()), AnalysisConfig::default());

        let handle = session.run_analysis(Some(AnalysisConfig::default())).await;
        assert!(handle.is_ok());
        assert_eq!(session.model_summary().revision, revision + 1);
    }
}
