//! # Model Registry
//!
//! The `ModelRegistry` is the authoritative in-memory index of every entity in
//! the open model. It lives for one model session and is never persisted here;
//! persistence belongs to the analysis engine.
//!
//! ## Structure
//!
//! ```text
//! ModelRegistry
//! ├── meta: ModelMetadata (name, unit system, timestamps)
//! ├── revision: u64 (bumped by every mutation)
//! ├── nodes / elements / materials / sections / supports / loads / groups
//! ├── links / tendon_properties / tendons / vehicles / lanes / live_cases
//! │     BTreeMap<Id, Entity> per kind, iterated in ID order
//! ├── stages + stage_log (append-only activation history)
//! └── analysis: AnalysisConfig (singleton)
//! ```
//!
//! ## Rules
//!
//! - `create` checks the schema and ID uniqueness, never cross-entity references
//! - `update` shallow-merges a JSON patch and re-validates the schema
//! - a stage, or a change of group membership, is checked against the whole
//!   activation history, with group records applied to every member
//! - `delete` refuses to remove anything another entity still references
//!
//! ## Example
//!
//! ```rust
//! use bridge_core::entities::{Node, NodeId};
//! use bridge_core::registry::ModelRegistry;
//!
//! let mut model = ModelRegistry::new("Demo Bridge");
//! let id = model.create(Node::new(1, 0.0, 0.0, 0.0)).unwrap();
//! assert_eq!(id, NodeId(1));
//! assert_eq!(model.get::<Node>(&id).unwrap().position.x, 0.0);
//! assert_eq!(model.revision(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::entities::{
    Activity, AnalysisConfig, ConstructionStage, Element, ElementId, ElementKind, Entity, EntityKind, EntityRef, Group,
    GroupKind, GroupName, Lane, LaneName, Link, LinkId, LiveCaseName, LiveLoadCase, Load, LoadId, LoadKind, Material,
    MaterialId, ModelEntity, Node, NodeId, Section, SectionId, SequentialId, StageEvent, StageIndex, StageLog,
    StageTarget, Support, SupportId, Tendon, TendonName, TendonProperty, TendonPropertyId, Vehicle, VehicleName,
};
use crate::errors::{BridgeError, BridgeResult};
use crate::units::{UnitSystem, Vec3};

/// Current schema version of the model contract
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Contract schema version
    pub version: String,

    /// Model name
    pub name: String,

    /// Unit system, declared once for the whole model
    pub units: UnitSystem,

    /// When the model was opened
    pub created: DateTime<Utc>,

    /// When the model was last modified
    pub modified: DateTime<Utc>,
}

/// Entity counts and metadata, as reported by `get_model_info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    pub units: String,
    pub revision: u64,
    pub node_count: usize,
    pub element_count: usize,
    pub material_count: usize,
    pub section_count: usize,
    pub support_count: usize,
    pub load_count: usize,
    pub load_case_count: usize,
    pub stage_count: usize,
    pub structure_group_count: usize,
    pub boundary_group_count: usize,
    pub load_group_count: usize,
    pub link_count: usize,
    pub tendon_count: usize,
    pub live_load_case_count: usize,
}

/// Authoritative index of all entities of the open model.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    pub meta: ModelMetadata,
    revision: u64,
    nodes: BTreeMap<NodeId, Node>,
    elements: BTreeMap<ElementId, Element>,
    materials: BTreeMap<MaterialId, Material>,
    sections: BTreeMap<SectionId, Section>,
    supports: BTreeMap<SupportId, Support>,
    loads: BTreeMap<LoadId, Load>,
    stages: BTreeMap<StageIndex, ConstructionStage>,
    groups: BTreeMap<GroupName, Group>,
    links: BTreeMap<LinkId, Link>,
    tendon_properties: BTreeMap<TendonPropertyId, TendonProperty>,
    tendons: BTreeMap<TendonName, Tendon>,
    vehicles: BTreeMap<VehicleName, Vehicle>,
    lanes: BTreeMap<LaneName, Lane>,
    live_cases: BTreeMap<LiveCaseName, LiveLoadCase>,
    stage_log: StageLog,
    analysis: AnalysisConfig,
}

/// An entity whose references resolve but do not fit together,
/// e.g. a distributed load on a plate element
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub reason: String,
    pub related: Vec<EntityRef>,
}

/// Storage binding of an entity kind to its registry table.
///
/// The hooks let a kind enforce registry-level rules on insert and keep
/// derived state (the stage log) in step.
pub trait Stored: Entity {
    fn table(registry: &ModelRegistry) -> &BTreeMap<Self::Id, Self>;

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<Self::Id, Self>;

    fn check_insert(&self, _registry: &ModelRegistry) -> BridgeResult<()> {
        Ok(())
    }

    /// Checked before `self` replaces `current`
    fn check_replace(&self, _current: &Self, _registry: &ModelRegistry) -> BridgeResult<()> {
        Ok(())
    }

    /// Ways the entity clashes with the entities it resolves against
    fn conflicts(&self, _registry: &ModelRegistry) -> Vec<Conflict> {
        Vec::new()
    }

    fn on_insert(&self, _registry: &mut ModelRegistry) {}

    fn on_remove(&self, _registry: &mut ModelRegistry) {}
}

impl Stored for Node {
    fn table(registry: &ModelRegistry) -> &BTreeMap<NodeId, Node> {
        &registry.nodes
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<NodeId, Node> {
        &mut registry.nodes
    }
}

impl Stored for Element {
    fn table(registry: &ModelRegistry) -> &BTreeMap<ElementId, Element> {
        &registry.elements
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<ElementId, Element> {
        &mut registry.elements
    }

    fn conflicts(&self, registry: &ModelRegistry) -> Vec<Conflict> {
        if self.kind != ElementKind::Plate {
            return Vec::new();
        }
        let element = self.entity_ref();
        let mut related: Vec<EntityRef> = registry
            .loads
            .values()
            .filter(|l| matches!(l.kind, LoadKind::Distributed { .. }) && l.element() == Some(self.id))
            .map(Entity::entity_ref)
            .collect();
        related.extend(registry.tendons.values().filter(|t| t.elements.contains(&self.id)).map(Entity::entity_ref));
        related.extend(registry.lanes.values().filter(|l| l.elements.contains(&self.id)).map(Entity::entity_ref));
        if related.is_empty() {
            return Vec::new();
        }
        vec![Conflict {
            reason: format!("{element} is a plate but carries line-element loads, tendons or lanes"),
            related,
        }]
    }
}

impl Stored for Material {
    fn table(registry: &ModelRegistry) -> &BTreeMap<MaterialId, Material> {
        &registry.materials
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<MaterialId, Material> {
        &mut registry.materials
    }
}

impl Stored for Section {
    fn table(registry: &ModelRegistry) -> &BTreeMap<SectionId, Section> {
        &registry.sections
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<SectionId, Section> {
        &mut registry.sections
    }
}

impl Stored for Support {
    fn table(registry: &ModelRegistry) -> &BTreeMap<SupportId, Support> {
        &registry.supports
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<SupportId, Support> {
        &mut registry.supports
    }

    fn check_insert(&self, registry: &ModelRegistry) -> BridgeResult<()> {
        match &self.group {
            Some(_) => registry.check_history_with(self),
            None => Ok(()),
        }
    }

    fn check_replace(&self, current: &Support, registry: &ModelRegistry) -> BridgeResult<()> {
        if self.group == current.group {
            return Ok(());
        }
        registry.check_history_with(self)
    }

    fn conflicts(&self, registry: &ModelRegistry) -> Vec<Conflict> {
        registry.group_kind_conflict(self.entity_ref(), self.group.as_ref(), GroupKind::Boundary).into_iter().collect()
    }
}

impl Stored for Load {
    fn table(registry: &ModelRegistry) -> &BTreeMap<LoadId, Load> {
        &registry.loads
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<LoadId, Load> {
        &mut registry.loads
    }

    fn check_insert(&self, registry: &ModelRegistry) -> BridgeResult<()> {
        match &self.group {
            Some(_) => registry.check_history_with(self),
            None => Ok(()),
        }
    }

    fn check_replace(&self, current: &Load, registry: &ModelRegistry) -> BridgeResult<()> {
        if self.group == current.group {
            return Ok(());
        }
        registry.check_history_with(self)
    }

    fn conflicts(&self, registry: &ModelRegistry) -> Vec<Conflict> {
        let mut out: Vec<Conflict> = registry
            .group_kind_conflict(self.entity_ref(), self.group.as_ref(), GroupKind::Load)
            .into_iter()
            .collect();
        if let LoadKind::Distributed { element, .. } = &self.kind {
            if registry.elements.get(element).is_some_and(|e| e.kind == ElementKind::Plate) {
                out.push(Conflict {
                    reason: format!("distributed loads act on line elements; element {element} is a plate"),
                    related: vec![EntityRef::new(EntityKind::Element, element)],
                });
            }
        }
        out
    }
}

impl Stored for Group {
    fn table(registry: &ModelRegistry) -> &BTreeMap<GroupName, Group> {
        &registry.groups
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<GroupName, Group> {
        &mut registry.groups
    }

    fn check_insert(&self, registry: &ModelRegistry) -> BridgeResult<()> {
        if self.elements.is_empty() {
            return Ok(());
        }
        registry.check_history_with(self)
    }

    fn check_replace(&self, current: &Group, registry: &ModelRegistry) -> BridgeResult<()> {
        if self.elements == current.elements {
            return Ok(());
        }
        registry.check_history_with(self)
    }
}

impl Stored for Link {
    fn table(registry: &ModelRegistry) -> &BTreeMap<LinkId, Link> {
        &registry.links
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<LinkId, Link> {
        &mut registry.links
    }

    fn conflicts(&self, registry: &ModelRegistry) -> Vec<Conflict> {
        registry.group_kind_conflict(self.entity_ref(), self.group.as_ref(), GroupKind::Boundary).into_iter().collect()
    }
}

impl Stored for TendonProperty {
    fn table(registry: &ModelRegistry) -> &BTreeMap<TendonPropertyId, TendonProperty> {
        &registry.tendon_properties
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<TendonPropertyId, TendonProperty> {
        &mut registry.tendon_properties
    }
}

impl Stored for Tendon {
    fn table(registry: &ModelRegistry) -> &BTreeMap<TendonName, Tendon> {
        &registry.tendons
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<TendonName, Tendon> {
        &mut registry.tendons
    }

    fn conflicts(&self, registry: &ModelRegistry) -> Vec<Conflict> {
        let mut out: Vec<Conflict> = registry
            .group_kind_conflict(self.entity_ref(), self.group.as_ref(), GroupKind::Load)
            .into_iter()
            .collect();
        out.extend(registry.plate_conflict(&self.entity_ref(), &self.elements));
        out
    }
}

impl Stored for Vehicle {
    fn table(registry: &ModelRegistry) -> &BTreeMap<VehicleName, Vehicle> {
        &registry.vehicles
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<VehicleName, Vehicle> {
        &mut registry.vehicles
    }
}

impl Stored for Lane {
    fn table(registry: &ModelRegistry) -> &BTreeMap<LaneName, Lane> {
        &registry.lanes
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<LaneName, Lane> {
        &mut registry.lanes
    }

    fn conflicts(&self, registry: &ModelRegistry) -> Vec<Conflict> {
        registry.plate_conflict(&self.entity_ref(), &self.elements).into_iter().collect()
    }
}

impl Stored for LiveLoadCase {
    fn table(registry: &ModelRegistry) -> &BTreeMap<LiveCaseName, LiveLoadCase> {
        &registry.live_cases
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<LiveCaseName, LiveLoadCase> {
        &mut registry.live_cases
    }
}

impl Stored for ConstructionStage {
    fn table(registry: &ModelRegistry) -> &BTreeMap<StageIndex, ConstructionStage> {
        &registry.stages
    }

    fn table_mut(registry: &mut ModelRegistry) -> &mut BTreeMap<StageIndex, ConstructionStage> {
        &mut registry.stages
    }

    /// Stages are appended in order: stage N+1 only after stage N, and
    /// nothing after the operation stage.
    fn check_insert(&self, registry: &ModelRegistry) -> BridgeResult<()> {
        let expected = registry.next_id::<ConstructionStage>()?;
        if self.index != expected {
            return Err(BridgeError::stage_order(
                self.index.0,
                format!("stages are gapless; the next stage must be {expected}"),
            ));
        }
        match registry.stages.values().next_back() {
            Some(last) if last.operation => {
                return Err(BridgeError::stage_order(
                    self.index.0,
                    format!("stage {} is the operation stage; no stage may follow it", last.index),
                ));
            }
            None if self.operation => {
                return Err(BridgeError::stage_order(
                    self.index.0,
                    "the operation stage closes a construction sequence; create a construction stage first",
                ));
            }
            _ => {}
        }
        registry.check_stage(self)
    }

    fn on_insert(&self, registry: &mut ModelRegistry) {
        registry.stage_log.append(self);
    }

    fn on_remove(&self, registry: &mut ModelRegistry) {
        registry.stage_log.truncate_from(self.index);
    }
}

impl ModelRegistry {
    /// Open an empty model in SI units.
    pub fn new(name: impl Into<String>) -> Self {
        ModelRegistry::with_units(name, UnitSystem::default())
    }

    /// Open an empty model with an explicit unit system.
    pub fn with_units(name: impl Into<String>, units: UnitSystem) -> Self {
        let now = Utc::now();
        ModelRegistry {
            meta: ModelMetadata {
                version: SCHEMA_VERSION.to_string(),
                name: name.into(),
                units,
                created: now,
                modified: now,
            },
            revision: 0,
            nodes: BTreeMap::new(),
            elements: BTreeMap::new(),
            materials: BTreeMap::new(),
            sections: BTreeMap::new(),
            supports: BTreeMap::new(),
            loads: BTreeMap::new(),
            stages: BTreeMap::new(),
            groups: BTreeMap::new(),
            links: BTreeMap::new(),
            tendon_properties: BTreeMap::new(),
            tendons: BTreeMap::new(),
            vehicles: BTreeMap::new(),
            lanes: BTreeMap::new(),
            live_cases: BTreeMap::new(),
            stage_log: StageLog::default(),
            analysis: AnalysisConfig::default(),
        }
    }

    /// Revision counter; every mutation bumps it.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Bump the revision and the modified timestamp.
    fn touch(&mut self) {
        self.revision += 1;
        self.meta.modified = Utc::now();
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    /// Insert a new entity under its caller-supplied ID.
    ///
    /// Fails with `DuplicateId` if the ID is taken and `Schema` if a field is
    /// invalid. Cross-entity references are not checked here.
    pub fn create<E: Stored>(&mut self, entity: E) -> BridgeResult<E::Id> {
        entity.validate()?;
        let id = entity.id().clone();
        if E::table(self).contains_key(&id) {
            return Err(BridgeError::duplicate_id(E::KIND, &id));
        }
        entity.check_insert(self)?;
        entity.on_insert(self);
        E::table_mut(self).insert(id.clone(), entity);
        self.touch();
        debug!(kind = %E::KIND, %id, revision = self.revision, "entity created");
        Ok(id)
    }

    pub fn get<E: Stored>(&self, id: &E::Id) -> BridgeResult<&E> {
        E::table(self).get(id).ok_or_else(|| BridgeError::not_found(E::KIND, id))
    }

    pub fn contains<E: Stored>(&self, id: &E::Id) -> bool {
        E::table(self).contains_key(id)
    }

    /// Every entity of a kind, in ID order
    pub fn all<E: Stored>(&self) -> impl Iterator<Item = &E> {
        E::table(self).values()
    }

    /// Entities of a kind matching `filter`, in ID order
    pub fn list<E: Stored>(&self, filter: impl Fn(&E) -> bool) -> Vec<&E> {
        E::table(self).values().filter(|e| filter(e)).collect()
    }

    pub fn count<E: Stored>(&self) -> usize {
        E::table(self).len()
    }

    /// Smallest unused ID above every existing one
    pub fn next_id<E>(&self) -> BridgeResult<E::Id>
    where
        E: Stored,
        E::Id: SequentialId,
    {
        match E::table(self).keys().next_back() {
            None => Ok(E::Id::first()),
            Some(last) => last.next().ok_or_else(|| {
                BridgeError::schema(E::KIND.name(), "id", format!("no free {} ID above {last}", E::KIND))
            }),
        }
    }

    /// Compute the result of applying `patch` to an entity without committing it.
    ///
    /// The patch is a JSON object whose top-level fields replace the entity's
    /// fields; `null` clears an optional field. Locked fields (the ID) may only
    /// be repeated with their current value.
    pub fn patched<E: Stored>(&self, id: &E::Id, patch: &Value) -> BridgeResult<E> {
        let current = self.get::<E>(id)?;
        let Value::Object(fields) = patch else {
            return Err(BridgeError::schema(E::KIND.name(), "patch", "must be a JSON object"));
        };

        let mut value = serde_json::to_value(current).map_err(|e| BridgeError::Internal {
            message: format!("cannot serialize {}: {e}", E::KIND),
        })?;
        let target = value.as_object_mut().ok_or_else(|| BridgeError::Internal {
            message: format!("{} does not serialize to an object", E::KIND),
        })?;

        for (key, new_value) in fields {
            if E::LOCKED_FIELDS.contains(&key.as_str()) {
                if target.get(key) != Some(new_value) {
                    return Err(BridgeError::schema(E::KIND.name(), key.as_str(), "cannot be changed by an update"));
                }
                continue;
            }
            if !target.contains_key(key) && !new_value.is_null() && !is_optional_field::<E>(key) {
                return Err(BridgeError::schema(E::KIND.name(), key.as_str(), "unknown field"));
            }
            if new_value.is_null() {
                target.remove(key);
            } else {
                target.insert(key.clone(), new_value.clone());
            }
        }

        let updated: E = serde_json::from_value(value)
            .map_err(|e| BridgeError::schema(E::KIND.name(), "patch", e.to_string()))?;
        updated.validate()?;
        Ok(updated)
    }

    /// Replace an existing entity with a new version of itself.
    pub fn replace<E: Stored>(&mut self, entity: E) -> BridgeResult<()> {
        entity.validate()?;
        let id = entity.id().clone();
        entity.check_replace(self.get::<E>(&id)?, self)?;
        let slot = E::table_mut(self)
            .get_mut(&id)
            .ok_or_else(|| BridgeError::not_found(E::KIND, &id))?;
        *slot = entity;
        self.touch();
        debug!(kind = %E::KIND, %id, revision = self.revision, "entity updated");
        Ok(())
    }

    /// Merge `patch` into an entity and re-validate it.
    pub fn update<E: Stored>(&mut self, id: &E::Id, patch: &Value) -> BridgeResult<E> {
        let updated = self.patched::<E>(id, patch)?;
        self.replace(updated.clone())?;
        Ok(updated)
    }

    /// Remove an entity nothing references.
    ///
    /// Never cascades: if anything still points at the entity the call fails
    /// with `ReferentialIntegrity` listing the referrers.
    pub fn delete<E: Stored>(&mut self, id: &E::Id) -> BridgeResult<E> {
        if !self.contains::<E>(id) {
            return Err(BridgeError::not_found(E::KIND, id));
        }
        let target = EntityRef::new(E::KIND, id);
        let referrers = self.referrers(&target);
        if !referrers.is_empty() {
            let reason = format!(
                "still referenced by {}; detach them first",
                referrers.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            );
            return Err(BridgeError::referential(target, reason, referrers));
        }

        let removed = E::table_mut(self)
            .remove(id)
            .ok_or_else(|| BridgeError::not_found(E::KIND, id))?;
        removed.on_remove(self);
        self.touch();
        debug!(kind = %E::KIND, %id, revision = self.revision, "entity deleted");
        Ok(removed)
    }

    // ========================================================================
    // References
    // ========================================================================

    /// Whether a reference points at an existing entity
    pub fn resolves(&self, reference: &EntityRef) -> bool {
        let id = reference.id.as_str();
        match reference.kind {
            EntityKind::Node => parse_u32(id).is_some_and(|n| self.nodes.contains_key(&NodeId(n))),
            EntityKind::Element => parse_u32(id).is_some_and(|n| self.elements.contains_key(&ElementId(n))),
            EntityKind::Support => parse_u32(id).is_some_and(|n| self.supports.contains_key(&SupportId(n))),
            EntityKind::Load => parse_u32(id).is_some_and(|n| self.loads.contains_key(&LoadId(n))),
            EntityKind::Stage => parse_u32(id).is_some_and(|n| self.stages.contains_key(&StageIndex(n))),
            EntityKind::Link => parse_u32(id).is_some_and(|n| self.links.contains_key(&LinkId(n))),
            EntityKind::Material => self.materials.contains_key(&MaterialId::from(id)),
            EntityKind::Section => self.sections.contains_key(&SectionId::from(id)),
            EntityKind::Group => self.groups.contains_key(&GroupName::from(id)),
            EntityKind::TendonProperty => self.tendon_properties.contains_key(&TendonPropertyId::from(id)),
            EntityKind::Tendon => self.tendons.contains_key(&TendonName::from(id)),
            EntityKind::Vehicle => self.vehicles.contains_key(&VehicleName::from(id)),
            EntityKind::Lane => self.lanes.contains_key(&LaneName::from(id)),
            EntityKind::LiveLoadCase => self.live_cases.contains_key(&LiveCaseName::from(id)),
        }
    }

    /// References of `entity` that do not resolve
    pub fn unresolved_references<E: Entity>(&self, entity: &E) -> Vec<EntityRef> {
        entity.references().into_iter().filter(|r| !self.resolves(r)).collect()
    }

    /// Every entity with its outgoing references, in kind then ID order
    pub fn reference_map(&self) -> Vec<(EntityRef, Vec<EntityRef>)> {
        fn collect<E: Stored>(registry: &ModelRegistry, out: &mut Vec<(EntityRef, Vec<EntityRef>)>) {
            out.extend(E::table(registry).values().map(|e| (e.entity_ref(), e.references())));
        }

        let mut out = Vec::new();
        collect::<Element>(self, &mut out);
        collect::<Support>(self, &mut out);
        collect::<Link>(self, &mut out);
        collect::<Load>(self, &mut out);
        collect::<Group>(self, &mut out);
        collect::<Tendon>(self, &mut out);
        collect::<Lane>(self, &mut out);
        collect::<LiveLoadCase>(self, &mut out);
        collect::<ConstructionStage>(self, &mut out);
        out
    }

    /// Entities that reference `target`
    pub fn referrers(&self, target: &EntityRef) -> Vec<EntityRef> {
        self.reference_map()
            .into_iter()
            .filter(|(_, refs)| refs.contains(target))
            .map(|(owner, _)| owner)
            .collect()
    }

    /// Every conflict in the model, with the entity it belongs to
    pub fn conflicts(&self) -> Vec<(EntityRef, Conflict)> {
        fn collect<E: Stored>(registry: &ModelRegistry, out: &mut Vec<(EntityRef, Conflict)>) {
            for entity in E::table(registry).values() {
                out.extend(entity.conflicts(registry).into_iter().map(|c| (entity.entity_ref(), c)));
            }
        }

        let mut out = Vec::new();
        collect::<Support>(self, &mut out);
        collect::<Link>(self, &mut out);
        collect::<Load>(self, &mut out);
        collect::<Tendon>(self, &mut out);
        collect::<Lane>(self, &mut out);
        out
    }

    /// `owner` names a group of the wrong kind
    fn group_kind_conflict(&self, owner: EntityRef, group: Option<&GroupName>, expected: GroupKind) -> Option<Conflict> {
        let group = self.groups.get(group?)?;
        if group.kind == expected {
            return None;
        }
        Some(Conflict {
            reason: format!(
                "{owner} joins {} group '{}'; it belongs in a {} group",
                group.kind.name(),
                group.id,
                expected.name()
            ),
            related: vec![group.entity_ref()],
        })
    }

    /// `owner` runs through plate elements
    fn plate_conflict(&self, owner: &EntityRef, elements: &[ElementId]) -> Option<Conflict> {
        let plates: Vec<EntityRef> = elements
            .iter()
            .filter(|id| self.elements.get(id).is_some_and(|e| e.kind == ElementKind::Plate))
            .map(|id| EntityRef::new(EntityKind::Element, id))
            .collect();
        if plates.is_empty() {
            return None;
        }
        Some(Conflict {
            reason: format!("{owner} must follow line elements, not plates"),
            related: plates,
        })
    }

    // ========================================================================
    // Staged activation
    // ========================================================================

    /// Members a group record switches: the elements of a structure group,
    /// the supports of a boundary group, the loads of a load group.
    /// Empty for any other target.
    pub fn members(&self, target: &StageTarget) -> Vec<StageTarget> {
        let StageTarget::Group(name) = target else {
            return Vec::new();
        };
        let Some(group) = self.groups.get(name) else {
            return Vec::new();
        };
        match group.kind {
            GroupKind::Structure => group.elements.iter().copied().map(StageTarget::Element).collect(),
            GroupKind::Boundary => self
                .supports
                .values()
                .filter(|s| s.group.as_ref() == Some(name))
                .map(|s| StageTarget::Support(s.id))
                .collect(),
            GroupKind::Load => self
                .loads
                .values()
                .filter(|l| l.group.as_ref() == Some(name))
                .map(|l| StageTarget::Load(l.id))
                .collect(),
        }
    }

    /// Whether `name` is a group of `kind` containing `target`
    fn group_contains(&self, name: &GroupName, target: &StageTarget) -> bool {
        let Some(group) = self.groups.get(name) else {
            return false;
        };
        match (group.kind, target) {
            (GroupKind::Structure, StageTarget::Element(id)) => group.contains_element(*id),
            (GroupKind::Boundary, StageTarget::Support(id)) => {
                self.supports.get(id).is_some_and(|s| s.group.as_ref() == Some(name))
            }
            (GroupKind::Load, StageTarget::Load(id)) => self.loads.get(id).is_some_and(|l| l.group.as_ref() == Some(name)),
            _ => false,
        }
    }

    /// Effective state of `target` in `log` at stage `at`: records on the
    /// target itself and on every group containing it count, the latest wins.
    pub fn activity_in(&self, log: &StageLog, target: &StageTarget, at: StageIndex) -> Activity {
        log.status_of(
            |t| match t {
                StageTarget::Group(name) if !matches!(target, StageTarget::Group(_)) => self.group_contains(name, target),
                _ => t == target,
            },
            at,
        )
    }

    /// Effective state of `target` at stage `at`
    pub fn activity(&self, target: &StageTarget, at: StageIndex) -> Activity {
        self.activity_in(&self.stage_log, target, at)
    }

    /// Check that every record of `stage` is a legal transition once appended
    /// to the current history. A group record is checked for every member;
    /// a group without members is checked against its own records.
    pub fn check_stage(&self, stage: &ConstructionStage) -> BridgeResult<()> {
        let mut log = self.stage_log.clone();
        self.check_stage_on(&mut log, stage)
    }

    /// Replay every stage from scratch against the current entities
    pub fn check_stage_history(&self) -> BridgeResult<()> {
        let mut log = StageLog::default();
        for stage in self.stages.values() {
            self.check_stage_on(&mut log, stage)?;
        }
        Ok(())
    }

    fn check_stage_on(&self, log: &mut StageLog, stage: &ConstructionStage) -> BridgeResult<()> {
        let end = StageIndex(u32::MAX);
        for activation in &stage.activations {
            let mut subjects = self.members(&activation.target);
            if subjects.is_empty() {
                subjects.push(activation.target.clone());
            }
            for subject in subjects {
                let current = self.activity_in(log, &subject, end);
                activation
                    .action
                    .apply_to(current, &subject.entity_ref())
                    .map_err(|reason| BridgeError::stage_order(stage.index.0, reason))?;
            }
            log.push(StageEvent {
                stage: stage.index,
                target: activation.target.clone(),
                action: activation.action,
            });
        }
        Ok(())
    }

    /// Check the stage history as it would read with `entity` stored
    fn check_history_with<E: Stored>(&self, entity: &E) -> BridgeResult<()> {
        if self.stages.is_empty() {
            return Ok(());
        }
        let mut trial = self.clone();
        E::table_mut(&mut trial).insert(entity.id().clone(), entity.clone());
        trial.check_stage_history()
    }

    // ========================================================================
    // Derived views
    // ========================================================================

    pub fn node_position(&self, id: NodeId) -> Option<Vec3> {
        self.nodes.get(&id).map(|n| n.position)
    }

    /// Length of a line element, if both end nodes exist
    pub fn element_length(&self, element: &Element) -> Option<f64> {
        element.length_with(|id| self.node_position(id))
    }

    pub fn stage_log(&self) -> &StageLog {
        &self.stage_log
    }

    pub fn last_stage(&self) -> Option<StageIndex> {
        self.stages.keys().next_back().copied()
    }

    /// Distinct load case names
    pub fn load_cases(&self) -> BTreeSet<String> {
        self.loads.values().map(|l| l.case.clone()).collect()
    }

    /// Live load case names
    pub fn live_cases(&self) -> BTreeSet<String> {
        self.live_cases.keys().map(|name| name.0.clone()).collect()
    }

    /// Static or live load case of that name exists
    pub fn has_case(&self, name: &str) -> bool {
        self.live_cases.contains_key(&LiveCaseName::from(name)) || self.loads.values().any(|l| l.case == name)
    }

    fn group_count(&self, kind: GroupKind) -> usize {
        self.groups.values().filter(|g| g.kind == kind).count()
    }

    pub fn analysis_config(&self) -> &AnalysisConfig {
        &self.analysis
    }

    pub fn set_analysis_config(&mut self, config: AnalysisConfig) -> BridgeResult<()> {
        config.validate()?;
        self.analysis = config;
        self.touch();
        debug!(revision = self.revision, "analysis configured");
        Ok(())
    }

    /// Every entity in dependency order: referenced kinds before referrers.
    pub fn entities(&self) -> Vec<ModelEntity> {
        let mut out = Vec::new();
        out.extend(self.materials.values().cloned().map(ModelEntity::Material));
        out.extend(self.sections.values().cloned().map(ModelEntity::Section));
        out.extend(self.nodes.values().cloned().map(ModelEntity::Node));
        out.extend(self.elements.values().cloned().map(ModelEntity::Element));
        out.extend(self.groups.values().cloned().map(ModelEntity::Group));
        out.extend(self.supports.values().cloned().map(ModelEntity::Support));
        out.extend(self.links.values().cloned().map(ModelEntity::Link));
        out.extend(self.tendon_properties.values().cloned().map(ModelEntity::TendonProperty));
        out.extend(self.tendons.values().cloned().map(ModelEntity::Tendon));
        out.extend(self.loads.values().cloned().map(ModelEntity::Load));
        out.extend(self.vehicles.values().cloned().map(ModelEntity::Vehicle));
        out.extend(self.lanes.values().cloned().map(ModelEntity::Lane));
        out.extend(self.live_cases.values().cloned().map(ModelEntity::LiveLoadCase));
        out.extend(self.stages.values().cloned().map(ModelEntity::Stage));
        out
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            name: self.meta.name.clone(),
            units: self.meta.units.describe(),
            revision: self.revision,
            node_count: self.nodes.len(),
            element_count: self.elements.len(),
            material_count: self.materials.len(),
            section_count: self.sections.len(),
            support_count: self.supports.len(),
            load_count: self.loads.len(),
            load_case_count: self.load_cases().len(),
            stage_count: self.stages.len(),
            structure_group_count: self.group_count(GroupKind::Structure),
            boundary_group_count: self.group_count(GroupKind::Boundary),
            load_group_count: self.group_count(GroupKind::Load),
            link_count: self.links.len(),
            tendon_count: self.tendons.len(),
            live_load_case_count: self.live_cases.len(),
        }
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            revision: self.revision,
            taken_at: Utc::now(),
            model: self.clone(),
        }
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        ModelRegistry::new("Untitled")
    }
}

/// Frozen copy of a registry, taken when an analysis is submitted.
///
/// Later registry mutations never reach a snapshot.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub revision: u64,
    pub taken_at: DateTime<Utc>,
    model: ModelRegistry,
}

impl ModelSnapshot {
    pub fn model(&self) -> &ModelRegistry {
        &self.model
    }
}

fn parse_u32(id: &str) -> Option<u32> {
    id.parse().ok()
}

/// Optional fields are skipped when unset, so a patch may introduce them.
fn is_optional_field<E: Stored>(key: &str) -> bool {
    matches!(
        (E::KIND, key),
        (EntityKind::Node, "local_axes")
            | (EntityKind::Element, "cable_tension")
            | (EntityKind::Material, "strength" | "grade")
            | (EntityKind::Support | EntityKind::Load | EntityKind::Link | EntityKind::Tendon, "group")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Activation, Fixity, LoadDirection, MaterialKind};
    use serde_json::json;

    fn beam_model() -> ModelRegistry {
        let mut model = ModelRegistry::new("Test");
        model.create(Material::new("C40", MaterialKind::Concrete, 3.25e10, 2500.0)).unwrap();
        model.create(Section::rectangle("S1", 0.5, 1.0)).unwrap();
        model.create(Node::new(1, 0.0, 0.0, 0.0)).unwrap();
        model.create(Node::new(2, 10.0, 0.0, 0.0)).unwrap();
        model.create(Element::beam(1, 1, 2, "C40", "S1")).unwrap();
        model
    }

    #[test]
    fn test_write_then_read() {
        let model = beam_model();
        let element = model.get::<Element>(&ElementId(1)).unwrap();
        assert_eq!(element, &Element::beam(1, 1, 2, "C40", "S1"));
        assert_eq!(model.count::<Node>(), 2);
        assert_eq!(model.revision(), 5);
    }

    #[test]
    fn test_duplicate_id() {
        let mut model = beam_model();
        let err = model.create(Node::new(1, 5.0, 0.0, 0.0)).unwrap_err();
        assert_eq!(err, BridgeError::duplicate_id(EntityKind::Node, 1));
        assert_eq!(model.revision(), 5);
    }

    #[test]
    fn test_create_does_not_check_references() {
        let mut model = ModelRegistry::new("Test");
        assert!(model.create(Element::beam(1, 1, 99, "C40", "S1")).is_ok());
        let element = model.get::<Element>(&ElementId(1)).unwrap();
        assert_eq!(model.unresolved_references(element).len(), 4);
    }

    #[test]
    fn test_get_missing() {
        let model = ModelRegistry::new("Test");
        let err = model.get::<Node>(&NodeId(3)).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_next_id() {
        let model = beam_model();
        assert_eq!(model.next_id::<Node>().unwrap(), NodeId(3));
        assert_eq!(model.next_id::<Load>().unwrap(), LoadId(1));
    }

    #[test]
    fn test_next_id_exhausted() {
        let mut model = ModelRegistry::new("Test");
        model.create(Node::new(u32::MAX, 0.0, 0.0, 0.0)).unwrap();
        let err = model.next_id::<Node>().unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
        assert!(err.to_string().contains("no free node ID above 4294967295"));
    }

    #[test]
    fn test_list_with_filter() {
        let model = beam_model();
        let right = model.list::<Node>(|n| n.position.x > 5.0);
        assert_eq!(right.len(), 1);
        assert_eq!(right[0].id, NodeId(2));
    }

    #[test]
    fn test_update_merges_patch() {
        let mut model = beam_model();
        let updated = model
            .update::<Node>(&NodeId(2), &json!({"position": [12.0, 0.0, 0.0]}))
            .unwrap();
        assert_eq!(updated.position.x, 12.0);
        assert_eq!(model.get::<Node>(&NodeId(2)).unwrap().position.x, 12.0);
        assert_eq!(model.revision(), 6);
    }

    #[test]
    fn test_update_rejects_locked_and_invalid_fields() {
        let mut model = beam_model();
        let err = model.update::<Node>(&NodeId(2), &json!({"id": 7})).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        let err = model
            .update::<Material>(&MaterialId::from("C40"), &json!({"density": -1.0}))
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        let err = model.update::<Node>(&NodeId(2), &json!({"colour": "red"})).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        let err = model.update::<Node>(&NodeId(9), &json!({})).unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert_eq!(model.revision(), 5);
    }

    #[test]
    fn test_update_can_set_and_clear_optional_field() {
        let mut model = beam_model();
        model
            .update::<Material>(&MaterialId::from("C40"), &json!({"grade": "C40"}))
            .unwrap();
        assert_eq!(model.get::<Material>(&MaterialId::from("C40")).unwrap().grade.as_deref(), Some("C40"));
        model
            .update::<Material>(&MaterialId::from("C40"), &json!({"grade": null}))
            .unwrap();
        assert!(model.get::<Material>(&MaterialId::from("C40")).unwrap().grade.is_none());
    }

    #[test]
    fn test_delete_referenced_fails_then_succeeds() {
        let mut model = beam_model();
        let err = model.delete::<Node>(&NodeId(1)).unwrap_err();
        match &err {
            BridgeError::ReferentialIntegrity { related, .. } => {
                assert_eq!(related, &vec![EntityRef::new(EntityKind::Element, 1)]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(model.contains::<Node>(&NodeId(1)));

        model.delete::<Element>(&ElementId(1)).unwrap();
        model.delete::<Node>(&NodeId(1)).unwrap();
        model.delete::<Material>(&MaterialId::from("C40")).unwrap();
        assert!(!model.contains::<Node>(&NodeId(1)));
    }

    #[test]
    fn test_stage_gapless_and_tail_delete() {
        let mut model = beam_model();
        let err = model.create(ConstructionStage::new(2, "Deck")).unwrap_err();
        assert_eq!(err.error_code(), "STAGE_ORDER");

        model
            .create(ConstructionStage::new(1, "Piers").with(Activation::activate(StageTarget::Element(ElementId(1)))))
            .unwrap();
        model.create(ConstructionStage::new(2, "Deck")).unwrap();
        assert_eq!(model.stage_log().events().len(), 1);

        let err = model.delete::<ConstructionStage>(&StageIndex(1)).unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");

        model.delete::<ConstructionStage>(&StageIndex(2)).unwrap();
        model.delete::<ConstructionStage>(&StageIndex(1)).unwrap();
        assert!(model.stage_log().events().is_empty());

        // element is free again once no stage mentions it
        assert!(model.referrers(&EntityRef::new(EntityKind::Element, 1)).is_empty());
    }

    #[test]
    fn test_stage_activations_locked() {
        let mut model = beam_model();
        model
            .create(ConstructionStage::new(1, "Piers").with(Activation::activate(StageTarget::Element(ElementId(1)))))
            .unwrap();
        let err = model
            .update::<ConstructionStage>(&StageIndex(1), &json!({"activations": []}))
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        let renamed = model
            .update::<ConstructionStage>(&StageIndex(1), &json!({"name": "Piers and caps", "duration_days": 14.0}))
            .unwrap();
        assert_eq!(renamed.name, "Piers and caps");
        assert_eq!(renamed.activations.len(), 1);
    }

    #[test]
    fn test_summary_and_snapshot_isolation() {
        let mut model = beam_model();
        model.create(Support::new(1, 1, Fixity::fixed())).unwrap();
        let snapshot = model.snapshot();
        model.create(Node::new(3, 20.0, 0.0, 0.0)).unwrap();

        assert_eq!(snapshot.model().count::<Node>(), 2);
        assert_eq!(model.summary().node_count, 3);
        assert_eq!(model.summary().support_count, 1);
        assert_eq!(snapshot.revision + 1, model.revision());
    }

    #[test]
    fn test_entities_dependency_order() {
        let model = beam_model();
        let kinds: Vec<EntityKind> = model.entities().iter().map(ModelEntity::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EntityKind::Material,
                EntityKind::Section,
                EntityKind::Node,
                EntityKind::Node,
                EntityKind::Element
            ]
        );
    }

    fn group(name: &str) -> StageTarget {
        StageTarget::Group(GroupName::from(name))
    }

    #[test]
    fn test_group_deactivation_reaches_members() {
        let mut model = beam_model();
        model.create(Group::structure("G").with_elements([1])).unwrap();
        model.create(ConstructionStage::new(1, "Erect").with(Activation::activate(group("G")))).unwrap();
        model.create(ConstructionStage::new(2, "Strip").with(Activation::deactivate(group("G")))).unwrap();

        let element = StageTarget::Element(ElementId(1));
        assert_eq!(model.activity(&element, StageIndex(1)), Activity::Active);
        assert_eq!(model.activity(&element, StageIndex(2)), Activity::Inactive);

        let err = model
            .create(ConstructionStage::new(3, "Again").with(Activation::activate(element.clone())))
            .unwrap_err();
        assert_eq!(err.error_code(), "STAGE_ORDER");
        assert!(err.to_string().contains("reactivate"));

        model.create(ConstructionStage::new(3, "Again").with(Activation::reactivate(element.clone()))).unwrap();
        assert_eq!(model.activity(&element, StageIndex(3)), Activity::Active);
    }

    #[test]
    fn test_group_record_checks_every_member() {
        let mut model = beam_model();
        model.create(Node::new(3, 20.0, 0.0, 0.0)).unwrap();
        model.create(Element::beam(2, 2, 3, "C40", "S1")).unwrap();
        model
            .create(ConstructionStage::new(1, "Piers").with(Activation::activate(StageTarget::Element(ElementId(2)))))
            .unwrap();
        model.create(Group::structure("Deck").with_elements([1, 2])).unwrap();

        let err = model
            .create(ConstructionStage::new(2, "Deck").with(Activation::activate(group("Deck"))))
            .unwrap_err();
        assert!(err.to_string().contains("element 2 is already active"));
    }

    #[test]
    fn test_group_deactivates_directly_activated_members() {
        let mut model = beam_model();
        let element = StageTarget::Element(ElementId(1));
        model.create(Group::structure("G").with_elements([1])).unwrap();
        model.create(ConstructionStage::new(1, "Erect").with(Activation::activate(element.clone()))).unwrap();
        model.create(ConstructionStage::new(2, "Strip").with(Activation::deactivate(group("G")))).unwrap();
        assert_eq!(model.activity(&element, StageIndex(2)), Activity::Inactive);

        // an empty group answers for itself
        model.create(Group::structure("Empty")).unwrap();
        let err = model
            .create(ConstructionStage::new(3, "Noop").with(Activation::deactivate(group("Empty"))))
            .unwrap_err();
        assert!(err.to_string().contains("group Empty is not active"));
    }

    #[test]
    fn test_membership_change_replays_history() {
        let mut model = beam_model();
        model.create(Support::new(1, 1, Fixity::fixed())).unwrap();
        model.create(Group::boundary("Temporary")).unwrap();
        model
            .create(ConstructionStage::new(1, "Erect").with(Activation::activate(StageTarget::Support(SupportId(1)))))
            .unwrap();
        model.create(ConstructionStage::new(2, "Shore").with(Activation::activate(group("Temporary")))).unwrap();

        // joining the group would activate support 1 twice
        let err = model
            .update::<Support>(&SupportId(1), &json!({"group": "Temporary"}))
            .unwrap_err();
        assert_eq!(err.error_code(), "STAGE_ORDER");
        assert!(model.get::<Support>(&SupportId(1)).unwrap().group.is_none());

        assert_eq!(model.members(&group("Temporary")), Vec::<StageTarget>::new());
        model.create(Support::new(2, 2, Fixity::pinned()).in_group("Temporary")).unwrap();
        assert_eq!(model.members(&group("Temporary")), vec![StageTarget::Support(SupportId(2))]);
        assert_eq!(model.activity(&StageTarget::Support(SupportId(2)), StageIndex(2)), Activity::Active);
    }

    #[test]
    fn test_operation_stage_closes_sequence() {
        let mut model = beam_model();
        let err = model.create(ConstructionStage::operation(1, "Operation")).unwrap_err();
        assert_eq!(err.error_code(), "STAGE_ORDER");

        model.create(ConstructionStage::new(1, "Erect")).unwrap();
        model.create(ConstructionStage::operation(2, "Operation")).unwrap();
        let err = model.create(ConstructionStage::new(3, "Late")).unwrap_err();
        assert!(err.to_string().contains("operation stage"));
    }

    #[test]
    fn test_plate_conflicts() {
        let mut model = beam_model();
        model.create(Section::plate("P1", 0.3)).unwrap();
        model.create(Node::new(3, 10.0, 5.0, 0.0)).unwrap();
        model
            .create(Element::beam(2, 1, 2, "C40", "P1").with_kind(ElementKind::Plate).with_nodes(&[1, 2, 3]))
            .unwrap();

        let load = Load::uniform(1, "Dead", 2, LoadDirection::GlobalZ, 0.0, 1.0, -5.0);
        assert_eq!(load.conflicts(&model).len(), 1);
        let on_beam = Load::uniform(2, "Dead", 1, LoadDirection::GlobalZ, 0.0, 1.0, -5.0);
        assert!(on_beam.conflicts(&model).is_empty());

        model.create(load).unwrap();
        let conflicts = model.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].0, EntityRef::new(EntityKind::Load, 1));
    }

    #[test]
    fn test_group_kind_conflict() {
        let mut model = beam_model();
        model.create(Group::load("Prestress")).unwrap();
        let support = Support::new(1, 1, Fixity::fixed()).in_group("Prestress");
        let conflicts = support.conflicts(&model);
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].reason.contains("boundary group"));
    }
}
