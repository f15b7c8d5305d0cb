//! Construction stages and the activation history they produce.
//!
//! Stages form a gapless sequence 1, 2, 3, ... Each stage carries activation
//! records; the registry replays them into an append-only [`StageLog`]. Whether
//! a target is active at a given stage is always derived from that log, never
//! stored as a flag, so a deactivated target can only come back through an
//! explicit [`StageAction::Reactivate`] record.

use serde::{Deserialize, Serialize};

use super::{require_name, require_non_negative, ElementId, Entity, EntityKind, EntityRef, GroupName, LoadId, StageIndex, SupportId};
use crate::errors::{BridgeError, BridgeResult};

/// What an activation record switches on or off
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StageTarget {
    Element(ElementId),
    Load(LoadId),
    Support(SupportId),
    /// Every member of a group: the elements of a structure group, the
    /// supports and links of a boundary group, the loads of a load group
    Group(GroupName),
}

impl StageTarget {
    pub fn entity_ref(&self) -> EntityRef {
        match self {
            StageTarget::Element(id) => EntityRef::new(EntityKind::Element, id),
            StageTarget::Load(id) => EntityRef::new(EntityKind::Load, id),
            StageTarget::Support(id) => EntityRef::new(EntityKind::Support, id),
            StageTarget::Group(name) => EntityRef::new(EntityKind::Group, name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAction {
    /// First activation of a target that was never active
    Activate,
    Deactivate,
    /// Bring back a previously deactivated target
    Reactivate,
}

impl StageAction {
    /// State of `target` after this action, or why the transition is illegal
    pub fn apply_to(self, current: Activity, target: &EntityRef) -> Result<Activity, String> {
        match (self, current) {
            (StageAction::Activate, Activity::Unstaged) | (StageAction::Reactivate, Activity::Inactive) => Ok(Activity::Active),
            (StageAction::Deactivate, Activity::Active) => Ok(Activity::Inactive),
            (StageAction::Activate, Activity::Inactive) => Err(format!(
                "{target} was deactivated earlier; re-activation needs an explicit reactivate record"
            )),
            (StageAction::Activate, _) => Err(format!("{target} is already active")),
            (StageAction::Deactivate, _) => Err(format!("{target} is not active and cannot be deactivated")),
            (StageAction::Reactivate, _) => Err(format!("{target} was never deactivated and cannot be reactivated")),
        }
    }
}

/// One record of a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    pub target: StageTarget,
    pub action: StageAction,
}

impl Activation {
    pub fn activate(target: StageTarget) -> Self {
        Activation {
            target,
            action: StageAction::Activate,
        }
    }

    pub fn deactivate(target: StageTarget) -> Self {
        Activation {
            target,
            action: StageAction::Deactivate,
        }
    }

    pub fn reactivate(target: StageTarget) -> Self {
        Activation {
            target,
            action: StageAction::Reactivate,
        }
    }
}

/// A construction stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionStage {
    /// 1-based position in the stage sequence
    pub index: StageIndex,

    pub name: String,

    #[serde(default)]
    pub duration_days: f64,

    #[serde(default)]
    pub activations: Vec<Activation>,

    /// The closing stage that merges construction into the service state
    #[serde(default)]
    pub operation: bool,
}

impl ConstructionStage {
    pub fn new(index: u32, name: &str) -> Self {
        ConstructionStage {
            index: StageIndex(index),
            name: name.to_string(),
            duration_days: 0.0,
            activations: Vec::new(),
            operation: false,
        }
    }

    /// The operation stage closing the construction sequence
    pub fn operation(index: u32, name: &str) -> Self {
        ConstructionStage {
            operation: true,
            ..ConstructionStage::new(index, name)
        }
    }

    /// Set the duration (builder pattern)
    pub fn with_duration(mut self, days: f64) -> Self {
        self.duration_days = days;
        self
    }

    /// Append an activation record (builder pattern)
    pub fn with(mut self, activation: Activation) -> Self {
        self.activations.push(activation);
        self
    }
}

impl Entity for ConstructionStage {
    type Id = StageIndex;
    const KIND: EntityKind = EntityKind::Stage;
    const LOCKED_FIELDS: &'static [&'static str] = &["index", "activations", "operation"];

    fn id(&self) -> &StageIndex {
        &self.index
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.index.0 == 0 {
            return Err(BridgeError::schema("stage", "index", "stages are numbered from 1"));
        }
        require_name(EntityKind::Stage, "name", &self.name)?;
        require_non_negative(EntityKind::Stage, "duration_days", self.duration_days)?;

        for (i, activation) in self.activations.iter().enumerate() {
            if self.activations[..i].iter().any(|a| a.target == activation.target) {
                return Err(BridgeError::schema(
                    "stage",
                    "activations",
                    format!("{} appears more than once in the same stage", activation.target.entity_ref()),
                ));
            }
        }
        Ok(())
    }

    fn references(&self) -> Vec<EntityRef> {
        let mut refs: Vec<EntityRef> = self.activations.iter().map(|a| a.target.entity_ref()).collect();
        if self.index.0 > 1 {
            refs.push(EntityRef::new(EntityKind::Stage, self.index.0 - 1));
        }
        refs
    }
}

// ============================================================================
// Activation Log
// ============================================================================

/// Derived state of a target at some stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    /// No record mentions the target at all
    Unstaged,
    /// Records exist, but only for later stages
    Pending,
    Active,
    Inactive,
}

/// One entry of the activation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: StageIndex,
    pub target: StageTarget,
    pub action: StageAction,
}

/// Append-only history of activation records, in stage order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageLog {
    events: Vec<StageEvent>,
}

impl StageLog {
    pub fn events(&self) -> &[StageEvent] {
        &self.events
    }

    /// Whether any record mentions the target
    pub fn mentions(&self, target: &StageTarget) -> bool {
        self.events.iter().any(|e| &e.target == target)
    }

    /// State of `target` once all records up to and including stage `at` applied
    pub fn status(&self, target: &StageTarget, at: StageIndex) -> Activity {
        self.status_of(|t| t == target, at)
    }

    /// Like [`StageLog::status`], but every record whose target passes `matches`
    /// counts; the latest of them decides.
    pub fn status_of(&self, matches: impl Fn(&StageTarget) -> bool, at: StageIndex) -> Activity {
        let mut status = Activity::Unstaged;
        for event in self.events.iter().filter(|e| matches(&e.target)) {
            if event.stage > at {
                if status == Activity::Unstaged {
                    status = Activity::Pending;
                }
                break;
            }
            status = match event.action {
                StageAction::Activate | StageAction::Reactivate => Activity::Active,
                StageAction::Deactivate => Activity::Inactive,
            };
        }
        status
    }

    pub(crate) fn push(&mut self, event: StageEvent) {
        self.events.push(event);
    }

    pub(crate) fn append(&mut self, stage: &ConstructionStage) {
        self.events.extend(stage.activations.iter().map(|a| StageEvent {
            stage: stage.index,
            target: a.target.clone(),
            action: a.action,
        }));
    }

    /// Drop the records of `stage` and every later stage
    pub(crate) fn truncate_from(&mut self, stage: StageIndex) {
        self.events.retain(|e| e.stage < stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(id: u32) -> StageTarget {
        StageTarget::Element(ElementId(id))
    }

    #[test]
    fn test_stage_references_previous() {
        let stage = ConstructionStage::new(3, "Deck").with(Activation::activate(element(7)));
        let refs = stage.references();
        assert!(refs.contains(&EntityRef::new(EntityKind::Element, 7)));
        assert!(refs.contains(&EntityRef::new(EntityKind::Stage, 2)));
        assert!(ConstructionStage::new(1, "Piers").references().is_empty());
    }

    #[test]
    fn test_stage_validation() {
        assert!(ConstructionStage::new(0, "Zero").validate().is_err());
        assert!(ConstructionStage::new(1, "").validate().is_err());
        let twice = ConstructionStage::new(1, "Piers")
            .with(Activation::activate(element(1)))
            .with(Activation::deactivate(element(1)));
        assert!(twice.validate().is_err());
    }

    #[test]
    fn test_status_replay() {
        let mut log = StageLog::default();
        let s1 = ConstructionStage::new(1, "Erect").with(Activation::activate(element(1)));
        let s2 = ConstructionStage::new(2, "Remove falsework").with(Activation::deactivate(element(1)));
        log.append(&s1);
        log.append(&s2);

        assert_eq!(log.status(&element(1), StageIndex(1)), Activity::Active);
        assert_eq!(log.status(&element(1), StageIndex(2)), Activity::Inactive);
        assert_eq!(log.status(&element(2), StageIndex(2)), Activity::Unstaged);

        let mut later = StageLog::default();
        later.append(&ConstructionStage::new(2, "Late").with(Activation::activate(element(5))));
        assert_eq!(later.status(&element(5), StageIndex(1)), Activity::Pending);
    }

    #[test]
    fn test_no_implicit_resurrection() {
        let target = EntityRef::new(EntityKind::Element, 1);
        let err = StageAction::Activate.apply_to(Activity::Inactive, &target).unwrap_err();
        assert!(err.contains("reactivate"));
        assert_eq!(StageAction::Reactivate.apply_to(Activity::Inactive, &target), Ok(Activity::Active));
        assert!(StageAction::Reactivate.apply_to(Activity::Active, &target).is_err());
    }

    #[test]
    fn test_deactivate_requires_active() {
        let target = EntityRef::new(EntityKind::Element, 1);
        assert!(StageAction::Deactivate.apply_to(Activity::Unstaged, &target).is_err());
        assert_eq!(StageAction::Deactivate.apply_to(Activity::Active, &target), Ok(Activity::Inactive));
    }

    #[test]
    fn test_latest_matching_record_wins() {
        let group = StageTarget::Group(GroupName::from("Span 1"));
        let mut log = StageLog::default();
        log.append(&ConstructionStage::new(1, "Erect").with(Activation::activate(group.clone())));
        log.append(&ConstructionStage::new(2, "Strip").with(Activation::deactivate(group.clone())));

        let element_or_group = |t: &StageTarget| *t == element(1) || *t == group;
        assert_eq!(log.status_of(element_or_group, StageIndex(1)), Activity::Active);
        assert_eq!(log.status_of(element_or_group, StageIndex(2)), Activity::Inactive);
        assert_eq!(log.status(&element(1), StageIndex(2)), Activity::Unstaged);
    }

    #[test]
    fn test_operation_stage_flag() {
        let stage: ConstructionStage = serde_json::from_str(r#"{"index":2,"name":"Operation","operation":true}"#).unwrap();
        assert_eq!(stage, ConstructionStage::operation(2, "Operation"));
        assert!(!ConstructionStage::new(1, "Piers").operation);
    }

    #[test]
    fn test_truncate() {
        let mut log = StageLog::default();
        log.append(&ConstructionStage::new(1, "A").with(Activation::activate(element(1))));
        log.append(&ConstructionStage::new(2, "B").with(Activation::activate(element(2))));
        log.truncate_from(StageIndex(2));
        assert_eq!(log.events().len(), 1);
        assert!(!log.mentions(&element(2)));
    }

    #[test]
    fn test_target_json() {
        let json = serde_json::to_string(&StageTarget::Group(GroupName::from("Span 1"))).unwrap();
        assert_eq!(json, r#"{"kind":"group","id":"Span 1"}"#);
    }
}
