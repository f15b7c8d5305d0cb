//! Groups: named sets used for reporting and staged activation.
//!
//! A structure group lists its elements and nodes directly. Boundary and load
//! groups hold no list of their own: supports, links, loads and tendons join
//! one by naming it in their `group` field.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{require_name, ElementId, Entity, EntityKind, EntityRef, GroupName, NodeId};
use crate::errors::{BridgeError, BridgeResult};

/// What a group collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Elements and nodes
    #[default]
    Structure,
    /// Supports and links
    Boundary,
    /// Loads and tendons
    Load,
}

impl GroupKind {
    pub fn name(&self) -> &'static str {
        match self {
            GroupKind::Structure => "structure",
            GroupKind::Boundary => "boundary",
            GroupKind::Load => "load",
        }
    }
}

/// A named subset of the model. Membership is many-to-many.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupName,

    #[serde(default)]
    pub kind: GroupKind,

    #[serde(default)]
    pub elements: BTreeSet<ElementId>,

    #[serde(default)]
    pub nodes: BTreeSet<NodeId>,
}

impl Group {
    pub fn new(name: &str, kind: GroupKind) -> Self {
        Group {
            id: GroupName::from(name),
            kind,
            elements: BTreeSet::new(),
            nodes: BTreeSet::new(),
        }
    }

    pub fn structure(name: &str) -> Self {
        Group::new(name, GroupKind::Structure)
    }

    pub fn boundary(name: &str) -> Self {
        Group::new(name, GroupKind::Boundary)
    }

    pub fn load(name: &str) -> Self {
        Group::new(name, GroupKind::Load)
    }

    /// Add elements (builder pattern)
    pub fn with_elements(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.elements.extend(ids.into_iter().map(ElementId));
        self
    }

    /// Add nodes (builder pattern)
    pub fn with_nodes(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.nodes.extend(ids.into_iter().map(NodeId));
        self
    }

    pub fn contains_element(&self, id: ElementId) -> bool {
        self.elements.contains(&id)
    }
}

impl Entity for Group {
    type Id = GroupName;
    const KIND: EntityKind = EntityKind::Group;
    const LOCKED_FIELDS: &'static [&'static str] = &["id", "kind"];

    fn id(&self) -> &GroupName {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        require_name(EntityKind::Group, "id", &self.id.0)?;
        if self.id.0.len() > 64 {
            return Err(BridgeError::schema("group", "id", "must be at most 64 characters"));
        }
        if self.kind != GroupKind::Structure && !(self.elements.is_empty() && self.nodes.is_empty()) {
            return Err(BridgeError::schema(
                "group",
                "elements",
                format!(
                    "only structure groups list elements and nodes; members join a {} group through their own `group` field",
                    self.kind.name()
                ),
            ));
        }
        Ok(())
    }

    fn references(&self) -> Vec<EntityRef> {
        self.elements
            .iter()
            .map(|e| EntityRef::new(EntityKind::Element, e))
            .chain(self.nodes.iter().map(|n| EntityRef::new(EntityKind::Node, n)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_membership() {
        let group = Group::structure("Girder").with_elements([1, 2, 2, 3]).with_nodes([1]);
        assert_eq!(group.elements.len(), 3);
        assert!(group.contains_element(ElementId(2)));
        assert_eq!(group.references().len(), 4);
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(Group::structure("").validate().is_err());
    }

    #[test]
    fn test_boundary_group_lists_nothing() {
        assert!(Group::boundary("Bearings").validate().is_ok());
        let err = Group::load("Prestress").with_elements([1]).validate().unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }

    #[test]
    fn test_kind_defaults_to_structure() {
        let group: Group = serde_json::from_str(r#"{"id":"Deck","elements":[4]}"#).unwrap();
        assert_eq!(group.kind, GroupKind::Structure);
    }
}
