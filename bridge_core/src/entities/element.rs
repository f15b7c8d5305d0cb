//! Elements: beams, trusses, cables and plates connecting nodes.

use serde::{Deserialize, Serialize};

use super::{require_finite, require_non_negative, Entity, EntityKind, EntityRef, ElementId, MaterialId, NodeId, SectionClass, SectionId};
use crate::errors::{BridgeError, BridgeResult};
use crate::units::Vec3;

/// Element formulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Beam,
    Truss,
    Cable,
    Plate,
}

impl ElementKind {
    /// Allowed number of connected nodes
    pub fn node_count(&self) -> (usize, usize) {
        match self {
            ElementKind::Plate => (3, 4),
            _ => (2, 2),
        }
    }

    /// Section class this kind of element needs
    pub fn section_class(&self) -> SectionClass {
        match self {
            ElementKind::Plate => SectionClass::Plate,
            _ => SectionClass::Line,
        }
    }

    /// Whether the orientation angle is meaningful
    pub fn has_orientation(&self) -> bool {
        matches!(self, ElementKind::Beam | ElementKind::Plate)
    }
}

/// A structural element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,

    pub kind: ElementKind,

    /// Ordered node references (i, j for line elements; i, j, k[, l] for plates)
    pub nodes: Vec<NodeId>,

    pub material: MaterialId,

    /// Section (or plate thickness) reference
    pub section: SectionId,

    /// Orientation angle β about the element axis, degrees
    #[serde(default)]
    pub beta_deg: f64,

    /// Initial cable tension (cables only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cable_tension: Option<f64>,
}

impl Element {
    /// Create a two-node beam element
    pub fn beam(id: u32, i: u32, j: u32, material: &str, section: &str) -> Self {
        Element {
            id: ElementId(id),
            kind: ElementKind::Beam,
            nodes: vec![NodeId(i), NodeId(j)],
            material: MaterialId::from(material),
            section: SectionId::from(section),
            beta_deg: 0.0,
            cable_tension: None,
        }
    }

    /// Set the element kind (builder pattern)
    pub fn with_kind(mut self, kind: ElementKind) -> Self {
        self.kind = kind;
        self
    }

    /// Replace the node list (builder pattern)
    pub fn with_nodes(mut self, nodes: &[u32]) -> Self {
        self.nodes = nodes.iter().copied().map(NodeId).collect();
        self
    }

    /// Length of a line element given a node position lookup.
    ///
    /// Returns `None` for plates or when an end node cannot be resolved.
    pub fn length_with<F>(&self, position: F) -> Option<f64>
    where
        F: Fn(NodeId) -> Option<Vec3>,
    {
        if self.kind == ElementKind::Plate || self.nodes.len() != 2 {
            return None;
        }
        let i = position(self.nodes[0])?;
        let j = position(self.nodes[1])?;
        Some(i.distance(j))
    }
}

impl Entity for Element {
    type Id = ElementId;
    const KIND: EntityKind = EntityKind::Element;

    fn id(&self) -> &ElementId {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        let (min, max) = self.kind.node_count();
        if self.nodes.len() < min || self.nodes.len() > max {
            let expected = if min == max { min.to_string() } else { format!("{min} to {max}") };
            return Err(BridgeError::schema(
                "element",
                "nodes",
                format!("{:?} element needs {expected} nodes, got {}", self.kind, self.nodes.len()),
            ));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if self.nodes[..i].contains(node) {
                return Err(BridgeError::schema("element", "nodes", format!("node {node} is listed twice")));
            }
        }

        if self.material.0.trim().is_empty() {
            return Err(BridgeError::schema("element", "material", "must not be empty"));
        }
        if self.section.0.trim().is_empty() {
            return Err(BridgeError::schema("element", "section", "must not be empty"));
        }

        require_finite(EntityKind::Element, "beta_deg", self.beta_deg)?;
        if !self.kind.has_orientation() && self.beta_deg != 0.0 {
            return Err(BridgeError::schema(
                "element",
                "beta_deg",
                format!("{:?} elements carry no orientation", self.kind),
            ));
        }

        if let Some(tension) = self.cable_tension {
            if self.kind != ElementKind::Cable {
                return Err(BridgeError::schema("element", "cable_tension", "only cable elements take a tension"));
            }
            require_non_negative(EntityKind::Element, "cable_tension", tension)?;
        }
        Ok(())
    }

    fn references(&self) -> Vec<EntityRef> {
        let mut refs: Vec<EntityRef> = self
            .nodes
            .iter()
            .map(|n| EntityRef::new(EntityKind::Node, n))
            .collect();
        refs.push(EntityRef::new(EntityKind::Material, &self.material));
        refs.push(EntityRef::new(EntityKind::Section, &self.section));
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beam_validation() {
        let beam = Element::beam(1, 1, 2, "C40", "S1");
        assert!(beam.validate().is_ok());
        assert_eq!(beam.references().len(), 4);
    }

    #[test]
    fn test_node_count_enforced() {
        let plate = Element::beam(1, 1, 2, "C40", "P1").with_kind(ElementKind::Plate);
        assert!(plate.validate().is_err());

        let plate = plate.with_nodes(&[1, 2, 3, 4]);
        assert!(plate.validate().is_ok());

        let truss = Element::beam(2, 1, 2, "Q345", "S1")
            .with_kind(ElementKind::Truss)
            .with_nodes(&[1, 2, 3]);
        assert!(truss.validate().is_err());
    }

    #[test]
    fn test_repeated_node_rejected() {
        let beam = Element::beam(1, 4, 4, "C40", "S1");
        let err = beam.validate().unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_tension_only_on_cables() {
        let mut beam = Element::beam(1, 1, 2, "C40", "S1");
        beam.cable_tension = Some(1000.0);
        assert!(beam.validate().is_err());

        let mut cable = Element::beam(2, 1, 2, "Q345", "S1").with_kind(ElementKind::Cable);
        cable.cable_tension = Some(1000.0);
        assert!(cable.validate().is_ok());
    }

    #[test]
    fn test_length_with_lookup() {
        let beam = Element::beam(1, 1, 2, "C40", "S1");
        let length = beam.length_with(|id| match id.0 {
            1 => Some(Vec3::new(0.0, 0.0, 0.0)),
            2 => Some(Vec3::new(10.0, 0.0, 0.0)),
            _ => None,
        });
        assert_eq!(length, Some(10.0));
        assert_eq!(beam.length_with(|_| None), None);
    }
}
