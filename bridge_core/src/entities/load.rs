//! Loads: nodal forces and moments, distributed loads on line elements,
//! tendon prestress and self-weight.

use serde::{Deserialize, Serialize};

use super::{
    require_finite, require_name, require_non_negative, require_positive, ElementId, Entity, EntityKind, EntityRef, GroupName,
    LoadId, NodeId, TendonName,
};
use crate::errors::{BridgeError, BridgeResult};
use crate::units::Vec3;

/// Direction of a distributed load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadDirection {
    GlobalX,
    GlobalY,
    #[default]
    GlobalZ,
    LocalX,
    LocalY,
    LocalZ,
}

/// How a load is applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadKind {
    /// Force and moment vectors at a node
    Nodal {
        node: NodeId,
        #[serde(default)]
        force: Vec3,
        #[serde(default)]
        moment: Vec3,
    },

    /// Linearly varying line load on part of an element.
    ///
    /// Positions are absolute distances from node i, in model length units.
    Distributed {
        element: ElementId,
        #[serde(default)]
        direction: LoadDirection,
        start: f64,
        end: f64,
        start_magnitude: f64,
        end_magnitude: f64,
    },

    /// Jacking force applied to a tendon
    Prestress { tendon: TendonName, force: f64 },

    /// Dead weight of every element, acting along global -Z
    SelfWeight {
        #[serde(default = "unit_factor")]
        factor: f64,
    },
}

fn unit_factor() -> f64 {
    1.0
}

/// A load belonging to a load case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub id: LoadId,

    /// Load case name
    pub case: String,

    /// Load group used for staged activation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupName>,

    pub kind: LoadKind,
}

impl Load {
    /// Nodal force (no moment)
    pub fn nodal_force(id: u32, case: &str, node: u32, force: Vec3) -> Self {
        Load {
            id: LoadId(id),
            case: case.to_string(),
            group: None,
            kind: LoadKind::Nodal {
                node: NodeId(node),
                force,
                moment: Vec3::ZERO,
            },
        }
    }

    /// Uniform distributed load between `start` and `end`
    pub fn uniform(id: u32, case: &str, element: u32, direction: LoadDirection, start: f64, end: f64, magnitude: f64) -> Self {
        Load {
            id: LoadId(id),
            case: case.to_string(),
            group: None,
            kind: LoadKind::Distributed {
                element: ElementId(element),
                direction,
                start,
                end,
                start_magnitude: magnitude,
                end_magnitude: magnitude,
            },
        }
    }

    /// Prestress of a tendon
    pub fn prestress(id: u32, case: &str, tendon: &str, force: f64) -> Self {
        Load {
            id: LoadId(id),
            case: case.to_string(),
            group: None,
            kind: LoadKind::Prestress {
                tendon: TendonName::from(tendon),
                force,
            },
        }
    }

    /// Self-weight of the whole structure
    pub fn self_weight(id: u32, case: &str) -> Self {
        Load {
            id: LoadId(id),
            case: case.to_string(),
            group: None,
            kind: LoadKind::SelfWeight { factor: 1.0 },
        }
    }

    /// Join a load group (builder pattern)
    pub fn in_group(mut self, group: &str) -> Self {
        self.group = Some(GroupName::from(group));
        self
    }

    /// Loaded element, if this is a distributed load
    pub fn element(&self) -> Option<ElementId> {
        match &self.kind {
            LoadKind::Distributed { element, .. } => Some(*element),
            _ => None,
        }
    }

    /// Loaded node, if this is a nodal load
    pub fn node(&self) -> Option<NodeId> {
        match &self.kind {
            LoadKind::Nodal { node, .. } => Some(*node),
            _ => None,
        }
    }

    /// Stressed tendon, if this is a prestress load
    pub fn tendon(&self) -> Option<&TendonName> {
        match &self.kind {
            LoadKind::Prestress { tendon, .. } => Some(tendon),
            _ => None,
        }
    }

    /// (start, end) span of a distributed load
    pub fn span(&self) -> Option<(f64, f64)> {
        match &self.kind {
            LoadKind::Distributed { start, end, .. } => Some((*start, *end)),
            _ => None,
        }
    }
}

impl Entity for Load {
    type Id = LoadId;
    const KIND: EntityKind = EntityKind::Load;

    fn id(&self) -> &LoadId {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        require_name(EntityKind::Load, "case", &self.case)?;
        if let Some(group) = &self.group {
            require_name(EntityKind::Load, "group", &group.0)?;
        }

        match &self.kind {
            LoadKind::Nodal { force, moment, .. } => {
                if !force.is_finite() {
                    return Err(BridgeError::schema("load", "force", "components must be finite"));
                }
                if !moment.is_finite() {
                    return Err(BridgeError::schema("load", "moment", "components must be finite"));
                }
                if *force == Vec3::ZERO && *moment == Vec3::ZERO {
                    return Err(BridgeError::schema("load", "force", "nodal load has no non-zero component"));
                }
            }
            LoadKind::Distributed {
                start,
                end,
                start_magnitude,
                end_magnitude,
                ..
            } => {
                require_non_negative(EntityKind::Load, "start", *start)?;
                require_finite(EntityKind::Load, "end", *end)?;
                if end <= start {
                    return Err(BridgeError::schema(
                        "load",
                        "end",
                        format!("must be greater than start ({start}), got {end}"),
                    ));
                }
                require_finite(EntityKind::Load, "start_magnitude", *start_magnitude)?;
                require_finite(EntityKind::Load, "end_magnitude", *end_magnitude)?;
                if *start_magnitude == 0.0 && *end_magnitude == 0.0 {
                    return Err(BridgeError::schema("load", "start_magnitude", "distributed load has zero magnitude"));
                }
            }
            LoadKind::Prestress { tendon, force } => {
                require_name(EntityKind::Load, "tendon", &tendon.0)?;
                require_positive(EntityKind::Load, "force", *force)?;
            }
            LoadKind::SelfWeight { factor } => {
                require_finite(EntityKind::Load, "factor", *factor)?;
                if *factor == 0.0 {
                    return Err(BridgeError::schema("load", "factor", "self-weight factor must not be zero"));
                }
            }
        }
        Ok(())
    }

    fn references(&self) -> Vec<EntityRef> {
        let mut refs = match &self.kind {
            LoadKind::Nodal { node, .. } => vec![EntityRef::new(EntityKind::Node, node)],
            LoadKind::Distributed { element, .. } => vec![EntityRef::new(EntityKind::Element, element)],
            LoadKind::Prestress { tendon, .. } => vec![EntityRef::new(EntityKind::Tendon, tendon)],
            LoadKind::SelfWeight { .. } => Vec::new(),
        };
        refs.extend(self.group.iter().map(|g| EntityRef::new(EntityKind::Group, g)));
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodal_load() {
        let load = Load::nodal_force(1, "Dead", 2, Vec3::new(0.0, -100.0, 0.0));
        assert!(load.validate().is_ok());
        assert_eq!(load.node(), Some(NodeId(2)));
        assert_eq!(load.references(), vec![EntityRef::new(EntityKind::Node, 2)]);
    }

    #[test]
    fn test_zero_nodal_load_rejected() {
        let load = Load::nodal_force(1, "Dead", 2, Vec3::ZERO);
        assert!(load.validate().is_err());
    }

    #[test]
    fn test_distributed_span_order() {
        let load = Load::uniform(1, "Dead", 1, LoadDirection::GlobalZ, 6.0, 4.0, -10.0);
        let err = load.validate().unwrap_err();
        match err {
            BridgeError::Schema { field, .. } => assert_eq!(field, "end"),
            other => panic!("unexpected error: {other:?}"),
        }

        let load = Load::uniform(1, "Dead", 1, LoadDirection::GlobalZ, -1.0, 4.0, -10.0);
        assert!(load.validate().is_err());
    }

    #[test]
    fn test_empty_case_rejected() {
        let load = Load::nodal_force(1, "  ", 2, Vec3::new(1.0, 0.0, 0.0));
        assert!(load.validate().is_err());
    }

    #[test]
    fn test_prestress_and_self_weight() {
        let load = Load::prestress(4, "PS", "T1", 3.0e6).in_group("Stressing");
        assert!(load.validate().is_ok());
        assert_eq!(load.tendon(), Some(&TendonName::from("T1")));
        assert_eq!(
            load.references(),
            vec![EntityRef::new(EntityKind::Tendon, "T1"), EntityRef::new(EntityKind::Group, "Stressing")]
        );
        assert!(Load::prestress(5, "PS", "T1", 0.0).validate().is_err());

        let weight: Load = serde_json::from_str(r#"{"id":1,"case":"SW","kind":{"type":"self_weight"}}"#).unwrap();
        assert_eq!(weight, Load::self_weight(1, "SW"));
        assert!(weight.references().is_empty());
    }

    #[test]
    fn test_load_json_shape() {
        let json = r#"{"id":3,"case":"Live","kind":{"type":"distributed","element":1,"start":0.0,"end":10.0,"start_magnitude":-5.0,"end_magnitude":-5.0}}"#;
        let load: Load = serde_json::from_str(json).unwrap();
        assert_eq!(load.element(), Some(ElementId(1)));
        assert_eq!(load.span(), Some((0.0, 10.0)));
        match load.kind {
            LoadKind::Distributed { direction, .. } => assert_eq!(direction, LoadDirection::GlobalZ),
            _ => panic!("expected distributed load"),
        }
    }
}
