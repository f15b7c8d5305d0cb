//! Supports: six-degree-of-freedom boundary conditions at nodes.

use serde::{Deserialize, Serialize};

use super::{require_name, require_positive, Entity, EntityKind, EntityRef, GroupName, NodeId, SupportId};
use crate::errors::{BridgeError, BridgeResult};

/// Restraint state of a single degree of freedom
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Restraint {
    #[default]
    Free,
    Fixed,
    Spring {
        stiffness: f64,
    },
}

impl Restraint {
    pub fn from_flag(fixed: bool) -> Self {
        if fixed {
            Restraint::Fixed
        } else {
            Restraint::Free
        }
    }

    pub fn is_restrained(&self) -> bool {
        !matches!(self, Restraint::Free)
    }
}

/// Fixity mask for the six DOFs: translations dx, dy, dz and rotations rx, ry, rz
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Fixity {
    #[serde(default)]
    pub dx: Restraint,
    #[serde(default)]
    pub dy: Restraint,
    #[serde(default)]
    pub dz: Restraint,
    #[serde(default)]
    pub rx: Restraint,
    #[serde(default)]
    pub ry: Restraint,
    #[serde(default)]
    pub rz: Restraint,
}

impl Fixity {
    pub const DOF_NAMES: [&'static str; 6] = ["dx", "dy", "dz", "rx", "ry", "rz"];

    /// All six DOFs fixed
    pub fn fixed() -> Self {
        Fixity::from_flags([true; 6])
    }

    /// Translations fixed, rotations free
    pub fn pinned() -> Self {
        Fixity::from_flags([true, true, true, false, false, false])
    }

    /// Build from fixed/free flags in dx, dy, dz, rx, ry, rz order
    pub fn from_flags(flags: [bool; 6]) -> Self {
        let [dx, dy, dz, rx, ry, rz] = flags.map(Restraint::from_flag);
        Fixity { dx, dy, dz, rx, ry, rz }
    }

    /// Spring on every DOF with a non-zero stiffness, free elsewhere
    pub fn springs(stiffness: [f64; 6]) -> Self {
        let [dx, dy, dz, rx, ry, rz] = stiffness.map(|k| if k == 0.0 { Restraint::Free } else { Restraint::Spring { stiffness: k } });
        Fixity { dx, dy, dz, rx, ry, rz }
    }

    pub fn dofs(&self) -> [Restraint; 6] {
        [self.dx, self.dy, self.dz, self.rx, self.ry, self.rz]
    }
}

/// A support on one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Support {
    pub id: SupportId,

    pub node: NodeId,

    pub fixity: Fixity,

    /// Boundary group used for staged activation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupName>,
}

impl Support {
    pub fn new(id: u32, node: u32, fixity: Fixity) -> Self {
        Support {
            id: SupportId(id),
            node: NodeId(node),
            fixity,
            group: None,
        }
    }

    /// Join a boundary group (builder pattern)
    pub fn in_group(mut self, group: &str) -> Self {
        self.group = Some(GroupName::from(group));
        self
    }
}

impl Entity for Support {
    type Id = SupportId;
    const KIND: EntityKind = EntityKind::Support;

    fn id(&self) -> &SupportId {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        let dofs = self.fixity.dofs();
        if !dofs.iter().any(Restraint::is_restrained) {
            return Err(BridgeError::schema("support", "fixity", "at least one DOF must be fixed or spring-restrained"));
        }
        for (name, dof) in Fixity::DOF_NAMES.iter().zip(dofs) {
            if let Restraint::Spring { stiffness } = dof {
                require_positive(EntityKind::Support, &format!("fixity.{name}.stiffness"), stiffness)?;
            }
        }
        if let Some(group) = &self.group {
            require_name(EntityKind::Support, "group", &group.0)?;
        }
        Ok(())
    }

    fn references(&self) -> Vec<EntityRef> {
        let mut refs = vec![EntityRef::new(EntityKind::Node, self.node)];
        refs.extend(self.group.iter().map(|g| EntityRef::new(EntityKind::Group, g)));
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixity_constructors() {
        assert!(Fixity::fixed().dofs().iter().all(Restraint::is_restrained));
        let pinned = Fixity::pinned();
        assert_eq!(pinned.dz, Restraint::Fixed);
        assert_eq!(pinned.rz, Restraint::Free);
    }

    #[test]
    fn test_free_support_rejected() {
        let support = Support::new(1, 1, Fixity::default());
        assert!(support.validate().is_err());
    }

    #[test]
    fn test_spring_stiffness_positive() {
        let mut fixity = Fixity::pinned();
        fixity.rz = Restraint::Spring { stiffness: -5.0 };
        let err = Support::new(1, 1, fixity).validate().unwrap_err();
        match err {
            BridgeError::Schema { field, .. } => assert_eq!(field, "fixity.rz.stiffness"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_springs_leave_zero_dofs_free() {
        let fixity = Fixity::springs([1e6, 0.0, 2e6, 0.0, 0.0, 0.0]);
        assert_eq!(fixity.dx, Restraint::Spring { stiffness: 1e6 });
        assert_eq!(fixity.dy, Restraint::Free);
        assert!(Support::new(1, 1, fixity).validate().is_ok());
        assert!(Support::new(1, 1, Fixity::springs([-1.0, 0.0, 0.0, 0.0, 0.0, 0.0])).validate().is_err());
    }

    #[test]
    fn test_group_is_a_reference() {
        let support = Support::new(1, 4, Fixity::pinned()).in_group("Bearings");
        assert_eq!(
            support.references(),
            vec![EntityRef::new(EntityKind::Node, 4), EntityRef::new(EntityKind::Group, "Bearings")]
        );
    }

    #[test]
    fn test_restraint_json() {
        let fixity: Fixity = serde_json::from_str(r#"{"dx":"fixed","dz":{"spring":{"stiffness":1e6}}}"#).unwrap();
        assert_eq!(fixity.dx, Restraint::Fixed);
        assert_eq!(fixity.dy, Restraint::Free);
        assert_eq!(fixity.dz, Restraint::Spring { stiffness: 1e6 });
    }
}
