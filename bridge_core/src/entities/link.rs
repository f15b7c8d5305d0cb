//! Links: node-to-node connections such as bearings, rigid arms and
//! master-slave constraints.

use serde::{Deserialize, Serialize};

use super::{require_distinct, require_finite, require_name, Entity, EntityKind, EntityRef, Fixity, GroupName, LinkId, NodeId};
use crate::errors::{BridgeError, BridgeResult};

fn all_dofs() -> [bool; 6] {
    [true; 6]
}

/// How the linked nodes move together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkKind {
    Rigid,
    RigidArm,
    /// Six spring stiffnesses in dx, dy, dz, rx, ry, rz order
    Elastic { stiffness: [f64; 6] },
    FixedEnd,
    /// Slaves follow the master on every flagged DOF
    MasterSlave {
        #[serde(default = "all_dofs")]
        constraints: [bool; 6],
    },
}

impl LinkKind {
    /// Whether the link joins exactly two nodes
    pub fn is_two_node(&self) -> bool {
        !matches!(self, LinkKind::MasterSlave { .. })
    }
}

/// A link between a master node and one or more slave nodes.
///
/// Two-node links read the master as the start and the single slave as the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,

    pub kind: LinkKind,

    pub master: NodeId,

    pub slaves: Vec<NodeId>,

    /// Boundary group used for staged activation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupName>,
}

impl Link {
    /// Two-node link from `start` to `end`
    pub fn between(id: u32, kind: LinkKind, start: u32, end: u32) -> Self {
        Link {
            id: LinkId(id),
            kind,
            master: NodeId(start),
            slaves: vec![NodeId(end)],
            group: None,
        }
    }

    /// Master-slave constraint on the flagged DOFs
    pub fn master_slave(id: u32, master: u32, slaves: &[u32], constraints: [bool; 6]) -> Self {
        Link {
            id: LinkId(id),
            kind: LinkKind::MasterSlave { constraints },
            master: NodeId(master),
            slaves: slaves.iter().copied().map(NodeId).collect(),
            group: None,
        }
    }

    /// Join a boundary group (builder pattern)
    pub fn in_group(mut self, group: &str) -> Self {
        self.group = Some(GroupName::from(group));
        self
    }

    /// Every node the link touches, master first
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(self.master).chain(self.slaves.iter().copied())
    }
}

impl Entity for Link {
    type Id = LinkId;
    const KIND: EntityKind = EntityKind::Link;

    fn id(&self) -> &LinkId {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        if self.slaves.is_empty() {
            return Err(BridgeError::schema("link", "slaves", "needs at least one slave node"));
        }
        if self.kind.is_two_node() && self.slaves.len() != 1 {
            return Err(BridgeError::schema(
                "link",
                "slaves",
                format!("a two-node link has exactly one end node, got {}", self.slaves.len()),
            ));
        }
        if self.slaves.contains(&self.master) {
            return Err(BridgeError::schema("link", "slaves", format!("node {} cannot be linked to itself", self.master)));
        }
        require_distinct(EntityKind::Link, "slaves", &self.slaves)?;

        match &self.kind {
            LinkKind::Elastic { stiffness } => {
                for (name, k) in Fixity::DOF_NAMES.iter().zip(stiffness) {
                    require_finite(EntityKind::Link, &format!("stiffness.{name}"), *k)?;
                    if *k < 0.0 {
                        return Err(BridgeError::schema("link", format!("stiffness.{name}"), "must not be negative"));
                    }
                }
                if stiffness.iter().all(|k| *k == 0.0) {
                    return Err(BridgeError::schema("link", "stiffness", "at least one stiffness must be positive"));
                }
            }
            LinkKind::MasterSlave { constraints } if !constraints.iter().any(|c| *c) => {
                return Err(BridgeError::schema("link", "constraints", "at least one DOF must be constrained"));
            }
            _ => {}
        }

        if let Some(group) = &self.group {
            require_name(EntityKind::Link, "group", &group.0)?;
        }
        Ok(())
    }

    fn references(&self) -> Vec<EntityRef> {
        self.nodes()
            .map(|n| EntityRef::new(EntityKind::Node, n))
            .chain(self.group.iter().map(|g| EntityRef::new(EntityKind::Group, g)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_node_link() {
        let link = Link::between(1, LinkKind::Rigid, 3, 7);
        assert!(link.validate().is_ok());
        assert_eq!(link.nodes().collect::<Vec<_>>(), vec![NodeId(3), NodeId(7)]);

        let mut three = Link::between(2, LinkKind::FixedEnd, 3, 7);
        three.slaves.push(NodeId(8));
        assert!(three.validate().is_err());
        assert!(Link::between(3, LinkKind::Rigid, 4, 4).validate().is_err());
    }

    #[test]
    fn test_elastic_stiffness_checked() {
        let bearing = LinkKind::Elastic {
            stiffness: [1e9, 1e9, 1e7, 0.0, 0.0, 0.0],
        };
        assert!(Link::between(1, bearing, 1, 2).validate().is_ok());

        let err = Link::between(1, LinkKind::Elastic { stiffness: [0.0; 6] }, 1, 2)
            .validate()
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        let negative = LinkKind::Elastic {
            stiffness: [1e9, -1.0, 0.0, 0.0, 0.0, 0.0],
        };
        match Link::between(1, negative, 1, 2).validate().unwrap_err() {
            BridgeError::Schema { field, .. } => assert_eq!(field, "stiffness.dy"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_master_slave() {
        let link = Link::master_slave(1, 10, &[11, 12, 13], [true; 6]).in_group("Diaphragms");
        assert!(link.validate().is_ok());
        assert_eq!(link.references().len(), 5);
        assert!(Link::master_slave(1, 10, &[11, 11], [true; 6]).validate().is_err());
        assert!(Link::master_slave(1, 10, &[11], [false; 6]).validate().is_err());

        let parsed: Link = serde_json::from_str(r#"{"id":1,"kind":{"type":"master_slave"},"master":1,"slaves":[2]}"#).unwrap();
        assert_eq!(parsed.kind, LinkKind::MasterSlave { constraints: [true; 6] });
    }
}
