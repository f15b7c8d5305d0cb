//! Nodes: points in the global frame where elements meet.

use serde::{Deserialize, Serialize};

use super::{require_finite, Entity, EntityKind, NodeId};
use crate::errors::{BridgeError, BridgeResult};
use crate::units::Vec3;

/// Optional local coordinate system attached to a node.
///
/// Defined by the local x-axis direction and a second vector lying in the
/// local xy-plane; the two must not be parallel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalAxes {
    pub x_axis: Vec3,
    pub xy_plane: Vec3,
}

/// A structural node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,

    /// Global position (x, y, z) in model length units
    pub position: Vec3,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_axes: Option<LocalAxes>,
}

impl Node {
    /// Create a node at (x, y, z)
    pub fn new(id: u32, x: f64, y: f64, z: f64) -> Self {
        Node {
            id: NodeId(id),
            position: Vec3::new(x, y, z),
            local_axes: None,
        }
    }

    /// Attach a local coordinate system (builder pattern)
    pub fn with_local_axes(mut self, x_axis: Vec3, xy_plane: Vec3) -> Self {
        self.local_axes = Some(LocalAxes { x_axis, xy_plane });
        self
    }
}

impl Entity for Node {
    type Id = NodeId;
    const KIND: EntityKind = EntityKind::Node;

    fn id(&self) -> &NodeId {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        require_finite(EntityKind::Node, "position.x", self.position.x)?;
        require_finite(EntityKind::Node, "position.y", self.position.y)?;
        require_finite(EntityKind::Node, "position.z", self.position.z)?;

        if let Some(axes) = &self.local_axes {
            if !axes.x_axis.is_finite() || axes.x_axis.length() == 0.0 {
                return Err(BridgeError::schema("node", "local_axes.x_axis", "must be a finite non-zero vector"));
            }
            if !axes.xy_plane.is_finite() || axes.xy_plane.length() == 0.0 {
                return Err(BridgeError::schema("node", "local_axes.xy_plane", "must be a finite non-zero vector"));
            }
            let sine = axes.x_axis.cross(axes.xy_plane).length() / (axes.x_axis.length() * axes.xy_plane.length());
            if sine < 1e-9 {
                return Err(BridgeError::schema("node", "local_axes.xy_plane", "must not be parallel to x_axis"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_validation() {
        assert!(Node::new(1, 0.0, 0.0, 0.0).validate().is_ok());

        let err = Node::new(1, f64::NAN, 0.0, 0.0).validate().unwrap_err();
        match err {
            BridgeError::Schema { field, .. } => assert_eq!(field, "position.x"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parallel_local_axes_rejected() {
        let node = Node::new(1, 0.0, 0.0, 0.0)
            .with_local_axes(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 0.0, 0.0));
        assert!(node.validate().is_err());

        let node = Node::new(1, 0.0, 0.0, 0.0)
            .with_local_axes(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
        assert!(node.validate().is_ok());
    }

    #[test]
    fn test_node_json_shape() {
        let node: Node = serde_json::from_str(r#"{"id":2,"position":[10.0,0.0,0.0]}"#).unwrap();
        assert_eq!(node, Node::new(2, 10.0, 0.0, 0.0));
        let json = serde_json::to_string(&node).unwrap();
        assert!(!json.contains("local_axes"));
    }
}
