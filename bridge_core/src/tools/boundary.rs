//! Boundary tools beyond plain supports: two-node links, master-slave
//! constraints and spring supports.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{fresh_ids, join, next_id, parse, to_data, unknown_tool, IdSelection, ToolOutput, ToolSpec};
use crate::entities::{EntityKind, Fixity, GroupName, Link, LinkId, LinkKind, NodeId, Support, SupportId};
use crate::errors::{BridgeError, BridgeResult};
use crate::provider::{ModelBuild, ModelSession};

pub(super) fn specs(ids: &Value) -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "add_elastic_link",
            description: "Link two nodes: rigid, rigid_arm, fixed_end, or elastic with six stiffnesses [kx, ky, kz, krx, kry, krz]. Models bearings and rigid arms between members.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "link_type": {"type": "string", "enum": ["rigid", "rigid_arm", "elastic", "fixed_end"]},
                    "start_node": {"type": "integer", "minimum": 1},
                    "end_node": {"type": "integer", "minimum": 1},
                    "stiffness": {"type": "array", "items": {"type": "number", "minimum": 0}, "minItems": 6, "maxItems": 6},
                    "group": {"type": "string", "description": "Boundary group name"}
                },
                "required": ["link_type", "start_node", "end_node"]
            }),
        },
        ToolSpec {
            name: "add_master_slave_link",
            description: "Make slave nodes follow a master node on the flagged DOFs [dx, dy, dz, rx, ry, rz], e.g. for diaphragm rigid zones.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "master_node": {"type": "integer", "minimum": 1},
                    "slave_node_ids": ids,
                    "dof_constraints": {"type": "array", "items": {"type": "boolean"}, "minItems": 6, "maxItems": 6},
                    "group": {"type": "string", "description": "Boundary group name"}
                },
                "required": ["master_node", "slave_node_ids"]
            }),
        },
        ToolSpec {
            name: "add_elastic_support",
            description: "Add spring supports at nodes. spring_values are [kx, ky, kz, krx, kry, krz]; a zero leaves that DOF free.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "node_ids": ids,
                    "spring_values": {"type": "array", "items": {"type": "number", "minimum": 0}, "minItems": 6, "maxItems": 6},
                    "group": {"type": "string", "description": "Boundary group name"}
                },
                "required": ["node_ids", "spring_values"]
            }),
        },
    ]
}

pub(super) fn call(session: &ModelSession, name: &str, arguments: Value) -> BridgeResult<ToolOutput> {
    match name {
        "add_elastic_link" => add_elastic_link(session, parse(name, arguments)?),
        "add_master_slave_link" => add_master_slave_link(session, parse(name, arguments)?),
        "add_elastic_support" => add_elastic_support(session, parse(name, arguments)?),
        other => Err(unknown_tool(other)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TwoNodeLink {
    Rigid,
    RigidArm,
    Elastic,
    FixedEnd,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ElasticLinkArgs {
    link_type: TwoNodeLink,
    start_node: u32,
    end_node: u32,
    stiffness: Option<[f64; 6]>,
    group: Option<GroupName>,
}

fn add_elastic_link(session: &ModelSession, args: ElasticLinkArgs) -> BridgeResult<ToolOutput> {
    let kind = match (args.link_type, args.stiffness) {
        (TwoNodeLink::Elastic, Some(stiffness)) => LinkKind::Elastic { stiffness },
        (TwoNodeLink::Elastic, None) => {
            return Err(BridgeError::schema("link", "stiffness", "an elastic link needs six stiffness values"))
        }
        (_, Some(_)) => {
            return Err(BridgeError::schema("link", "stiffness", "only elastic links take stiffness values"))
        }
        (TwoNodeLink::Rigid, None) => LinkKind::Rigid,
        (TwoNodeLink::RigidArm, None) => LinkKind::RigidArm,
        (TwoNodeLink::FixedEnd, None) => LinkKind::FixedEnd,
    };
    let link = Link {
        group: args.group,
        ..Link::between(next_id::<Link>(session)?, kind, args.start_node, args.end_node)
    };
    let id = session.create(link.clone())?;
    Ok(ToolOutput::new(
        format!("Created link {id} ({:?}) from node {} to node {}", args.link_type, args.start_node, args.end_node),
        to_data(&link)?,
    ))
}

fn all_dofs() -> [bool; 6] {
    [true; 6]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MasterSlaveArgs {
    master_node: u32,
    slave_node_ids: IdSelection,
    #[serde(default = "all_dofs")]
    dof_constraints: [bool; 6],
    group: Option<GroupName>,
}

fn add_master_slave_link(session: &ModelSession, args: MasterSlaveArgs) -> BridgeResult<ToolOutput> {
    let slaves = args.slave_node_ids.expand()?;
    let link = Link {
        id: LinkId(next_id::<Link>(session)?),
        kind: LinkKind::MasterSlave {
            constraints: args.dof_constraints,
        },
        master: NodeId(args.master_node),
        slaves: slaves.iter().copied().map(NodeId).collect(),
        group: args.group,
    };
    let id = session.create(link.clone())?;
    Ok(ToolOutput::new(
        format!(
            "Created master-slave link {id}: node(s) {} follow node {}",
            join(&slaves),
            args.master_node
        ),
        to_data(&link)?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ElasticSupportArgs {
    node_ids: IdSelection,
    spring_values: [f64; 6],
    group: Option<GroupName>,
}

fn add_elastic_support(session: &ModelSession, args: ElasticSupportArgs) -> BridgeResult<ToolOutput> {
    let nodes = args.node_ids.expand()?;
    let fixity = Fixity::springs(args.spring_values);
    let ids = fresh_ids(EntityKind::Support, nodes.len(), next_id::<Support>(session)?)?;
    let supports: Vec<Support> = nodes
        .iter()
        .zip(ids)
        .map(|(node, id)| Support {
            id: SupportId(id),
            node: NodeId(*node),
            fixity,
            group: args.group.clone(),
        })
        .collect();
    let created = session.create_many(supports.clone())?;
    Ok(ToolOutput::new(
        format!("Created {} spring support(s) at node(s) {}", created.len(), join(&nodes)),
        to_data(&supports)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, session, simple_beam};
    use crate::provider::ModelQuery;
    use serde_json::json;

    #[tokio::test]
    async fn test_elastic_link_types() {
        let session = session();
        simple_beam(&session).await;
        call(&session, "create_nodes", json!({"nodes": [[10.0, 0.0, -1.5]]})).await.unwrap();

        let bearing = call(
            &session,
            "add_elastic_link",
            json!({"link_type": "elastic", "start_node": 2, "end_node": 3, "stiffness": [1e9, 1e9, 1e7, 0.0, 0.0, 0.0]}),
        )
        .await
        .unwrap();
        assert_eq!(bearing.data["kind"]["type"], "elastic");
        assert_eq!(bearing.data["slaves"], json!([3]));

        let err = call(&session, "add_elastic_link", json!({"link_type": "elastic", "start_node": 2, "end_node": 3}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        let err = call(
            &session,
            "add_elastic_link",
            json!({"link_type": "rigid", "start_node": 2, "end_node": 3, "stiffness": [1.0, 1.0, 1.0, 1.0, 1.0, 1.0]}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        let err = call(&session, "add_elastic_link", json!({"link_type": "rigid", "start_node": 2, "end_node": 9}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");

        let arm = call(&session, "add_elastic_link", json!({"link_type": "rigid_arm", "start_node": 1, "end_node": 3}))
            .await
            .unwrap();
        assert_eq!(arm.data["id"], 2);
        assert_eq!(session.model_summary().link_count, 2);
    }

    #[tokio::test]
    async fn test_master_slave_link() {
        let session = session();
        simple_beam(&session).await;
        call(&session, "create_nodes", json!({"nodes": [[10.0, 1.0, 0.0], [10.0, -1.0, 0.0]]}))
            .await
            .unwrap();
        call(&session, "create_boundary_group", json!({"name": "Diaphragm"})).await.unwrap();

        let link = call(
            &session,
            "add_master_slave_link",
            json!({"master_node": 2, "slave_node_ids": "3to4", "group": "Diaphragm"}),
        )
        .await
        .unwrap();
        assert_eq!(link.data["kind"]["constraints"], json!([true, true, true, true, true, true]));
        assert_eq!(link.data["slaves"], json!([3, 4]));

        let err = call(&session, "add_master_slave_link", json!({"master_node": 2, "slave_node_ids": [2]}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        // linked nodes count as connected; only the missing support is reported
        let report = call(&session, "validate_model", json!({})).await.unwrap();
        let findings = report.data["findings"].as_array().unwrap();
        assert_eq!(findings.len(), 1);
        assert!(findings[0]["message"].as_str().unwrap().contains("no support"));
    }

    #[tokio::test]
    async fn test_elastic_support() {
        let session = session();
        simple_beam(&session).await;
        let springs = call(
            &session,
            "add_elastic_support",
            json!({"node_ids": [1, 2], "spring_values": [0.0, 0.0, 5e8, 0.0, 0.0, 0.0]}),
        )
        .await
        .unwrap();
        assert_eq!(springs.data[0]["fixity"]["dz"], json!({"spring": {"stiffness": 5e8}}));
        assert_eq!(springs.data[1]["id"], 2);

        let err = call(&session, "add_elastic_support", json!({"node_ids": 1, "spring_values": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0]}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }
}
