//! Group tools: structure, boundary and load groups, and the operation stage
//! that closes a construction sequence.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{next_id, parse, to_data, unknown_tool, IdSelection, ToolOutput, ToolSpec};
use crate::entities::{ConstructionStage, ElementId, Entity, EntityRef, Group, GroupKind, GroupName, Link, Load, Support, Tendon};
use crate::errors::{BridgeError, BridgeResult};
use crate::provider::{ModelBuild, ModelSession};

pub(super) fn specs(ids: &Value) -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "create_structure_group",
            description: "Create a named group of elements and nodes, used for staged activation.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "maxLength": 64},
                    "element_ids": ids,
                    "node_ids": ids
                },
                "required": ["name"]
            }),
        },
        ToolSpec {
            name: "create_boundary_group",
            description: "Create a boundary group. Supports and links join it through their `group` argument.",
            input_schema: json!({
                "type": "object",
                "properties": {"name": {"type": "string", "maxLength": 64}},
                "required": ["name"]
            }),
        },
        ToolSpec {
            name: "create_load_group",
            description: "Create a load group. Loads and tendons join it through their `group` argument.",
            input_schema: json!({
                "type": "object",
                "properties": {"name": {"type": "string", "maxLength": 64}},
                "required": ["name"]
            }),
        },
        ToolSpec {
            name: "list_group_members",
            description: "List what a group holds: elements and nodes of a structure group, supports and links of a boundary group, loads and tendons of a load group.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "group_type": {"type": "string", "enum": ["structure", "boundary", "load"]},
                    "name": {"type": "string"}
                },
                "required": ["group_type", "name"]
            }),
        },
        ToolSpec {
            name: "add_elements_to_group",
            description: "Add elements to an existing structure group. Later stages see the new members.",
            input_schema: json!({
                "type": "object",
                "properties": {"name": {"type": "string"}, "element_ids": ids},
                "required": ["name", "element_ids"]
            }),
        },
        ToolSpec {
            name: "merge_operation_stage",
            description: "Close the construction sequence with an operation stage that carries the built structure into service. No stage can follow it.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "default": "Operation"},
                    "duration_days": {"type": "number", "minimum": 0, "default": 0}
                }
            }),
        },
    ]
}

pub(super) fn call(session: &ModelSession, name: &str, arguments: Value) -> BridgeResult<ToolOutput> {
    match name {
        "create_structure_group" => create_structure_group(session, parse(name, arguments)?),
        "create_boundary_group" => create_named_group(session, GroupKind::Boundary, parse(name, arguments)?),
        "create_load_group" => create_named_group(session, GroupKind::Load, parse(name, arguments)?),
        "list_group_members" => list_group_members(session, parse(name, arguments)?),
        "add_elements_to_group" => add_elements_to_group(session, parse(name, arguments)?),
        "merge_operation_stage" => merge_operation_stage(session, parse(name, arguments)?),
        other => Err(unknown_tool(other)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StructureGroupArgs {
    name: String,
    #[serde(default)]
    element_ids: IdSelection,
    #[serde(default)]
    node_ids: IdSelection,
}

fn create_structure_group(session: &ModelSession, args: StructureGroupArgs) -> BridgeResult<ToolOutput> {
    let group = Group::structure(&args.name)
        .with_elements(args.element_ids.expand()?)
        .with_nodes(args.node_ids.expand()?);
    let id = session.create(group.clone())?;
    Ok(ToolOutput::new(
        format!(
            "Created structure group '{id}' with {} element(s) and {} node(s)",
            group.elements.len(),
            group.nodes.len()
        ),
        to_data(&group)?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NamedGroupArgs {
    name: String,
}

fn create_named_group(session: &ModelSession, kind: GroupKind, args: NamedGroupArgs) -> BridgeResult<ToolOutput> {
    let group = Group::new(&args.name, kind);
    let id = session.create(group.clone())?;
    Ok(ToolOutput::new(format!("Created {} group '{id}'", kind.name()), to_data(&group)?))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MembersArgs {
    group_type: GroupKind,
    name: GroupName,
}

fn list_group_members(session: &ModelSession, args: MembersArgs) -> BridgeResult<ToolOutput> {
    let members = session.read(|model| -> BridgeResult<Vec<EntityRef>> {
        let group = model.get::<Group>(&args.name)?;
        if group.kind != args.group_type {
            return Err(BridgeError::schema(
                "group",
                "group_type",
                format!("'{}' is a {} group, not a {} group", group.id, group.kind.name(), args.group_type.name()),
            ));
        }
        let labelled = |label: &Option<GroupName>| label.as_ref() == Some(&group.id);
        let members: Vec<EntityRef> = match group.kind {
            GroupKind::Structure => group.references(),
            GroupKind::Boundary => model
                .list::<Support>(|s| labelled(&s.group))
                .into_iter()
                .map(Entity::entity_ref)
                .chain(model.list::<Link>(|l| labelled(&l.group)).into_iter().map(Entity::entity_ref))
                .collect(),
            GroupKind::Load => model
                .list::<Load>(|l| labelled(&l.group))
                .into_iter()
                .map(Entity::entity_ref)
                .chain(model.list::<Tendon>(|t| labelled(&t.group)).into_iter().map(Entity::entity_ref))
                .collect(),
        };
        Ok(members)
    })?;

    let text = if members.is_empty() {
        format!("{} group '{}' has no members", args.group_type.name(), args.name)
    } else {
        format!(
            "{} group '{}' holds {} member(s): {}",
            args.group_type.name(),
            args.name,
            members.len(),
            super::join(&members)
        )
    };
    Ok(ToolOutput::new(
        text,
        json!({"group": args.name, "group_type": args.group_type, "members": to_data(&members)?}),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AddElementsArgs {
    name: GroupName,
    element_ids: IdSelection,
}

fn add_elements_to_group(session: &ModelSession, args: AddElementsArgs) -> BridgeResult<ToolOutput> {
    let elements = args.element_ids.expand()?;
    let group = session.modify::<Group>(&args.name, |group| {
        group.elements.extend(elements.iter().copied().map(ElementId));
    })?;
    Ok(ToolOutput::new(
        format!(
            "Added element(s) {} to structure group '{}', which now holds {} element(s)",
            super::join(&elements),
            group.id,
            group.elements.len()
        ),
        to_data(&group)?,
    ))
}

fn operation_stage_name() -> String {
    "Operation".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OperationStageArgs {
    #[serde(default = "operation_stage_name")]
    name: String,
    #[serde(default)]
    duration_days: f64,
}

fn merge_operation_stage(session: &ModelSession, args: OperationStageArgs) -> BridgeResult<ToolOutput> {
    let index = next_id::<ConstructionStage>(session)?;
    let stage = ConstructionStage::operation(index, &args.name).with_duration(args.duration_days);
    let id = session.create(stage.clone())?;
    Ok(ToolOutput::new(
        format!(
            "Merged {} construction stage(s) into operation stage {id} '{}'",
            index - 1,
            stage.name
        ),
        to_data(&stage)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, session, simple_beam};
    use crate::provider::ModelQuery;
    use serde_json::json;

    #[tokio::test]
    async fn test_group_kinds_and_members() {
        let session = session();
        simple_beam(&session).await;
        call(&session, "create_boundary_group", json!({"name": "Temporary"})).await.unwrap();
        call(&session, "create_load_group", json!({"name": "Wet concrete"})).await.unwrap();
        call(&session, "set_support", json!({"node_ids": [1, 2], "group": "Temporary"}))
            .await
            .unwrap();
        call(&session, "add_elastic_link", json!({"link_type": "rigid", "start_node": 1, "end_node": 2, "group": "Temporary"}))
            .await
            .unwrap();
        call(&session, "apply_nodal_force", json!({"node_ids": 2, "case": "Dead", "fz": -5.0, "group": "Wet concrete"}))
            .await
            .unwrap();

        let boundary = call(&session, "list_group_members", json!({"group_type": "boundary", "name": "Temporary"}))
            .await
            .unwrap();
        assert_eq!(
            boundary.data["members"],
            json!([{"kind": "support", "id": "1"}, {"kind": "support", "id": "2"}, {"kind": "link", "id": "1"}])
        );

        let loads = call(&session, "list_group_members", json!({"group_type": "load", "name": "Wet concrete"}))
            .await
            .unwrap();
        assert_eq!(loads.data["members"], json!([{"kind": "load", "id": "1"}]));

        let err = call(&session, "list_group_members", json!({"group_type": "structure", "name": "Temporary"}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        // a load cannot join a boundary group
        let err = call(&session, "apply_nodal_force", json!({"node_ids": 1, "case": "Dead", "fz": -1.0, "group": "Temporary"}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");
        assert_eq!(session.model_summary().boundary_group_count, 1);
        assert_eq!(session.model_summary().load_group_count, 1);
    }

    #[tokio::test]
    async fn test_add_elements_to_group() {
        let session = session();
        simple_beam(&session).await;
        call(&session, "create_nodes", json!({"nodes": [[20.0, 0.0, 0.0]]})).await.unwrap();
        call(&session, "create_elements", json!({"elements": [{"nodes": [2, 3], "material": "C40", "section": "S1"}]}))
            .await
            .unwrap();
        call(&session, "create_structure_group", json!({"name": "Girder", "element_ids": 1})).await.unwrap();

        let group = call(&session, "add_elements_to_group", json!({"name": "Girder", "element_ids": [2]}))
            .await
            .unwrap();
        assert_eq!(group.data["elements"], json!([1, 2]));

        let members = call(&session, "list_group_members", json!({"group_type": "structure", "name": "Girder"}))
            .await
            .unwrap();
        assert_eq!(members.data["members"].as_array().unwrap().len(), 2);

        let err = call(&session, "add_elements_to_group", json!({"name": "Girder", "element_ids": [9]}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");

        call(&session, "create_load_group", json!({"name": "Loads"})).await.unwrap();
        let err = call(&session, "add_elements_to_group", json!({"name": "Loads", "element_ids": [1]}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }

    #[tokio::test]
    async fn test_operation_stage_closes_sequence() {
        let session = session();
        simple_beam(&session).await;
        let err = call(&session, "merge_operation_stage", json!({})).await.unwrap_err();
        assert_eq!(err.error_code(), "STAGE_ORDER");

        call(&session, "create_structure_group", json!({"name": "Girder", "element_ids": 1})).await.unwrap();
        call(
            &session,
            "add_construction_stage",
            json!({"name": "Erect", "activate": [{"kind": "group", "id": "Girder"}]}),
        )
        .await
        .unwrap();
        let operation = call(&session, "merge_operation_stage", json!({})).await.unwrap();
        assert_eq!(operation.data["index"], 2);
        assert_eq!(operation.data["operation"], true);
        assert_eq!(operation.data["name"], "Operation");

        let err = call(&session, "add_construction_stage", json!({"name": "Late"})).await.unwrap_err();
        assert_eq!(err.error_code(), "STAGE_ORDER");
    }
}
