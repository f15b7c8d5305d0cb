//! Prestressing tools: strand properties, tendon profiles and the prestress
//! loads that stress them.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{fresh_ids, join, next_id, parse, to_data, unknown_tool, IdSelection, ToolOutput, ToolSpec};
use crate::entities::{
    ElementId, EntityKind, GroupName, Jacking, Load, LoadId, LoadKind, Tendon, TendonName, TendonProperty,
    TendonPropertyId, Tensioning,
};
use crate::errors::BridgeResult;
use crate::provider::{ModelBuild, ModelSession};

pub(super) fn specs(ids: &Value) -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "create_tendon_property",
            description: "Define strand properties shared by tendons: tensioning method, modulus, area and loss coefficients.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "tensioning": {"type": "string", "enum": ["post_tension", "pre_tension"], "default": "post_tension"},
                    "elastic_modulus": {"type": "number", "exclusiveMinimum": 0, "default": 1.95e11},
                    "area": {"type": "number", "exclusiveMinimum": 0, "description": "Strand area, e.g. 0.00139 for a 15-7 strand"},
                    "friction": {"type": "number", "minimum": 0, "default": 0.25},
                    "wobble": {"type": "number", "minimum": 0, "default": 0.003},
                    "anchorage_slip": {"type": "number", "minimum": 0, "default": 0.006}
                },
                "required": ["name", "area"]
            }),
        },
        ToolSpec {
            name: "create_tendon_2d",
            description: "Create a tendon in the element x-y plane. control_points are [x, y]: x the relative position 0..1 along the run of elements, y the eccentricity from the axis.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "property": {"type": "string", "description": "Tendon property name"},
                    "element_ids": ids,
                    "control_points": {
                        "type": "array",
                        "items": {"type": "array", "items": {"type": "number"}, "minItems": 2, "maxItems": 2},
                        "minItems": 2
                    },
                    "jacking": {"type": "string", "enum": ["start", "end", "both"], "default": "both"},
                    "group": {"type": "string", "description": "Load group name"}
                },
                "required": ["name", "property", "element_ids", "control_points"]
            }),
        },
        ToolSpec {
            name: "apply_prestress",
            description: "Apply a jacking force to one or more tendons in a load case.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "case": {"type": "string"},
                    "tendons": {
                        "anyOf": [{"type": "string"}, {"type": "array", "items": {"type": "string"}, "minItems": 1}]
                    },
                    "force": {"type": "number", "exclusiveMinimum": 0},
                    "group": {"type": "string", "description": "Load group name"}
                },
                "required": ["case", "tendons", "force"]
            }),
        },
    ]
}

pub(super) fn call(session: &ModelSession, name: &str, arguments: Value) -> BridgeResult<ToolOutput> {
    match name {
        "create_tendon_property" => create_tendon_property(session, parse(name, arguments)?),
        "create_tendon_2d" => create_tendon_2d(session, parse(name, arguments)?),
        "apply_prestress" => apply_prestress(session, parse(name, arguments)?),
        other => Err(unknown_tool(other)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TendonPropertyArgs {
    name: String,
    #[serde(default)]
    tensioning: Tensioning,
    elastic_modulus: Option<f64>,
    area: f64,
    friction: Option<f64>,
    wobble: Option<f64>,
    anchorage_slip: Option<f64>,
}

fn create_tendon_property(session: &ModelSession, args: TendonPropertyArgs) -> BridgeResult<ToolOutput> {
    let defaults = TendonProperty::new(&args.name, args.area);
    let property = TendonProperty {
        tensioning: args.tensioning,
        elastic_modulus: args.elastic_modulus.unwrap_or(defaults.elastic_modulus),
        friction: args.friction.unwrap_or(defaults.friction),
        wobble: args.wobble.unwrap_or(defaults.wobble),
        anchorage_slip: args.anchorage_slip.unwrap_or(defaults.anchorage_slip),
        ..defaults
    };
    let id = session.create(property.clone())?;
    Ok(ToolOutput::new(
        format!(
            "Created tendon property '{id}' ({:?}, area {}, friction {})",
            property.tensioning, property.area, property.friction
        ),
        to_data(&property)?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Tendon2dArgs {
    name: String,
    property: String,
    element_ids: IdSelection,
    control_points: Vec<[f64; 2]>,
    #[serde(default)]
    jacking: Jacking,
    group: Option<GroupName>,
}

fn create_tendon_2d(session: &ModelSession, args: Tendon2dArgs) -> BridgeResult<ToolOutput> {
    let tendon = Tendon {
        id: TendonName::from(args.name),
        property: TendonPropertyId::from(args.property),
        elements: args.element_ids.expand()?.into_iter().map(ElementId).collect(),
        control_points: args.control_points,
        jacking: args.jacking,
        group: args.group,
    };
    let id = session.create(tendon.clone())?;
    Ok(ToolOutput::new(
        format!(
            "Created tendon '{id}' through {} element(s) with {} control point(s), jacked at {:?}",
            tendon.elements.len(),
            tendon.control_points.len(),
            tendon.jacking
        ),
        to_data(&tendon)?,
    ))
}

/// One tendon name or several
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TendonSelection {
    One(String),
    Many(Vec<String>),
}

impl TendonSelection {
    fn names(self) -> Vec<String> {
        match self {
            TendonSelection::One(name) => vec![name],
            TendonSelection::Many(names) => names,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PrestressArgs {
    case: String,
    tendons: TendonSelection,
    force: f64,
    group: Option<GroupName>,
}

fn apply_prestress(session: &ModelSession, args: PrestressArgs) -> BridgeResult<ToolOutput> {
    let tendons = args.tendons.names();
    let ids = fresh_ids(EntityKind::Load, tendons.len(), next_id::<Load>(session)?)?;
    let loads: Vec<Load> = tendons
        .iter()
        .zip(ids)
        .map(|(tendon, id)| Load {
            id: LoadId(id),
            case: args.case.clone(),
            group: args.group.clone(),
            kind: LoadKind::Prestress {
                tendon: TendonName::from(tendon.as_str()),
                force: args.force,
            },
        })
        .collect();
    let created = session.create_many(loads.clone())?;
    Ok(ToolOutput::new(
        format!(
            "Applied prestress {} to {} tendon(s) ({}) in case '{}': load ID(s) {}",
            args.force,
            tendons.len(),
            join(&tendons),
            args.case,
            join(&created)
        ),
        to_data(&loads)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, session, simple_beam};
    use crate::provider::ModelQuery;
    use serde_json::json;

    async fn with_tendon(session: &crate::provider::ModelSession) {
        simple_beam(session).await;
        call(session, "create_tendon_property", json!({"name": "15-7", "area": 0.00139})).await.unwrap();
        call(
            session,
            "create_tendon_2d",
            json!({"name": "T1", "property": "15-7", "element_ids": [1], "control_points": [[0.0, 0.0], [0.5, -0.4], [1.0, 0.0]]}),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_tendon_property_defaults() {
        let session = session();
        let property = call(
            &session,
            "create_tendon_property",
            json!({"name": "Pre", "tensioning": "pre_tension", "area": 0.00098, "friction": 0.2}),
        )
        .await
        .unwrap();
        assert_eq!(property.data["tensioning"], "pre_tension");
        assert_eq!(property.data["friction"], 0.2);
        assert_eq!(property.data["wobble"], 0.003);
        assert_eq!(property.data["elastic_modulus"], 1.95e11);

        let err = call(&session, "create_tendon_property", json!({"name": "Bare", "area": 0.0})).await.unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }

    #[tokio::test]
    async fn test_tendon_needs_property_and_elements() {
        let session = session();
        with_tendon(&session).await;
        assert_eq!(session.model_summary().tendon_count, 1);

        let err = call(
            &session,
            "create_tendon_2d",
            json!({"name": "T2", "property": "missing", "element_ids": [1], "control_points": [[0.0, 0.0], [1.0, 0.0]]}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");

        let err = call(
            &session,
            "create_tendon_2d",
            json!({"name": "T3", "property": "15-7", "element_ids": [1], "control_points": [[0.0, 0.0], [1.5, 0.0]]}),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        let err = call(&session, "delete_entity", json!({"kind": "tendon_property", "id": "15-7"}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");
    }

    #[tokio::test]
    async fn test_apply_prestress_to_one_or_many() {
        let session = session();
        with_tendon(&session).await;
        call(
            &session,
            "create_tendon_2d",
            json!({"name": "T2", "property": "15-7", "element_ids": "1", "control_points": [[0.0, 0.2], [1.0, 0.2]], "jacking": "start"}),
        )
        .await
        .unwrap();

        let one = call(&session, "apply_prestress", json!({"case": "PS", "tendons": "T1", "force": 3.0e6}))
            .await
            .unwrap();
        assert_eq!(one.data[0]["kind"], json!({"type": "prestress", "tendon": "T1", "force": 3.0e6}));

        let many = call(&session, "apply_prestress", json!({"case": "PS2", "tendons": ["T1", "T2"], "force": 2.5e6}))
            .await
            .unwrap();
        assert_eq!(many.data.as_array().unwrap().len(), 2);
        assert_eq!(many.data[1]["id"], 3);

        let err = call(&session, "apply_prestress", json!({"case": "PS", "tendons": ["T1", "T9"], "force": 1.0e6}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");
        assert_eq!(session.model_summary().load_count, 3);

        let err = call(&session, "apply_prestress", json!({"case": "PS", "tendons": "T1", "force": -1.0}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }
}
