//! One-step generators for common girder bridges.
//!
//! Each workflow lays a straight girder along global X and commits it as a
//! single batch: missing material and section, nodes, beam elements, supports
//! and a self-weight load. Either all of it lands or none of it does.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{fresh_ids, next_id, parse, to_data, unknown_tool, ToolOutput, ToolSpec};
use crate::entities::{
    Element, EntityKind, Fixity, Load, Material, MaterialId, MaterialKind, ModelEntity, Node, Section, SectionId, Support,
};
use crate::errors::{BridgeError, BridgeResult};
use crate::provider::{ModelBuild, ModelSession};

/// Upper bound on generated elements per call
const MAX_ELEMENTS: u32 = 10_000;

/// Concrete density used for auto-created materials
const CONCRETE_DENSITY: f64 = 2500.0;

pub(super) fn specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "create_simple_beam_bridge",
            description: "Create a simply supported girder in one step: nodes along X, beam elements, a pin at the start, a roller at the end and a self-weight load. A missing concrete grade (C30 to C55) or rectangular section is created too.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "span": {"type": "number", "exclusiveMinimum": 0, "default": 20.0},
                    "num_elements": {"type": "integer", "minimum": 2, "maximum": MAX_ELEMENTS, "default": 10},
                    "material": {"type": "string", "default": "C50"},
                    "section": {"type": "string", "default": "Girder"},
                    "section_width": {"type": "number", "exclusiveMinimum": 0, "default": 1.0},
                    "section_height": {"type": "number", "exclusiveMinimum": 0, "default": 1.5},
                    "self_weight_case": {"type": ["string", "null"], "default": "SW", "description": "null skips the self-weight load"}
                }
            }),
        },
        ToolSpec {
            name: "create_continuous_beam_bridge",
            description: "Create a continuous girder in one step: rollers at both abutments, pinned supports at every pier, a self-weight load. A missing concrete grade (C30 to C55) or rectangular section is created too.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "spans": {"type": "array", "items": {"type": "number", "exclusiveMinimum": 0}, "minItems": 1, "default": [30.0, 50.0, 30.0]},
                    "elements_per_span": {"type": "integer", "minimum": 1, "default": 8},
                    "material": {"type": "string", "default": "C50"},
                    "section": {"type": "string", "default": "Girder"},
                    "section_width": {"type": "number", "exclusiveMinimum": 0, "default": 1.0},
                    "section_height": {"type": "number", "exclusiveMinimum": 0, "default": 1.5},
                    "self_weight_case": {"type": ["string", "null"], "default": "SW", "description": "null skips the self-weight load"}
                }
            }),
        },
    ]
}

pub(super) fn call(session: &ModelSession, name: &str, arguments: Value) -> BridgeResult<ToolOutput> {
    match name {
        "create_simple_beam_bridge" => create_simple_beam_bridge(session, parse(name, arguments)?),
        "create_continuous_beam_bridge" => create_continuous_beam_bridge(session, parse(name, arguments)?),
        other => Err(unknown_tool(other)),
    }
}

fn default_span() -> f64 {
    20.0
}

fn default_element_count() -> u32 {
    10
}

fn default_spans() -> Vec<f64> {
    vec![30.0, 50.0, 30.0]
}

fn default_per_span() -> u32 {
    8
}

fn default_material() -> String {
    "C50".to_string()
}

fn default_section() -> String {
    "Girder".to_string()
}

fn default_width() -> f64 {
    1.0
}

fn default_height() -> f64 {
    1.5
}

fn default_self_weight_case() -> Option<String> {
    Some("SW".to_string())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SimpleBeamArgs {
    #[serde(default = "default_span")]
    span: f64,
    #[serde(default = "default_element_count")]
    num_elements: u32,
    #[serde(default = "default_material")]
    material: String,
    #[serde(default = "default_section")]
    section: String,
    #[serde(default = "default_width")]
    section_width: f64,
    #[serde(default = "default_height")]
    section_height: f64,
    #[serde(default = "default_self_weight_case")]
    self_weight_case: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContinuousBeamArgs {
    #[serde(default = "default_spans")]
    spans: Vec<f64>,
    #[serde(default = "default_per_span")]
    elements_per_span: u32,
    #[serde(default = "default_material")]
    material: String,
    #[serde(default = "default_section")]
    section: String,
    #[serde(default = "default_width")]
    section_width: f64,
    #[serde(default = "default_height")]
    section_height: f64,
    #[serde(default = "default_self_weight_case")]
    self_weight_case: Option<String>,
}

/// Elastic modulus of the concrete grades the generators can create
fn concrete_modulus(grade: &str) -> Option<f64> {
    match grade {
        "C30" => Some(3.00e10),
        "C35" => Some(3.15e10),
        "C40" => Some(3.25e10),
        "C45" => Some(3.35e10),
        "C50" => Some(3.45e10),
        "C55" => Some(3.55e10),
        _ => None,
    }
}

/// A straight girder to lay out
struct Girder {
    /// Node positions along X
    stations: Vec<f64>,
    /// Station index and fixity of every support
    supports: Vec<(usize, Fixity)>,
    material: String,
    section: String,
    section_size: (f64, f64),
    self_weight_case: Option<String>,
}

/// What a workflow created
#[derive(Debug, Serialize)]
struct GirderSummary {
    length: f64,
    node_ids: Vec<u32>,
    element_ids: Vec<u32>,
    support_ids: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    self_weight_load: Option<u32>,
    created_material: bool,
    created_section: bool,
}

fn roller() -> Fixity {
    Fixity::from_flags([false, true, true, false, false, false])
}

fn build_girder(session: &ModelSession, girder: Girder) -> BridgeResult<GirderSummary> {
    let (has_material, has_section) = session.read(|model| {
        (
            model.contains::<Material>(&MaterialId::from(girder.material.as_str())),
            model.contains::<Section>(&SectionId::from(girder.section.as_str())),
        )
    });

    let mut entities = Vec::new();
    if !has_material {
        let modulus = concrete_modulus(&girder.material).ok_or_else(|| BridgeError::not_found(EntityKind::Material, &girder.material))?;
        entities.push(ModelEntity::Material(
            Material::new(&girder.material, MaterialKind::Concrete, modulus, CONCRETE_DENSITY).with_grade(girder.material.as_str()),
        ));
    }
    if !has_section {
        let (width, height) = girder.section_size;
        entities.push(ModelEntity::Section(Section::rectangle(&girder.section, width, height)));
    }

    let node_ids = fresh_ids(EntityKind::Node, girder.stations.len(), next_id::<Node>(session)?)?;
    let element_count = girder.stations.len().saturating_sub(1);
    let element_ids = fresh_ids(EntityKind::Element, element_count, next_id::<Element>(session)?)?;
    let support_ids = fresh_ids(EntityKind::Support, girder.supports.len(), next_id::<Support>(session)?)?;

    entities.extend(
        node_ids
            .iter()
            .zip(&girder.stations)
            .map(|(id, x)| ModelEntity::Node(Node::new(*id, *x, 0.0, 0.0))),
    );
    entities.extend(
        element_ids
            .iter()
            .zip(node_ids.windows(2))
            .map(|(id, ends)| ModelEntity::Element(Element::beam(*id, ends[0], ends[1], &girder.material, &girder.section))),
    );
    entities.extend(
        support_ids
            .iter()
            .zip(&girder.supports)
            .map(|(id, (station, fixity))| ModelEntity::Support(Support::new(*id, node_ids[*station], *fixity))),
    );

    let self_weight_load = match girder.self_weight_case.as_deref().filter(|case| !case.trim().is_empty()) {
        Some(case) => {
            let id = next_id::<Load>(session)?;
            entities.push(ModelEntity::Load(Load::self_weight(id, case)));
            Some(id)
        }
        None => None,
    };

    session.build_batch(entities)?;
    Ok(GirderSummary {
        length: girder.stations.last().copied().unwrap_or_default(),
        node_ids,
        element_ids,
        support_ids,
        self_weight_load,
        created_material: !has_material,
        created_section: !has_section,
    })
}

fn check_length(tool: &str, field: &str, length: f64) -> BridgeResult<()> {
    if !(length.is_finite() && length > 0.0) {
        return Err(BridgeError::schema(tool, field, format!("span lengths must be positive, got {length}")));
    }
    Ok(())
}

fn describe(summary: &GirderSummary, girder: &str) -> String {
    let mut lines = vec![format!(
        "Created {girder}: {} node(s), {} beam element(s), {} support(s), total length {}",
        summary.node_ids.len(),
        summary.element_ids.len(),
        summary.support_ids.len(),
        summary.length
    )];
    if summary.created_material {
        lines.push("  material created from its concrete grade".to_string());
    }
    if summary.created_section {
        lines.push("  rectangular section created".to_string());
    }
    if let Some(load) = summary.self_weight_load {
        lines.push(format!("  self-weight load {load}"));
    }
    lines.join("\n")
}

fn create_simple_beam_bridge(session: &ModelSession, args: SimpleBeamArgs) -> BridgeResult<ToolOutput> {
    const TOOL: &str = "create_simple_beam_bridge";
    check_length(TOOL, "span", args.span)?;
    if !(2..=MAX_ELEMENTS).contains(&args.num_elements) {
        return Err(BridgeError::schema(
            TOOL,
            "num_elements",
            format!("must lie in 2..={MAX_ELEMENTS}, got {}", args.num_elements),
        ));
    }

    let n = args.num_elements;
    let stations: Vec<f64> = (0..=n).map(|i| args.span * f64::from(i) / f64::from(n)).collect();
    let girder = Girder {
        supports: vec![(0, Fixity::pinned()), (stations.len() - 1, roller())],
        stations,
        material: args.material,
        section: args.section,
        section_size: (args.section_width, args.section_height),
        self_weight_case: args.self_weight_case,
    };
    let summary = build_girder(session, girder)?;
    Ok(ToolOutput::new(describe(&summary, "simply supported girder"), to_data(&summary)?))
}

fn create_continuous_beam_bridge(session: &ModelSession, args: ContinuousBeamArgs) -> BridgeResult<ToolOutput> {
    const TOOL: &str = "create_continuous_beam_bridge";
    if args.spans.is_empty() {
        return Err(BridgeError::schema(TOOL, "spans", "needs at least one span"));
    }
    for span in &args.spans {
        check_length(TOOL, "spans", *span)?;
    }
    let per_span = args.elements_per_span;
    let total = u32::try_from(args.spans.len())
        .ok()
        .and_then(|count| count.checked_mul(per_span))
        .filter(|total| (1..=MAX_ELEMENTS).contains(total))
        .ok_or_else(|| {
            BridgeError::schema(
                TOOL,
                "elements_per_span",
                format!("spans times elements_per_span must lie in 1..={MAX_ELEMENTS}"),
            )
        })?;

    let mut stations = Vec::with_capacity(total as usize + 1);
    let mut start = 0.0;
    for span in &args.spans {
        stations.extend((0..per_span).map(|j| start + span * f64::from(j) / f64::from(per_span)));
        start += span;
    }
    stations.push(start);

    let last = stations.len() - 1;
    let mut supports = vec![(0, roller())];
    supports.extend((1..args.spans.len()).map(|pier| (pier * per_span as usize, Fixity::pinned())));
    supports.push((last, roller()));

    let girder = Girder {
        stations,
        supports,
        material: args.material,
        section: args.section,
        section_size: (args.section_width, args.section_height),
        self_weight_case: args.self_weight_case,
    };
    let summary = build_girder(session, girder)?;
    let layout = args.spans.iter().map(ToString::to_string).collect::<Vec<_>>().join(" + ");
    Ok(ToolOutput::new(
        describe(&summary, &format!("continuous girder ({layout})")),
        to_data(&summary)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, session};
    use crate::provider::ModelQuery;
    use serde_json::json;

    #[tokio::test]
    async fn test_simple_beam_bridge_defaults() {
        let session = session();
        let bridge = call(&session, "create_simple_beam_bridge", json!({})).await.unwrap();
        assert_eq!(bridge.data["node_ids"].as_array().unwrap().len(), 11);
        assert_eq!(bridge.data["element_ids"].as_array().unwrap().len(), 10);
        assert_eq!(bridge.data["support_ids"], json!([1, 2]));
        assert_eq!(bridge.data["self_weight_load"], 1);
        assert_eq!(bridge.data["created_material"], true);

        let summary = session.model_summary();
        assert_eq!(summary.material_count, 1);
        assert_eq!(summary.section_count, 1);
        assert_eq!(summary.load_case_count, 1);

        let roller = call(&session, "get_entity", json!({"kind": "support", "id": 2})).await.unwrap();
        assert_eq!(roller.data["node"], 11);
        assert_eq!(roller.data["fixity"]["dx"], "free");

        let last = call(&session, "get_entity", json!({"kind": "node", "id": 11})).await.unwrap();
        assert_eq!(last.data["position"][0], 20.0);

        let report = call(&session, "validate_model", json!({})).await.unwrap();
        assert_eq!(report.data["findings"], json!([]));
    }

    #[tokio::test]
    async fn test_simple_beam_bridge_reuses_and_appends() {
        let session = session();
        call(&session, "create_material", json!({"name": "Steel", "kind": "steel", "elastic_modulus": 2.06e11, "density": 7850.0}))
            .await
            .unwrap();
        call(&session, "create_nodes", json!({"nodes": [[0.0, 50.0, 0.0]]})).await.unwrap();

        let bridge = call(
            &session,
            "create_simple_beam_bridge",
            json!({"span": 12.0, "num_elements": 4, "material": "Steel", "self_weight_case": null}),
        )
        .await
        .unwrap();
        assert_eq!(bridge.data["created_material"], false);
        assert_eq!(bridge.data["node_ids"], json!([2, 3, 4, 5, 6]));
        assert!(bridge.data.get("self_weight_load").is_none());

        let err = call(&session, "create_simple_beam_bridge", json!({"material": "C80"})).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
        let err = call(&session, "create_simple_beam_bridge", json!({"num_elements": 1})).await.unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
        assert_eq!(session.model_summary().node_count, 6);
    }

    #[tokio::test]
    async fn test_continuous_beam_bridge() {
        let session = session();
        let bridge = call(&session, "create_continuous_beam_bridge", json!({})).await.unwrap();
        assert_eq!(bridge.data["element_ids"].as_array().unwrap().len(), 24);
        assert_eq!(bridge.data["length"], 110.0);

        let supports = call(&session, "list_entities", json!({"kind": "support"})).await.unwrap();
        let nodes: Vec<_> = supports.data.as_array().unwrap().iter().map(|s| s["node"].clone()).collect();
        assert_eq!(nodes, vec![json!(1), json!(9), json!(17), json!(25)]);
        assert_eq!(supports.data[1]["fixity"]["dx"], "fixed");
        assert_eq!(supports.data[3]["fixity"]["dx"], "free");

        let pier = call(&session, "get_entity", json!({"kind": "node", "id": 17})).await.unwrap();
        assert_eq!(pier.data["position"][0], 80.0);

        let err = call(&session, "create_continuous_beam_bridge", json!({"spans": [30.0, -5.0]})).await.unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
        let err = call(&session, "create_continuous_beam_bridge", json!({"spans": []})).await.unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }
}
