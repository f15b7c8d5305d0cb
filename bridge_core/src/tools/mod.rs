//! # Tool Catalog
//!
//! Assistant-facing tools. Each tool takes a JSON object of arguments, calls
//! one provider operation and answers with a short text plus the structured
//! JSON of what happened. Failures come back as [`BridgeError`]s, which the
//! transport reports as tool errors.
//!
//! | Tool                          | Provider operation                  |
//! |-------------------------------|-------------------------------------|
//! | `get_model_info`              | `ModelQuery::model_summary`         |
//! | `create_nodes`                | `ModelBuild::create_many` (nodes)   |
//! | `create_elements`             | `ModelBuild::create_many` (elements)|
//! | `create_material`             | `ModelBuild::create`                |
//! | `create_section`              | `ModelBuild::create`                |
//! | `set_support`                 | `ModelBuild::create_many` (supports)|
//! | `apply_nodal_force`           | `ModelBuild::create_many` (loads)   |
//! | `apply_beam_distributed_load` | `ModelBuild::create_many` (loads)   |
//! | `add_construction_stage`      | `ModelBuild::create`                |
//! | `configure_analysis`          | `ModelBuild::configure_analysis`    |
//! | `get_entity` / `list_entities`| `ModelQuery::get` / `list`          |
//! | `update_entity`               | `ModelBuild::update`                |
//! | `delete_entity`               | `ModelBuild::delete`                |
//! | `validate_model`              | `ModelQuery::validate_model`        |
//! | `run_analysis`                | `Analyze::run_analysis`             |
//! | `get_analysis_status`         | `Analyze::analysis_status`          |
//! | `get_analysis_results`        | `Analyze::get_results`              |
//!
//! Group, boundary, prestress, moving-load and workflow tools live in the
//! submodules of the same names.

mod boundary;
mod groups;
mod moving_load;
mod prestress;
mod workflows;

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::entities::{
    Activation, AnalysisConfig, ConstructionStage, Element, ElementId, ElementKind, Entity, EntityKind, Fixity, Group,
    GroupName, Lane, Link, LiveLoadCase, Load, LoadDirection, LoadId, LoadKind, Material, MaterialId, MaterialKind, Node,
    NodeId, Section, SectionId, SectionShape, SequentialId, StageAction, StageTarget, Support, SupportId, Tendon,
    TendonProperty, Vehicle,
};
use crate::errors::{BridgeError, BridgeResult};
use crate::provider::{Analyze, ModelBuild, ModelQuery, ModelSession};
use crate::registry::Stored;
use crate::results::{AnalysisHandle, ResultKind, ResultQuery, StageSelector};
use crate::units::Vec3;
use crate::validation::{Severity, ValidationReport};

/// Description of one tool, as listed to the client
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Successful tool answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    /// Human-readable summary
    pub text: String,
    /// Structured result
    pub data: Value,
}

impl ToolOutput {
    fn new(text: impl Into<String>, data: Value) -> Self {
        ToolOutput {
            text: text.into(),
            data,
        }
    }
}

const ID_SELECTION: &str = "Integer ID, list of IDs, or a range string such as \"1to10\" or \"1,3,5to7\"";

/// Every tool the server offers
pub static TOOLS: Lazy<Vec<ToolSpec>> = Lazy::new(|| {
    let ids = json!({
        "description": ID_SELECTION,
        "anyOf": [
            {"type": "integer", "minimum": 1},
            {"type": "array", "items": {"type": "integer", "minimum": 1}},
            {"type": "string"}
        ]
    });
    let kind = json!({
        "type": "string",
        "enum": EntityKind::ALL.map(|kind| kind.name())
    });

    let mut tools = vec![
        ToolSpec {
            name: "get_model_info",
            description: "Summary of the current bridge model: entity counts, unit system and revision.",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolSpec {
            name: "create_nodes",
            description: "Create nodes. Each item is [x, y, z] (ID assigned) or [id, x, y, z]. Coordinates are in model length units, Z up. All or nothing.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "nodes": {
                        "type": "array",
                        "items": {"type": "array", "items": {"type": "number"}, "minItems": 3, "maxItems": 4}
                    }
                },
                "required": ["nodes"]
            }),
        },
        ToolSpec {
            name: "create_elements",
            description: "Create beam, truss, cable or plate elements. Nodes, material and section must already exist. All or nothing.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "elements": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": {"type": "integer", "minimum": 1},
                                "kind": {"type": "string", "enum": ["beam", "truss", "cable", "plate"], "default": "beam"},
                                "nodes": {"type": "array", "items": {"type": "integer"}, "minItems": 2, "maxItems": 4},
                                "material": {"type": "string"},
                                "section": {"type": "string"},
                                "beta_deg": {"type": "number", "default": 0},
                                "cable_tension": {"type": "number", "minimum": 0}
                            },
                            "required": ["nodes", "material", "section"]
                        }
                    }
                },
                "required": ["elements"]
            }),
        },
        ToolSpec {
            name: "create_material",
            description: "Create a material. Poisson ratio and thermal expansion default to typical values for the kind.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Material name, e.g. C40"},
                    "kind": {"type": "string", "enum": ["concrete", "steel", "other"]},
                    "elastic_modulus": {"type": "number", "exclusiveMinimum": 0},
                    "density": {"type": "number", "exclusiveMinimum": 0},
                    "poisson_ratio": {"type": "number", "minimum": 0, "exclusiveMaximum": 0.5},
                    "thermal_expansion": {"type": "number", "minimum": 0},
                    "strength": {"type": "number", "exclusiveMinimum": 0},
                    "grade": {"type": "string", "description": "Engine database grade, e.g. C50 or Q345"}
                },
                "required": ["name", "kind", "elastic_modulus", "density"]
            }),
        },
        ToolSpec {
            name: "create_section",
            description: "Create a section. Shapes: rectangle {width, height}, circle {diameter}, i_section {depth, flange_width, flange_thickness, web_thickness}, box_girder {height, width, cells}, general {area, iy, iz, j}, plate {thickness}.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "shape": {"type": "string", "enum": ["rectangle", "circle", "i_section", "box_girder", "general", "plate"]}
                },
                "required": ["name", "shape"],
                "additionalProperties": {"type": "number"}
            }),
        },
        ToolSpec {
            name: "set_support",
            description: "Add supports at nodes. Each DOF flag fixes that DOF; defaults fix the three translations.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "node_ids": ids,
                    "dx": {"type": "boolean", "default": true},
                    "dy": {"type": "boolean", "default": true},
                    "dz": {"type": "boolean", "default": true},
                    "rx": {"type": "boolean", "default": false},
                    "ry": {"type": "boolean", "default": false},
                    "rz": {"type": "boolean", "default": false},
                    "group": {"type": "string", "description": "Boundary group name"}
                },
                "required": ["node_ids"]
            }),
        },
        ToolSpec {
            name: "apply_nodal_force",
            description: "Apply a force and moment at nodes in a load case.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "node_ids": ids,
                    "case": {"type": "string"},
                    "fx": {"type": "number", "default": 0}, "fy": {"type": "number", "default": 0},
                    "fz": {"type": "number", "default": 0}, "mx": {"type": "number", "default": 0},
                    "my": {"type": "number", "default": 0}, "mz": {"type": "number", "default": 0},
                    "group": {"type": "string", "description": "Load group name"}
                },
                "required": ["node_ids", "case"]
            }),
        },
        ToolSpec {
            name: "apply_beam_distributed_load",
            description: "Apply a uniform or linearly varying line load on line elements. Positions are absolute distances from node i; omit them to load the full length. Plate elements are rejected.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "element_ids": ids,
                    "case": {"type": "string"},
                    "direction": {
                        "type": "string",
                        "enum": ["global_x", "global_y", "global_z", "local_x", "local_y", "local_z"],
                        "default": "global_z"
                    },
                    "values": {"type": "array", "items": {"type": "number"}, "minItems": 1, "maxItems": 2},
                    "positions": {"type": "array", "items": {"type": "number"}, "minItems": 2, "maxItems": 2},
                    "group": {"type": "string", "description": "Load group name"}
                },
                "required": ["element_ids", "case", "values"]
            }),
        },
        ToolSpec {
            name: "add_construction_stage",
            description: "Append the next construction stage. Targets are {\"kind\": \"element\"|\"load\"|\"support\"|\"group\", \"id\": ...}; a group record applies to every member. A deactivated target comes back only through `reactivate`.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "duration_days": {"type": "number", "minimum": 0, "default": 0},
                    "activate": {"type": "array", "items": {"type": "object"}},
                    "deactivate": {"type": "array", "items": {"type": "object"}},
                    "reactivate": {"type": "array", "items": {"type": "object"}},
                    "index": {"type": "integer", "minimum": 1, "description": "Defaults to the next stage number"}
                },
                "required": ["name"]
            }),
        },
        ToolSpec {
            name: "configure_analysis",
            description: "Set the analysis kind, solver and load-case combination.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "kind": {"type": "string", "enum": ["static", "staged_construction", "modal"], "default": "static"},
                    "solver": {"type": "string", "enum": ["sparse", "variable_bandwidth"], "default": "sparse"},
                    "creep": {"type": "boolean", "default": false},
                    "modes": {"type": "integer", "minimum": 1, "default": 10},
                    "combination": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {"case": {"type": "string"}, "factor": {"type": "number", "default": 1.0}},
                            "required": ["case"]
                        }
                    }
                }
            }),
        },
        ToolSpec {
            name: "get_entity",
            description: "Read one entity by kind and ID.",
            input_schema: json!({
                "type": "object",
                "properties": {"kind": kind, "id": {"type": ["integer", "string"]}},
                "required": ["kind", "id"]
            }),
        },
        ToolSpec {
            name: "list_entities",
            description: "List every entity of a kind, in ID order.",
            input_schema: json!({
                "type": "object",
                "properties": {"kind": kind},
                "required": ["kind"]
            }),
        },
        ToolSpec {
            name: "update_entity",
            description: "Merge a patch object into an entity. Top-level fields are replaced; null clears an optional field. IDs cannot change.",
            input_schema: json!({
                "type": "object",
                "properties": {"kind": kind, "id": {"type": ["integer", "string"]}, "patch": {"type": "object"}},
                "required": ["kind", "id", "patch"]
            }),
        },
        ToolSpec {
            name: "delete_entity",
            description: "Delete an entity. Fails while anything still references it.",
            input_schema: json!({
                "type": "object",
                "properties": {"kind": kind, "id": {"type": ["integer", "string"]}},
                "required": ["kind", "id"]
            }),
        },
        ToolSpec {
            name: "validate_model",
            description: "Check the model before analysis: references, coincident nodes, connectivity, stages, section compatibility, completeness.",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolSpec {
            name: "run_analysis",
            description: "Validate and submit the model to the analysis engine. Returns an analysis handle. A config given here is kept only if the model passes validation with it.",
            input_schema: json!({
                "type": "object",
                "properties": {"config": {"type": "object", "description": "Optional analysis configuration to apply first"}}
            }),
        },
        ToolSpec {
            name: "get_analysis_status",
            description: "State of a submitted analysis.",
            input_schema: json!({
                "type": "object",
                "properties": {"handle": {"type": "string"}},
                "required": ["handle"]
            }),
        },
        ToolSpec {
            name: "get_analysis_results",
            description: "Fetch deformation, force, stress or reaction results. stage: -1 operation, 0 envelope, n construction stage n. case may name a static or live load case.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "handle": {"type": "string"},
                    "result_type": {"type": "string", "enum": ["deformation", "force", "stress", "reaction"]},
                    "ids": ids,
                    "stage": {"type": "integer", "minimum": -1, "default": -1},
                    "case": {"type": "string"}
                },
                "required": ["handle", "result_type"]
            }),
        },
    ];
    tools.extend(groups::specs(&ids));
    tools.extend(boundary::specs(&ids));
    tools.extend(prestress::specs(&ids));
    tools.extend(moving_load::specs(&ids));
    tools.extend(workflows::specs());
    tools
});

/// Look up a tool by name
pub fn find_tool(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|t| t.name == name)
}

/// Run one tool call against the session
pub async fn call_tool(session: &ModelSession, name: &str, arguments: Value) -> BridgeResult<ToolOutput> {
    debug!(tool = name, "tool call");
    match name {
        "get_model_info" => get_model_info(session),
        "create_nodes" => create_nodes(session, parse(name, arguments)?),
        "create_elements" => create_elements(session, parse(name, arguments)?),
        "create_material" => create_material(session, parse(name, arguments)?),
        "create_section" => create_section(session, parse(name, arguments)?),
        "set_support" => set_support(session, parse(name, arguments)?),
        "apply_nodal_force" => apply_nodal_force(session, parse(name, arguments)?),
        "apply_beam_distributed_load" => apply_distributed_load(session, parse(name, arguments)?),
        "add_construction_stage" => add_construction_stage(session, parse(name, arguments)?),
        "configure_analysis" => configure_analysis(session, parse(name, arguments)?),
        "get_entity" => get_entity(session, parse(name, arguments)?),
        "list_entities" => list_entities(session, parse(name, arguments)?),
        "update_entity" => update_entity(session, parse(name, arguments)?),
        "delete_entity" => delete_entity(session, parse(name, arguments)?),
        "validate_model" => Ok(validate_model(session)),
        "run_analysis" => run_analysis(session, parse(name, arguments)?).await,
        "get_analysis_status" => get_analysis_status(session, parse(name, arguments)?).await,
        "get_analysis_results" => get_analysis_results(session, parse(name, arguments)?).await,
        "create_structure_group"
        | "create_boundary_group"
        | "create_load_group"
        | "list_group_members"
        | "add_elements_to_group"
        | "merge_operation_stage" => groups::call(session, name, arguments),
        "add_elastic_link" | "add_master_slave_link" | "add_elastic_support" => boundary::call(session, name, arguments),
        "create_tendon_property" | "create_tendon_2d" | "apply_prestress" => prestress::call(session, name, arguments),
        "add_standard_vehicle" | "add_traffic_lane" | "create_live_load_case" => moving_load::call(session, name, arguments),
        "create_simple_beam_bridge" | "create_continuous_beam_bridge" => workflows::call(session, name, arguments),
        other => Err(unknown_tool(other)),
    }
}

fn unknown_tool(name: &str) -> BridgeError {
    BridgeError::schema("tool", "name", format!("unknown tool '{name}'"))
}

fn parse<T: DeserializeOwned>(tool: &str, arguments: Value) -> BridgeResult<T> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| BridgeError::schema(tool, "arguments", e.to_string()))
}

fn to_data<T: Serialize>(value: &T) -> BridgeResult<Value> {
    serde_json::to_value(value).map_err(|e| BridgeError::Internal {
        message: format!("cannot serialize tool result: {e}"),
    })
}

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// ID selections
// ============================================================================

/// One ID, a list of IDs, or a range expression like "1to10" or "1,3,5to7"
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IdSelection {
    One(u32),
    Many(Vec<u32>),
    Expr(String),
}

impl Default for IdSelection {
    fn default() -> Self {
        IdSelection::Many(Vec::new())
    }
}

impl IdSelection {
    /// Expand to distinct IDs in first-mention order
    pub fn expand(&self) -> BridgeResult<Vec<u32>> {
        let raw = match self {
            IdSelection::One(id) => vec![*id],
            IdSelection::Many(ids) => ids.clone(),
            IdSelection::Expr(expr) => parse_id_expr(expr)?,
        };
        let mut seen = BTreeSet::new();
        Ok(raw.into_iter().filter(|id| seen.insert(*id)).collect())
    }
}

fn parse_id_expr(expr: &str) -> BridgeResult<Vec<u32>> {
    let invalid = |part: &str| BridgeError::schema("arguments", "ids", format!("cannot read '{part}' as an ID or range"));
    let mut ids = Vec::new();
    for part in expr.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once("to") {
            Some((from, to)) => {
                let from: u32 = from.trim().parse().map_err(|_| invalid(part))?;
                let to: u32 = to.trim().parse().map_err(|_| invalid(part))?;
                if from > to || to - from > 100_000 {
                    return Err(invalid(part));
                }
                ids.extend(from..=to);
            }
            None => ids.push(part.parse().map_err(|_| invalid(part))?),
        }
    }
    Ok(ids)
}

/// IDs for new entities: explicit ones are kept, the rest are numbered from
/// `first` upward, skipping explicit ones.
fn assign_ids(kind: EntityKind, requested: &[Option<u32>], first: u32) -> BridgeResult<Vec<u32>> {
    let explicit: BTreeSet<u32> = requested.iter().flatten().copied().collect();
    let exhausted = || BridgeError::schema(kind.name(), "id", format!("no free {kind} ID above {}", u32::MAX));
    let mut next = Some(first);
    let mut ids = Vec::with_capacity(requested.len());
    for id in requested {
        match id {
            Some(id) => ids.push(*id),
            None => {
                let mut candidate = next.ok_or_else(exhausted)?;
                while explicit.contains(&candidate) {
                    candidate = candidate.checked_add(1).ok_or_else(exhausted)?;
                }
                ids.push(candidate);
                next = candidate.checked_add(1);
            }
        }
    }
    Ok(ids)
}

/// `count` fresh IDs from `first` upward
fn fresh_ids(kind: EntityKind, count: usize, first: u32) -> BridgeResult<Vec<u32>> {
    assign_ids(kind, &vec![None; count], first)
}

fn next_id<E>(session: &ModelSession) -> BridgeResult<u32>
where
    E: Stored,
    E::Id: SequentialId + Into<u32>,
{
    session.read(|model| model.next_id::<E>().map(Into::into))
}

// ============================================================================
// Modelling tools
// ============================================================================

fn get_model_info(session: &ModelSession) -> BridgeResult<ToolOutput> {
    let summary = session.model_summary();
    let text = format!(
        "Bridge model '{}' (revision {}, units {})\n  Nodes: {}\n  Elements: {}\n  Materials: {}\n  Sections: {}\n  Supports: {}\n  Links: {}\n  Loads: {} in {} load case(s)\n  Tendons: {}\n  Live load cases: {}\n  Construction stages: {}\n  Groups: {} structure, {} boundary, {} load\n  Engine: {}",
        summary.name,
        summary.revision,
        summary.units,
        summary.node_count,
        summary.element_count,
        summary.material_count,
        summary.section_count,
        summary.support_count,
        summary.link_count,
        summary.load_count,
        summary.load_case_count,
        summary.tendon_count,
        summary.live_load_case_count,
        summary.stage_count,
        summary.structure_group_count,
        summary.boundary_group_count,
        summary.load_group_count,
        session.engine_name(),
    );
    Ok(ToolOutput::new(text, to_data(&summary)?))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateNodesArgs {
    nodes: Vec<Vec<f64>>,
}

fn create_nodes(session: &ModelSession, args: CreateNodesArgs) -> BridgeResult<ToolOutput> {
    let mut requested = Vec::with_capacity(args.nodes.len());
    let mut positions = Vec::with_capacity(args.nodes.len());
    for (i, row) in args.nodes.iter().enumerate() {
        match row.as_slice() {
            [x, y, z] => {
                requested.push(None);
                positions.push(Vec3::new(*x, *y, *z));
            }
            [id, x, y, z] if id.fract() == 0.0 && *id >= 1.0 && *id <= f64::from(u32::MAX) => {
                requested.push(Some(*id as u32));
                positions.push(Vec3::new(*x, *y, *z));
            }
            _ => {
                return Err(BridgeError::schema(
                    "node",
                    format!("nodes[{i}]"),
                    "expected [x, y, z] or [id, x, y, z] with a positive integer id",
                ))
            }
        }
    }

    let first = if requested.iter().all(Option::is_some) {
        1
    } else {
        next_id::<Node>(session)?
    };
    let ids = assign_ids(EntityKind::Node, &requested, first)?;
    let nodes = ids
        .iter()
        .zip(positions)
        .map(|(id, p)| Node::new(*id, p.x, p.y, p.z))
        .collect::<Vec<_>>();
    let created = session.create_many(nodes.clone())?;
    Ok(ToolOutput::new(
        format!("Created {} node(s): {}", created.len(), join(&created)),
        to_data(&nodes)?,
    ))
}

fn default_element_kind() -> ElementKind {
    ElementKind::Beam
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ElementSpec {
    id: Option<u32>,
    #[serde(default = "default_element_kind")]
    kind: ElementKind,
    nodes: Vec<u32>,
    material: String,
    section: String,
    #[serde(default)]
    beta_deg: f64,
    cable_tension: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateElementsArgs {
    elements: Vec<ElementSpec>,
}

fn create_elements(session: &ModelSession, args: CreateElementsArgs) -> BridgeResult<ToolOutput> {
    let requested: Vec<Option<u32>> = args.elements.iter().map(|e| e.id).collect();
    let first = if requested.iter().all(Option::is_some) {
        1
    } else {
        next_id::<Element>(session)?
    };
    let ids = assign_ids(EntityKind::Element, &requested, first)?;
    let elements: Vec<Element> = args
        .elements
        .into_iter()
        .zip(ids)
        .map(|(spec, id)| Element {
            id: ElementId(id),
            kind: spec.kind,
            nodes: spec.nodes.into_iter().map(NodeId).collect(),
            material: MaterialId::from(spec.material),
            section: SectionId::from(spec.section),
            beta_deg: spec.beta_deg,
            cable_tension: spec.cable_tension,
        })
        .collect();
    let created = session.create_many(elements.clone())?;
    Ok(ToolOutput::new(
        format!("Created {} element(s): {}", created.len(), join(&created)),
        to_data(&elements)?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MaterialArgs {
    name: String,
    kind: MaterialKind,
    elastic_modulus: f64,
    density: f64,
    poisson_ratio: Option<f64>,
    thermal_expansion: Option<f64>,
    strength: Option<f64>,
    grade: Option<String>,
}

fn create_material(session: &ModelSession, args: MaterialArgs) -> BridgeResult<ToolOutput> {
    let mut material = Material::new(&args.name, args.kind, args.elastic_modulus, args.density);
    if let Some(nu) = args.poisson_ratio {
        material.poisson_ratio = nu;
    }
    if let Some(alpha) = args.thermal_expansion {
        material.thermal_expansion = alpha;
    }
    material.strength = args.strength;
    material.grade = args.grade;

    let id = session.create(material.clone())?;
    Ok(ToolOutput::new(
        format!("Created material '{id}' ({:?}, E = {})", material.kind, material.elastic_modulus),
        to_data(&material)?,
    ))
}

#[derive(Debug, Deserialize)]
struct SectionArgs {
    name: String,
    #[serde(flatten)]
    shape: SectionShape,
}

fn create_section(session: &ModelSession, args: SectionArgs) -> BridgeResult<ToolOutput> {
    let section = Section::new(&args.name, args.shape);
    let id = session.create(section.clone())?;
    Ok(ToolOutput::new(
        format!("Created section '{id}' ({})", section.shape.display_name()),
        to_data(&section)?,
    ))
}

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SupportArgs {
    node_ids: IdSelection,
    #[serde(default = "yes")]
    dx: bool,
    #[serde(default = "yes")]
    dy: bool,
    #[serde(default = "yes")]
    dz: bool,
    #[serde(default)]
    rx: bool,
    #[serde(default)]
    ry: bool,
    #[serde(default)]
    rz: bool,
    group: Option<GroupName>,
}

fn set_support(session: &ModelSession, args: SupportArgs) -> BridgeResult<ToolOutput> {
    let nodes = args.node_ids.expand()?;
    let fixity = Fixity::from_flags([args.dx, args.dy, args.dz, args.rx, args.ry, args.rz]);
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
        format!("Created {} support(s) at node(s) {}", created.len(), join(&nodes)),
        to_data(&supports)?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodalForceArgs {
    node_ids: IdSelection,
    case: String,
    #[serde(default)]
    fx: f64,
    #[serde(default)]
    fy: f64,
    #[serde(default)]
    fz: f64,
    #[serde(default)]
    mx: f64,
    #[serde(default)]
    my: f64,
    #[serde(default)]
    mz: f64,
    group: Option<GroupName>,
}

fn apply_nodal_force(session: &ModelSession, args: NodalForceArgs) -> BridgeResult<ToolOutput> {
    let nodes = args.node_ids.expand()?;
    let ids = fresh_ids(EntityKind::Load, nodes.len(), next_id::<Load>(session)?)?;
    let loads: Vec<Load> = nodes
        .iter()
        .zip(ids)
        .map(|(node, id)| Load {
            id: LoadId(id),
            case: args.case.clone(),
            group: args.group.clone(),
            kind: LoadKind::Nodal {
                node: NodeId(*node),
                force: Vec3::new(args.fx, args.fy, args.fz),
                moment: Vec3::new(args.mx, args.my, args.mz),
            },
        })
        .collect();
    let created = session.create_many(loads.clone())?;
    Ok(ToolOutput::new(
        format!(
            "Applied {} nodal load(s) in case '{}': load ID(s) {}",
            created.len(),
            args.case,
            join(&created)
        ),
        to_data(&loads)?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DistributedLoadArgs {
    element_ids: IdSelection,
    case: String,
    #[serde(default)]
    direction: LoadDirection,
    values: Vec<f64>,
    positions: Option<[f64; 2]>,
    group: Option<GroupName>,
}

fn apply_distributed_load(session: &ModelSession, args: DistributedLoadArgs) -> BridgeResult<ToolOutput> {
    let (start_magnitude, end_magnitude) = match args.values.as_slice() {
        [q] => (*q, *q),
        [q1, q2] => (*q1, *q2),
        _ => {
            return Err(BridgeError::schema(
                "load",
                "values",
                "expected [q] for a uniform load or [q1, q2] for a linear one",
            ))
        }
    };

    let elements = args.element_ids.expand()?;
    let ids = fresh_ids(EntityKind::Load, elements.len(), next_id::<Load>(session)?)?;
    let mut loads = Vec::with_capacity(elements.len());
    for (element, id) in elements.iter().zip(ids) {
        let (start, end) = match args.positions {
            Some([start, end]) => (start, end),
            None => (0.0, element_length(session, ElementId(*element))?),
        };
        loads.push(Load {
            id: LoadId(id),
            case: args.case.clone(),
            group: args.group.clone(),
            kind: LoadKind::Distributed {
                element: ElementId(*element),
                direction: args.direction,
                start,
                end,
                start_magnitude,
                end_magnitude,
            },
        });
    }

    let created = session.create_many(loads.clone())?;
    Ok(ToolOutput::new(
        format!(
            "Applied {} distributed load(s) in case '{}': load ID(s) {}",
            created.len(),
            args.case,
            join(&created)
        ),
        to_data(&loads)?,
    ))
}

fn element_length(session: &ModelSession, id: ElementId) -> BridgeResult<f64> {
    session.read(|model| {
        let element = model.get::<Element>(&id)?;
        model.element_length(element).ok_or_else(|| {
            BridgeError::schema(
                "load",
                "positions",
                format!("length of element {id} is unknown; give positions explicitly"),
            )
        })
    })
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StageArgs {
    name: String,
    #[serde(default)]
    duration_days: f64,
    #[serde(default)]
    activate: Vec<StageTarget>,
    #[serde(default)]
    deactivate: Vec<StageTarget>,
    #[serde(default)]
    reactivate: Vec<StageTarget>,
    index: Option<u32>,
}

fn add_construction_stage(session: &ModelSession, args: StageArgs) -> BridgeResult<ToolOutput> {
    let index = match args.index {
        Some(index) => index,
        None => next_id::<ConstructionStage>(session)?,
    };
    let records = [
        (StageAction::Activate, args.activate),
        (StageAction::Deactivate, args.deactivate),
        (StageAction::Reactivate, args.reactivate),
    ];
    let mut stage = ConstructionStage::new(index, &args.name).with_duration(args.duration_days);
    for (action, targets) in records {
        for target in targets {
            stage = stage.with(Activation { target, action });
        }
    }

    let id = session.create(stage.clone())?;
    Ok(ToolOutput::new(
        format!(
            "Added construction stage {id} '{}' ({} day(s), {} activation record(s))",
            stage.name,
            stage.duration_days,
            stage.activations.len()
        ),
        to_data(&stage)?,
    ))
}

fn configure_analysis(session: &ModelSession, config: AnalysisConfig) -> BridgeResult<ToolOutput> {
    session.configure_analysis(config.clone())?;
    Ok(ToolOutput::new(
        format!(
            "Analysis configured: kind {:?}, solver {:?}, creep {}, {} combination term(s)",
            config.kind,
            config.solver,
            config.creep,
            config.combination.len()
        ),
        to_data(&config)?,
    ))
}

// ============================================================================
// Generic entity tools
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntityArgs {
    kind: EntityKind,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    patch: Value,
}

/// Run a generic function with the entity type named by `kind`
macro_rules! with_entity_type {
    ($kind:expr, $f:ident($($arg:expr),*)) => {
        match $kind {
            EntityKind::Node => $f::<Node>($($arg),*),
            EntityKind::Element => $f::<Element>($($arg),*),
            EntityKind::Material => $f::<Material>($($arg),*),
            EntityKind::Section => $f::<Section>($($arg),*),
            EntityKind::Support => $f::<Support>($($arg),*),
            EntityKind::Load => $f::<Load>($($arg),*),
            EntityKind::Stage => $f::<ConstructionStage>($($arg),*),
            EntityKind::Group => $f::<Group>($($arg),*),
            EntityKind::Link => $f::<Link>($($arg),*),
            EntityKind::TendonProperty => $f::<TendonProperty>($($arg),*),
            EntityKind::Tendon => $f::<Tendon>($($arg),*),
            EntityKind::Vehicle => $f::<Vehicle>($($arg),*),
            EntityKind::Lane => $f::<Lane>($($arg),*),
            EntityKind::LiveLoadCase => $f::<LiveLoadCase>($($arg),*),
        }
    };
}

fn entity_id<E: Stored>(id: &Value) -> BridgeResult<E::Id> {
    // numeric IDs may arrive as strings and names as numbers
    let candidates = match id {
        Value::String(s) => vec![Value::String(s.clone()), s.trim().parse::<u64>().map(Value::from).unwrap_or(Value::Null)],
        Value::Number(n) => vec![id.clone(), Value::String(n.to_string())],
        _ => vec![id.clone()],
    };
    candidates
        .into_iter()
        .find_map(|candidate| serde_json::from_value(candidate).ok())
        .ok_or_else(|| BridgeError::schema("arguments", "id", format!("{id} is not a valid {} ID", E::KIND)))
}

fn get_one<E: Stored>(session: &ModelSession, id: &Value) -> BridgeResult<ToolOutput> {
    let entity = session.get::<E>(&entity_id::<E>(id)?)?;
    let data = to_data(&entity)?;
    Ok(ToolOutput::new(format!("{}: {data}", entity.entity_ref()), data))
}

fn list_all<E: Stored>(session: &ModelSession) -> BridgeResult<ToolOutput> {
    let entities = session.list::<E>(|_| true);
    Ok(ToolOutput::new(
        format!("{} {}(s)", entities.len(), E::KIND),
        to_data(&entities)?,
    ))
}

fn update_one<E: Stored>(session: &ModelSession, id: &Value, patch: &Value) -> BridgeResult<ToolOutput> {
    let updated = session.update::<E>(&entity_id::<E>(id)?, patch)?;
    Ok(ToolOutput::new(format!("Updated {}", updated.entity_ref()), to_data(&updated)?))
}

fn delete_one<E: Stored>(session: &ModelSession, id: &Value) -> BridgeResult<ToolOutput> {
    let removed = session.delete::<E>(&entity_id::<E>(id)?)?;
    Ok(ToolOutput::new(format!("Deleted {}", removed.entity_ref()), to_data(&removed)?))
}

fn get_entity(session: &ModelSession, args: EntityArgs) -> BridgeResult<ToolOutput> {
    with_entity_type!(args.kind, get_one(session, &args.id))
}

fn list_entities(session: &ModelSession, args: EntityArgs) -> BridgeResult<ToolOutput> {
    with_entity_type!(args.kind, list_all(session))
}

fn update_entity(session: &ModelSession, args: EntityArgs) -> BridgeResult<ToolOutput> {
    with_entity_type!(args.kind, update_one(session, &args.id, &args.patch))
}

fn delete_entity(session: &ModelSession, args: EntityArgs) -> BridgeResult<ToolOutput> {
    with_entity_type!(args.kind, delete_one(session, &args.id))
}

// ============================================================================
// Validation and analysis tools
// ============================================================================

/// Text rendering of a validation report
pub fn render_report(report: &ValidationReport) -> String {
    let mut lines = vec![report.summary()];
    for (severity, title) in [(Severity::Error, "Errors"), (Severity::Warning, "Warnings")] {
        let findings: Vec<_> = report.findings.iter().filter(|f| f.severity == severity).collect();
        if findings.is_empty() {
            continue;
        }
        lines.push(format!("{title}:"));
        lines.extend(findings.iter().map(|f| format!("  - [{:?}] {}", f.check, f.message)));
    }
    lines.join("\n")
}

fn validate_model(session: &ModelSession) -> ToolOutput {
    let report = session.validate_model();
    let data = serde_json::to_value(&report).unwrap_or(Value::Null);
    ToolOutput::new(render_report(&report), data)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunArgs {
    config: Option<AnalysisConfig>,
}

async fn run_analysis(session: &ModelSession, args: RunArgs) -> BridgeResult<ToolOutput> {
    let handle = session.run_analysis(args.config).await?;
    Ok(ToolOutput::new(
        format!("Analysis submitted to the '{}' engine. Handle: {handle}", session.engine_name()),
        json!({ "handle": handle }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StatusArgs {
    handle: String,
}

async fn get_analysis_status(session: &ModelSession, args: StatusArgs) -> BridgeResult<ToolOutput> {
    let handle: AnalysisHandle = args.handle.parse()?;
    let status = session.analysis_status(handle).await?;
    Ok(ToolOutput::new(
        format!("Analysis {handle} (revision {}): {:?}", status.revision, status.state),
        to_data(&status)?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResultsArgs {
    handle: String,
    result_type: ResultKind,
    #[serde(default)]
    ids: IdSelection,
    #[serde(default)]
    stage: StageSelector,
    case: Option<String>,
}

async fn get_analysis_results(session: &ModelSession, args: ResultsArgs) -> BridgeResult<ToolOutput> {
    let handle: AnalysisHandle = args.handle.parse()?;
    let query = ResultQuery {
        kind: args.result_type,
        ids: args.ids.expand()?,
        stage: args.stage,
        case: args.case.filter(|c| !c.trim().is_empty()),
    };
    let results = session.get_results(handle, &query).await?;
    Ok(ToolOutput::new(
        format!(
            "{} {:?} record(s) for analysis {handle} at {}",
            results.records.len(),
            results.kind,
            results.stage
        ),
        to_data(&results)?,
    ))
}
