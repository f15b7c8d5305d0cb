//! # Model Resources
//!
//! Read-only JSON projections of the current model, addressed by
//! `bridge://model/...` URIs. Each read reflects the model at the moment of
//! the call.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use crate::entities::{
    ConstructionStage, Group, GroupKind, GroupName, Lane, Link, LiveLoadCase, Load, Material, Section, Support, Tendon,
    TendonProperty, Vehicle,
};
use crate::errors::{BridgeError, BridgeResult};
use crate::provider::ModelSession;
use crate::registry::ModelRegistry;

/// Description of one resource, as listed to the client
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSpec {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "mimeType")]
    pub mime_type: &'static str,
}

const fn resource(uri: &'static str, name: &'static str, description: &'static str) -> ResourceSpec {
    ResourceSpec {
        uri,
        name,
        description,
        mime_type: "application/json",
    }
}

pub const MODEL_SUMMARY: &str = "bridge://model/summary";
pub const MATERIALS: &str = "bridge://model/materials";
pub const SECTIONS: &str = "bridge://model/sections";
pub const LOAD_CASES: &str = "bridge://model/load-cases";
pub const STAGES: &str = "bridge://model/stages";
pub const STRUCTURE_GROUPS: &str = "bridge://model/structure-groups";
pub const BOUNDARIES: &str = "bridge://model/boundaries";
pub const TENDONS: &str = "bridge://model/tendons";
pub const MOVING_LOADS: &str = "bridge://model/moving-loads";

pub const RESOURCES: [ResourceSpec; 9] = [
    resource(MODEL_SUMMARY, "Model summary", "Entity counts, units and revision of the current model"),
    resource(MATERIALS, "Materials", "Every material with its properties"),
    resource(SECTIONS, "Sections", "Every section with its shape and dimensions"),
    resource(LOAD_CASES, "Load cases", "Load cases with the loads they contain"),
    resource(STAGES, "Construction stages", "Stages in order with their activation records"),
    resource(STRUCTURE_GROUPS, "Structure groups", "Named groups of elements and nodes"),
    resource(BOUNDARIES, "Boundary conditions", "Supports and links grouped by boundary group"),
    resource(TENDONS, "Prestressing", "Tendon properties and tendon profiles"),
    resource(MOVING_LOADS, "Moving loads", "Vehicles, traffic lanes and live load cases"),
];

/// Read a resource by URI
pub fn read_resource(session: &ModelSession, uri: &str) -> BridgeResult<Value> {
    session.read(|model| project(model, uri))
}

fn project(model: &ModelRegistry, uri: &str) -> BridgeResult<Value> {
    let value = match uri {
        MODEL_SUMMARY => to_value(&model.summary())?,
        MATERIALS => to_value(&model.list::<Material>(|_| true))?,
        SECTIONS => to_value(&model.list::<Section>(|_| true))?,
        LOAD_CASES => load_cases(model),
        STAGES => stages(model),
        STRUCTURE_GROUPS => to_value(&model.list::<Group>(|group| group.kind == GroupKind::Structure))?,
        BOUNDARIES => boundaries(model)?,
        TENDONS => json!({
            "properties": to_value(&model.list::<TendonProperty>(|_| true))?,
            "tendons": to_value(&model.list::<Tendon>(|_| true))?,
        }),
        MOVING_LOADS => json!({
            "vehicles": to_value(&model.list::<Vehicle>(|_| true))?,
            "lanes": to_value(&model.list::<Lane>(|_| true))?,
            "live_load_cases": to_value(&model.list::<LiveLoadCase>(|_| true))?,
        }),
        other => {
            return Err(BridgeError::schema(
                "resource",
                "uri",
                format!("unknown resource '{other}'"),
            ))
        }
    };
    Ok(value)
}

fn to_value<T: Serialize>(value: &T) -> BridgeResult<Value> {
    serde_json::to_value(value).map_err(|e| BridgeError::Internal {
        message: format!("cannot serialize resource: {e}"),
    })
}

fn load_cases(model: &ModelRegistry) -> Value {
    let mut cases: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    for load in model.all::<Load>() {
        cases.entry(load.case.as_str()).or_default().push(load.id.0);
    }
    let cases: Vec<Value> = cases
        .into_iter()
        .map(|(name, loads)| json!({ "name": name, "load_count": loads.len(), "loads": loads }))
        .collect();
    json!({ "cases": cases, "combination": model.analysis_config().combination })
}

fn stages(model: &ModelRegistry) -> Value {
    let stages: Vec<Value> = model
        .all::<ConstructionStage>()
        .map(|stage| {
            json!({
                "index": stage.index,
                "name": stage.name,
                "duration_days": stage.duration_days,
                "activations": stage.activations,
            })
        })
        .collect();
    json!({ "analysis_kind": model.analysis_config().kind, "stages": stages })
}

fn boundaries(model: &ModelRegistry) -> BridgeResult<Value> {
    #[derive(Default)]
    struct Members<'a> {
        supports: Vec<&'a Support>,
        links: Vec<&'a Link>,
    }

    // ungrouped boundaries sort first under `None`
    let mut groups: BTreeMap<Option<&GroupName>, Members> = BTreeMap::new();
    for support in model.all::<Support>() {
        groups.entry(support.group.as_ref()).or_default().supports.push(support);
    }
    for link in model.all::<Link>() {
        groups.entry(link.group.as_ref()).or_default().links.push(link);
    }
    let groups = groups
        .into_iter()
        .map(|(name, members)| {
            Ok(json!({
                "group": name,
                "supports": to_value(&members.supports)?,
                "links": to_value(&members.links)?,
            }))
        })
        .collect::<BridgeResult<Vec<Value>>>()?;
    Ok(json!({ "groups": groups }))
}
