//! Moving-load tools: design vehicles, traffic lanes and live load cases.
//!
//! The engine searches the governing vehicle positions; results come back
//! through `get_analysis_results` under the live load case name.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{join, parse, to_data, unknown_tool, IdSelection, ToolOutput, ToolSpec};
use crate::entities::{DesignCode, ElementId, Lane, LaneName, LiveCaseName, LiveLoadCase, Vehicle, VehicleName};
use crate::errors::BridgeResult;
use crate::provider::{ModelBuild, ModelSession};

pub(super) fn specs(ids: &Value) -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "add_standard_vehicle",
            description: "Add a standard vehicle from the engine's design-code database. vehicle_type is the 1-based position in the code's list.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "vehicle_type": {"type": "integer", "minimum": 1, "default": 1},
                    "code": {"type": "string", "enum": ["highway", "railway"], "default": "highway"}
                },
                "required": ["name"]
            }),
        },
        ToolSpec {
            name: "add_traffic_lane",
            description: "Define a traffic lane along line elements, with its width and lateral offset from the element axis.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "width": {"type": "number", "exclusiveMinimum": 0, "default": 3.75},
                    "lateral_offset": {"type": "number", "default": 0},
                    "element_ids": ids
                },
                "required": ["name", "element_ids"]
            }),
        },
        ToolSpec {
            name: "create_live_load_case",
            description: "Run vehicles over lanes as a live load case. The engine reports the envelope of the worst vehicle positions under this case name.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "vehicles": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "lanes": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "load_factor": {"type": "number", "exclusiveMinimum": 0, "default": 1.0},
                    "impact_factor": {"type": "number", "exclusiveMinimum": 0, "default": 1.0}
                },
                "required": ["name", "vehicles", "lanes"]
            }),
        },
    ]
}

pub(super) fn call(session: &ModelSession, name: &str, arguments: Value) -> BridgeResult<ToolOutput> {
    match name {
        "add_standard_vehicle" => add_standard_vehicle(session, parse(name, arguments)?),
        "add_traffic_lane" => add_traffic_lane(session, parse(name, arguments)?),
        "create_live_load_case" => create_live_load_case(session, parse(name, arguments)?),
        other => Err(unknown_tool(other)),
    }
}

fn first_type() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VehicleArgs {
    name: String,
    #[serde(default = "first_type")]
    vehicle_type: u32,
    #[serde(default)]
    code: DesignCode,
}

fn add_standard_vehicle(session: &ModelSession, args: VehicleArgs) -> BridgeResult<ToolOutput> {
    let vehicle = Vehicle::new(&args.name, args.code, args.vehicle_type);
    let id = session.create(vehicle.clone())?;
    Ok(ToolOutput::new(
        format!("Added vehicle '{id}': {:?} code, type {}", vehicle.code, vehicle.vehicle_type),
        to_data(&vehicle)?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LaneArgs {
    name: String,
    width: Option<f64>,
    #[serde(default)]
    lateral_offset: f64,
    element_ids: IdSelection,
}

fn add_traffic_lane(session: &ModelSession, args: LaneArgs) -> BridgeResult<ToolOutput> {
    let defaults = Lane::new(&args.name, &[]);
    let lane = Lane {
        width: args.width.unwrap_or(defaults.width),
        lateral_offset: args.lateral_offset,
        elements: args.element_ids.expand()?.into_iter().map(ElementId).collect(),
        ..defaults
    };
    let id = session.create(lane.clone())?;
    Ok(ToolOutput::new(
        format!(
            "Defined lane '{id}' ({} wide, offset {}) over element(s) {}",
            lane.width,
            lane.lateral_offset,
            join(&lane.elements)
        ),
        to_data(&lane)?,
    ))
}

fn unit() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LiveCaseArgs {
    name: String,
    vehicles: Vec<VehicleName>,
    lanes: Vec<LaneName>,
    #[serde(default = "unit")]
    load_factor: f64,
    #[serde(default = "unit")]
    impact_factor: f64,
}

fn create_live_load_case(session: &ModelSession, args: LiveCaseArgs) -> BridgeResult<ToolOutput> {
    let case = LiveLoadCase {
        id: LiveCaseName::from(args.name),
        vehicles: args.vehicles,
        lanes: args.lanes,
        load_factor: args.load_factor,
        impact_factor: args.impact_factor,
    };
    let id = session.create(case.clone())?;
    Ok(ToolOutput::new(
        format!(
            "Created live load case '{id}': {} vehicle(s) on {} lane(s), load factor {}, impact factor {}",
            case.vehicles.len(),
            case.lanes.len(),
            case.load_factor,
            case.impact_factor
        ),
        to_data(&case)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, session, simple_beam};
    use crate::provider::ModelQuery;
    use serde_json::json;

    #[tokio::test]
    async fn test_live_load_case_through_tools() {
        let session = session();
        simple_beam(&session).await;
        let vehicle = call(&session, "add_standard_vehicle", json!({"name": "Truck", "code": "railway", "vehicle_type": 2}))
            .await
            .unwrap();
        assert_eq!(vehicle.data["code"], "railway");

        let lane = call(&session, "add_traffic_lane", json!({"name": "L1", "element_ids": 1})).await.unwrap();
        assert_eq!(lane.data["width"], 3.75);

        let case = call(
            &session,
            "create_live_load_case",
            json!({"name": "Traffic", "vehicles": ["Truck"], "lanes": ["L1"], "impact_factor": 1.3}),
        )
        .await
        .unwrap();
        assert_eq!(case.data["load_factor"], 1.0);
        assert_eq!(session.model_summary().live_load_case_count, 1);

        call(&session, "configure_analysis", json!({"combination": [{"case": "Traffic", "factor": 1.4}]}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_moving_load_references_checked() {
        let session = session();
        simple_beam(&session).await;
        let err = call(&session, "add_standard_vehicle", json!({"name": "Zero", "vehicle_type": 0})).await.unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        let err = call(&session, "add_traffic_lane", json!({"name": "L1", "element_ids": [1, 5]})).await.unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");

        call(&session, "add_traffic_lane", json!({"name": "L1", "element_ids": [1]})).await.unwrap();
        let err = call(&session, "create_live_load_case", json!({"name": "Traffic", "vehicles": ["Ghost"], "lanes": ["L1"]}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");

        let err = call(&session, "delete_entity", json!({"kind": "element", "id": 1})).await.unwrap_err();
        assert_eq!(err.error_code(), "REFERENTIAL_INTEGRITY");
    }
}
