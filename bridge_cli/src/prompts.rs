//! Guided workflow prompts.
//!
//! Each prompt renders a text template from its arguments; missing arguments
//! take their defaults.

use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
}

fn optional(name: &'static str, description: &'static str) -> PromptArgument {
    PromptArgument {
        name,
        description,
        required: false,
    }
}

pub fn catalog() -> Vec<PromptSpec> {
    vec![
        PromptSpec {
            name: "design_simple_beam",
            description: "Step-by-step workflow for modelling and analysing a simply supported beam bridge",
            arguments: vec![
                optional("span_length", "Span length in meters (default 20)"),
                optional("beam_height", "Beam height in meters (default 1.5)"),
                optional("material", "Concrete grade (default C50)"),
            ],
        },
        PromptSpec {
            name: "staged_construction",
            description: "Step-by-step workflow for setting up a construction stage analysis",
            arguments: vec![optional("stages", "Number of construction stages planned (default 3)")],
        },
    ]
}

/// Argument as text, whichever JSON type the client sent
fn argument(arguments: &Map<String, Value>, name: &str, default: &str) -> String {
    match arguments.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

/// Render a prompt, or `None` if no prompt has that name
pub fn render(name: &str, arguments: &Map<String, Value>) -> Option<Value> {
    let (description, text) = match name {
        "design_simple_beam" => (
            "Simple beam bridge design workflow",
            design_simple_beam(
                &argument(arguments, "span_length", "20"),
                &argument(arguments, "beam_height", "1.5"),
                &argument(arguments, "material", "C50"),
            ),
        ),
        "staged_construction" => (
            "Construction stage analysis workflow",
            staged_construction(&argument(arguments, "stages", "3")),
        ),
        _ => return None,
    };
    Some(json!({
        "description": description,
        "messages": [{"role": "user", "content": {"type": "text", "text": text}}],
    }))
}

fn design_simple_beam(span: &str, height: &str, material: &str) -> String {
    format!(
        "You are assisting a bridge engineer. Build and analyse a simply supported beam bridge.

## Design parameters
- Span length: {span} m
- Beam height: {height} m
- Material: {material}

## Workflow
1. `create_material`: add concrete {material} (kind \"concrete\", grade \"{material}\").
2. `create_section`: a rectangle or box girder section {height} m deep.
3. `create_nodes`: nodes along the X axis from 0 to {span} m, including midspan.
4. `create_elements`: beam elements joining consecutive nodes.
5. `set_support`: left end pinned (dx, dy, dz fixed), right end roller (dx free).
6. `apply_beam_distributed_load` or `apply_nodal_force`: dead and live load cases. Gravity acts along -Z.
7. `validate_model`: resolve every error before going on; explain each warning.
8. `configure_analysis` and `run_analysis`.
9. `get_analysis_status`, then `get_analysis_results` for midspan deformation and support reactions.

`create_simple_beam_bridge` performs steps 1 to 5 in one call when the defaults suit.
Work one step at a time and state the engineering reason for each action."
    )
}

fn staged_construction(stages: &str) -> String {
    format!(
        "You are assisting a bridge engineer. Set up a construction stage analysis with {stages} stage(s).

## Workflow
1. `get_model_info`: review what the model already contains.
2. `create_structure_group`: group elements by erection sequence.
3. Give supports and loads a `group` name where they change during construction.
4. `add_construction_stage`: add stages in order starting at 1. Each stage lists the
   groups, elements, supports and loads it activates or deactivates, and its duration in days.
   Anything deactivated can only come back through `reactivate`.
   Close the sequence with `merge_operation_stage`; nothing may follow it.
5. `configure_analysis` with kind \"staged_construction\"; enable creep for concrete.
6. `validate_model`: every load and support must sit on structure active in its stage.
7. `run_analysis`, then `get_analysis_results` with `stage` set to each critical stage (0 gives the envelope).

Check that the sequence is physically buildable before running the analysis."
    )
}
