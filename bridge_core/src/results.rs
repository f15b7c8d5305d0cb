//! Analysis handles and result queries.
//!
//! Results are never computed here; they are fetched from the engine and
//! passed through in a normalized shape.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::{ConstructionStage, Element, ElementId, EntityKind, Node, NodeId, StageIndex};
use crate::errors::{BridgeError, BridgeResult};
use crate::registry::ModelSnapshot;

/// Opaque handle of a submitted analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisHandle(pub Uuid);

impl AnalysisHandle {
    pub fn new() -> Self {
        AnalysisHandle(Uuid::new_v4())
    }
}

impl Default for AnalysisHandle {
    fn default() -> Self {
        AnalysisHandle::new()
    }
}

impl fmt::Display for AnalysisHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AnalysisHandle {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(AnalysisHandle)
            .map_err(|e| BridgeError::schema("arguments", "handle", format!("not an analysis handle: {e}")))
    }
}

/// Which result quantity to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// Nodal displacements and rotations
    Deformation,
    /// Element internal forces
    Force,
    /// Element stresses
    Stress,
    /// Support reactions
    Reaction,
}

impl ResultKind {
    /// Kind of entity the result records are keyed by
    pub fn target(&self) -> EntityKind {
        match self {
            ResultKind::Deformation | ResultKind::Reaction => EntityKind::Node,
            ResultKind::Force | ResultKind::Stress => EntityKind::Element,
        }
    }
}

/// Which stage of a staged analysis the results belong to.
///
/// On the wire this is the engine's integer convention: `-1` for the
/// operation (final) state, `0` for the envelope over all stages and `n` for
/// construction stage `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum StageSelector {
    #[default]
    Operation,
    Envelope,
    Stage(StageIndex),
}

impl TryFrom<i64> for StageSelector {
    type Error = BridgeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(StageSelector::Operation),
            0 => Ok(StageSelector::Envelope),
            n if n > 0 && n <= i64::from(u32::MAX) => Ok(StageSelector::Stage(StageIndex(n as u32))),
            n => Err(BridgeError::schema(
                "results",
                "stage",
                format!("expected -1 (operation), 0 (envelope) or a stage number, got {n}"),
            )),
        }
    }
}

impl From<StageSelector> for i64 {
    fn from(selector: StageSelector) -> i64 {
        match selector {
            StageSelector::Operation => -1,
            StageSelector::Envelope => 0,
            StageSelector::Stage(index) => i64::from(index.0),
        }
    }
}

impl fmt::Display for StageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageSelector::Operation => f.write_str("operation"),
            StageSelector::Envelope => f.write_str("envelope"),
            StageSelector::Stage(index) => write!(f, "stage {index}"),
        }
    }
}

/// A result request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultQuery {
    pub kind: ResultKind,

    /// Node or element IDs; empty means all
    #[serde(default)]
    pub ids: Vec<u32>,

    #[serde(default)]
    pub stage: StageSelector,

    /// Load case; `None` means the analysis combination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<String>,
}

impl ResultQuery {
    pub fn new(kind: ResultKind) -> Self {
        ResultQuery {
            kind,
            ids: Vec::new(),
            stage: StageSelector::Operation,
            case: None,
        }
    }

    /// Restrict to some IDs (builder pattern)
    pub fn for_ids(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.ids.extend(ids);
        self
    }

    /// Select a stage (builder pattern)
    pub fn at(mut self, stage: StageSelector) -> Self {
        self.stage = stage;
        self
    }

    /// Select a static or live load case (builder pattern)
    pub fn for_case(mut self, case: &str) -> Self {
        self.case = Some(case.to_string());
        self
    }

    /// Check that everything the query names existed when the analysis was submitted.
    pub fn check_against(&self, snapshot: &ModelSnapshot) -> BridgeResult<()> {
        let model = snapshot.model();
        for &id in &self.ids {
            let known = match self.kind.target() {
                EntityKind::Node => model.contains::<Node>(&NodeId(id)),
                _ => model.contains::<Element>(&ElementId(id)),
            };
            if !known {
                return Err(BridgeError::not_found(self.kind.target(), id));
            }
        }
        if let StageSelector::Stage(index) = self.stage {
            if !model.contains::<ConstructionStage>(&index) {
                return Err(BridgeError::not_found(EntityKind::Stage, index));
            }
        }
        if let Some(case) = &self.case {
            if !model.has_case(case) {
                return Err(BridgeError::schema("results", "case", format!("no load case named '{case}' in the analysed model")));
            }
        }
        Ok(())
    }
}

/// Result components of one node or element, keyed by component name (e.g. `dz`, `my`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: u32,
    pub components: BTreeMap<String, f64>,
}

/// Results returned by `get_results`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub handle: AnalysisHandle,
    pub kind: ResultKind,
    pub stage: StageSelector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<String>,
    pub records: Vec<ResultRecord>,
}
