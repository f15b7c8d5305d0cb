//! Moving loads: design vehicles, traffic lanes and the live load cases that
//! combine them.
//!
//! The engine places the vehicles along the lanes and reports the envelope of
//! the worst positions under the live load case name.

use serde::{Deserialize, Serialize};

use super::{
    require_distinct, require_finite, require_name, require_positive, ElementId, Entity, EntityKind, EntityRef, LaneName,
    LiveCaseName, VehicleName,
};
use crate::errors::{BridgeError, BridgeResult};

/// Design code a standard vehicle is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignCode {
    #[default]
    Highway,
    Railway,
}

/// A standard vehicle from the engine's design-code database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleName,

    #[serde(default)]
    pub code: DesignCode,

    /// 1-based index of the vehicle in the code's list
    pub vehicle_type: u32,
}

impl Vehicle {
    pub fn new(id: &str, code: DesignCode, vehicle_type: u32) -> Self {
        Vehicle {
            id: VehicleName::from(id),
            code,
            vehicle_type,
        }
    }
}

impl Entity for Vehicle {
    type Id = VehicleName;
    const KIND: EntityKind = EntityKind::Vehicle;

    fn id(&self) -> &VehicleName {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        require_name(EntityKind::Vehicle, "id", &self.id.0)?;
        if self.vehicle_type == 0 {
            return Err(BridgeError::schema("vehicle", "vehicle_type", "vehicle types are numbered from 1"));
        }
        Ok(())
    }
}

fn default_lane_width() -> f64 {
    3.75
}

/// A traffic lane following a run of line elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub id: LaneName,

    #[serde(default = "default_lane_width")]
    pub width: f64,

    /// Offset of the lane centre line from the element axis
    #[serde(default)]
    pub lateral_offset: f64,

    pub elements: Vec<ElementId>,
}

impl Lane {
    pub fn new(id: &str, elements: &[u32]) -> Self {
        Lane {
            id: LaneName::from(id),
            width: default_lane_width(),
            lateral_offset: 0.0,
            elements: elements.iter().copied().map(ElementId).collect(),
        }
    }
}

impl Entity for Lane {
    type Id = LaneName;
    const KIND: EntityKind = EntityKind::Lane;

    fn id(&self) -> &LaneName {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        require_name(EntityKind::Lane, "id", &self.id.0)?;
        require_positive(EntityKind::Lane, "width", self.width)?;
        require_finite(EntityKind::Lane, "lateral_offset", self.lateral_offset)?;
        if self.elements.is_empty() {
            return Err(BridgeError::schema("lane", "elements", "a lane follows at least one element"));
        }
        require_distinct(EntityKind::Lane, "elements", &self.elements)
    }

    fn references(&self) -> Vec<EntityRef> {
        self.elements.iter().map(|e| EntityRef::new(EntityKind::Element, e)).collect()
    }
}

fn unit_factor() -> f64 {
    1.0
}

/// Vehicles run over lanes; results are reported under this case name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveLoadCase {
    pub id: LiveCaseName,

    pub vehicles: Vec<VehicleName>,

    pub lanes: Vec<LaneName>,

    #[serde(default = "unit_factor")]
    pub load_factor: f64,

    /// Dynamic amplification
    #[serde(default = "unit_factor")]
    pub impact_factor: f64,
}

impl LiveLoadCase {
    pub fn new(id: &str, vehicles: &[&str], lanes: &[&str]) -> Self {
        LiveLoadCase {
            id: LiveCaseName::from(id),
            vehicles: vehicles.iter().copied().map(VehicleName::from).collect(),
            lanes: lanes.iter().copied().map(LaneName::from).collect(),
            load_factor: 1.0,
            impact_factor: 1.0,
        }
    }
}

impl Entity for LiveLoadCase {
    type Id = LiveCaseName;
    const KIND: EntityKind = EntityKind::LiveLoadCase;

    fn id(&self) -> &LiveCaseName {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        require_name(EntityKind::LiveLoadCase, "id", &self.id.0)?;
        if self.vehicles.is_empty() {
            return Err(BridgeError::schema("live_load_case", "vehicles", "needs at least one vehicle"));
        }
        if self.lanes.is_empty() {
            return Err(BridgeError::schema("live_load_case", "lanes", "needs at least one lane"));
        }
        require_distinct(EntityKind::LiveLoadCase, "vehicles", &self.vehicles)?;
        require_distinct(EntityKind::LiveLoadCase, "lanes", &self.lanes)?;
        require_positive(EntityKind::LiveLoadCase, "load_factor", self.load_factor)?;
        require_positive(EntityKind::LiveLoadCase, "impact_factor", self.impact_factor)
    }

    fn references(&self) -> Vec<EntityRef> {
        self.vehicles
            .iter()
            .map(|v| EntityRef::new(EntityKind::Vehicle, v))
            .chain(self.lanes.iter().map(|l| EntityRef::new(EntityKind::Lane, l)))
            .collect()
    }
}
