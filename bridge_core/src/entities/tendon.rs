//! Prestressing tendons and their material properties.

use serde::{Deserialize, Serialize};

use super::{
    require_distinct, require_finite, require_name, require_non_negative, require_positive, ElementId, Entity, EntityKind,
    EntityRef, GroupName, TendonName, TendonPropertyId,
};
use crate::errors::{BridgeError, BridgeResult};

/// When the strands are stressed relative to casting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tensioning {
    #[default]
    PostTension,
    PreTension,
}

fn default_strand_modulus() -> f64 {
    1.95e11
}

fn default_friction() -> f64 {
    0.25
}

fn default_wobble() -> f64 {
    0.003
}

fn default_anchorage_slip() -> f64 {
    0.006
}

/// Strand properties shared by tendons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TendonProperty {
    pub id: TendonPropertyId,

    #[serde(default)]
    pub tensioning: Tensioning,

    /// Strand elastic modulus
    #[serde(default = "default_strand_modulus")]
    pub elastic_modulus: f64,

    /// Strand cross-section area
    pub area: f64,

    /// Curvature friction coefficient μ
    #[serde(default = "default_friction")]
    pub friction: f64,

    /// Wobble coefficient k, per unit length
    #[serde(default = "default_wobble")]
    pub wobble: f64,

    /// Anchorage set, length units
    #[serde(default = "default_anchorage_slip")]
    pub anchorage_slip: f64,
}

impl TendonProperty {
    /// Post-tensioned strand with typical friction and anchorage losses
    pub fn new(id: &str, area: f64) -> Self {
        TendonProperty {
            id: TendonPropertyId::from(id),
            tensioning: Tensioning::PostTension,
            elastic_modulus: default_strand_modulus(),
            area,
            friction: default_friction(),
            wobble: default_wobble(),
            anchorage_slip: default_anchorage_slip(),
        }
    }
}

impl Entity for TendonProperty {
    type Id = TendonPropertyId;
    const KIND: EntityKind = EntityKind::TendonProperty;

    fn id(&self) -> &TendonPropertyId {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        require_name(EntityKind::TendonProperty, "id", &self.id.0)?;
        require_positive(EntityKind::TendonProperty, "elastic_modulus", self.elastic_modulus)?;
        require_positive(EntityKind::TendonProperty, "area", self.area)?;
        require_non_negative(EntityKind::TendonProperty, "friction", self.friction)?;
        require_non_negative(EntityKind::TendonProperty, "wobble", self.wobble)?;
        require_non_negative(EntityKind::TendonProperty, "anchorage_slip", self.anchorage_slip)
    }
}

/// Which end the jack pulls from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jacking {
    Start,
    End,
    #[default]
    Both,
}

/// A tendon profile in the local x-y plane of the elements it runs through.
///
/// Control points are `[x, y]`: `x` is the relative position along the run
/// of elements (0 at the start of the first, 1 at the end of the last) and
/// `y` the eccentricity from the element axis in length units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tendon {
    pub id: TendonName,

    pub property: TendonPropertyId,

    /// Elements in the order the tendon passes through them
    pub elements: Vec<ElementId>,

    pub control_points: Vec<[f64; 2]>,

    #[serde(default)]
    pub jacking: Jacking,

    /// Load group used for staged stressing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupName>,
}

impl Tendon {
    pub fn new(id: &str, property: &str, elements: &[u32], control_points: Vec<[f64; 2]>) -> Self {
        Tendon {
            id: TendonName::from(id),
            property: TendonPropertyId::from(property),
            elements: elements.iter().copied().map(ElementId).collect(),
            control_points,
            jacking: Jacking::Both,
            group: None,
        }
    }
}

impl Entity for Tendon {
    type Id = TendonName;
    const KIND: EntityKind = EntityKind::Tendon;

    fn id(&self) -> &TendonName {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        require_name(EntityKind::Tendon, "id", &self.id.0)?;
        require_name(EntityKind::Tendon, "property", &self.property.0)?;
        if self.elements.is_empty() {
            return Err(BridgeError::schema("tendon", "elements", "a tendon runs through at least one element"));
        }
        require_distinct(EntityKind::Tendon, "elements", &self.elements)?;

        if self.control_points.len() < 2 {
            return Err(BridgeError::schema("tendon", "control_points", "needs at least two control points"));
        }
        let mut previous = None;
        for (i, [x, y]) in self.control_points.iter().enumerate() {
            require_finite(EntityKind::Tendon, &format!("control_points[{i}]"), *x)?;
            require_finite(EntityKind::Tendon, &format!("control_points[{i}]"), *y)?;
            if !(0.0..=1.0).contains(x) {
                return Err(BridgeError::schema(
                    "tendon",
                    format!("control_points[{i}]"),
                    format!("relative position must lie in 0..1, got {x}"),
                ));
            }
            if previous.is_some_and(|p| *x <= p) {
                return Err(BridgeError::schema(
                    "tendon",
                    format!("control_points[{i}]"),
                    "relative positions must increase along the tendon",
                ));
            }
            previous = Some(*x);
        }

        if let Some(group) = &self.group {
            require_name(EntityKind::Tendon, "group", &group.0)?;
        }
        Ok(())
    }

    fn references(&self) -> Vec<EntityRef> {
        std::iter::once(EntityRef::new(EntityKind::TendonProperty, &self.property))
            .chain(self.elements.iter().map(|e| EntityRef::new(EntityKind::Element, e)))
            .chain(self.group.iter().map(|g| EntityRef::new(EntityKind::Group, g)))
            .collect()
    }
}
